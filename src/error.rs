//! Error taxonomy for the ask endpoint.
//!
//! [`AskError`] carries one variant per failure class and converts itself
//! into the right HTTP response via [`IntoResponse`], so handlers return
//! `Result<T, AskError>` and propagate with `?`. The caller always sees a
//! short deterministic message; the full detail goes into the `details`
//! field and the server log, never a stack trace.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Everything that can go wrong while answering one question.
#[derive(Debug, thiserror::Error)]
pub enum AskError {
    /// Malformed caller input. Surfaced as 400, never logged as a fault.
    #[error("{0}")]
    Validation(String),

    /// Missing credential or similar deployment defect. Detected before any
    /// network call.
    #[error("{0}")]
    Configuration(String),

    /// The outbound provider call itself failed (network, non-success status).
    /// Not retried — fast visible failure over masking upstream issues.
    #[error("{0}")]
    ProviderTransport(String),

    /// The provider answered, but not with the shape we expect: no choices,
    /// unparseable body, or an answer too short to be a real one.
    #[error("{0}")]
    ProviderContract(String),
}

impl IntoResponse for AskError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(message) => {
                tracing::debug!(error = %message, "request rejected");
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            Self::Configuration(detail) => {
                tracing::error!(error = %detail, "service misconfigured");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "API не налаштовано", "details": detail })),
                )
                    .into_response()
            }
            Self::ProviderTransport(detail) | Self::ProviderContract(detail) => {
                tracing::warn!(error = %detail, "provider call failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Не вдалося отримати відповідь", "details": detail })),
                )
                    .into_response()
            }
        }
    }
}
