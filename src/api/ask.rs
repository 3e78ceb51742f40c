//! The ask endpoint — `POST /api/ask-ai`.
//!
//! This is intentionally a thin layer: context building lives in
//! [`crate::catalog`], prompt assembly in [`crate::prompt`], the outbound call
//! in [`crate::provider`] and the streaming relay in [`crate::relay`]. The
//! handler validates the inbound request, runs those in order and maps
//! failures to the [`AskError`] taxonomy. No state survives a request; the
//! only shared data is the read-only catalog loaded at startup.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Method},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

use crate::{
    catalog::{self, Catalog},
    config::{Config, Mode},
    error::AskError,
    prompt,
    provider::ProviderClient,
};

/// Read-only state injected into the handler.
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<Catalog>,
}

/// Build the public axum router.
///
/// CORS is permissive, matching the presentation layer's needs: any origin,
/// POST plus the OPTIONS preflight, content-type header. The preflight itself
/// is answered by the [`CorsLayer`] with an empty 200.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/healthz", axum::routing::get(crate::api::health::healthz))
        .route("/api/ask-ai", post(ask_ai))
        .layer(cors)
        .with_state(state)
}

/// `POST /api/ask-ai` — answer one question about the catalog.
///
/// Responds with `{"answer": ...}` in buffered mode or a chunked
/// `text/plain` stream of deltas in streaming mode.
pub async fn ask_ai(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Response, AskError> {
    let question = validate_question(&body, state.config.limits.question_max_chars)?;

    // Resolve the credential before any other work — a missing key must fail
    // fast, not after the prompt has been built.
    let client = ProviderClient::new(&state.config.provider)?;

    let context = catalog::context_block(
        state.catalog.entries(),
        state.config.limits.description_max_chars,
    );
    let system = prompt::system_prompt(&context);
    if prompt::exceeds_budget(&system, state.config.limits.prompt_warn_chars) {
        tracing::warn!(
            chars = system.chars().count(),
            threshold = state.config.limits.prompt_warn_chars,
            entries = state.catalog.len(),
            "assembled prompt exceeds the soft size budget — sending in full"
        );
    }

    tracing::debug!(
        mode = %state.config.provider.mode,
        question_chars = question.chars().count(),
        "dispatching question to provider"
    );

    match state.config.provider.mode {
        Mode::Buffered => {
            let answer = client.complete(&system, &question).await?;
            Ok(Json(json!({ "answer": answer })).into_response())
        }
        Mode::Streaming => {
            let deltas = client.complete_stream(&system, &question).await?;
            Ok((
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                Body::from_stream(deltas),
            )
                .into_response())
        }
    }
}

/// Validate the question field: present, a string, non-empty after trimming,
/// within the character cap. Returns the trimmed question.
fn validate_question(body: &Value, max_chars: usize) -> Result<String, AskError> {
    let question = body
        .get("question")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| AskError::Validation("Питання обов'язкове".into()))?;

    if question.chars().count() > max_chars {
        return Err(AskError::Validation(format!(
            "Питання занадто довге (макс. {max_chars} символів)"
        )));
    }

    Ok(question.to_string())
}
