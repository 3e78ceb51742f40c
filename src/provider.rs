//! Completion request dispatcher — the single outbound call to the LLM
//! provider.
//!
//! A [`ProviderClient`] is built fresh per request from [`ProviderConfig`];
//! [`reqwest::Client`] is cheap to construct and clone (it holds an `Arc`
//! internally), and per-request construction is also where the credential is
//! resolved, so a missing key fails before any network work. One request, no
//! retries, no backoff: failures are surfaced, not masked.

use std::time::Duration;

use reqwest::{header, Client};
use serde_json::{json, Value};

use crate::{
    config::ProviderConfig,
    error::AskError,
    relay::{self, DeltaStream},
};

/// Answers shorter than this are treated as a provider malfunction, not a
/// valid terse answer.
const MIN_ANSWER_CHARS: usize = 3;

/// Connect timeout for streaming requests, which otherwise run unbounded
/// while the model generates.
const STREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client bound to the configured provider.
pub struct ProviderClient {
    /// Buffered requests — carries the configured request timeout.
    client: Client,
    /// Streaming requests — connect timeout only.
    stream_client: Client,
    base_url: String,
    model: String,
    max_tokens: u32,
    stream_max_tokens: u32,
    reasoning_effort: Option<String>,
}

impl ProviderClient {
    /// Build a client, resolving the API key from the environment.
    ///
    /// A missing or empty key is a [`AskError::Configuration`] — surfaced
    /// before any network call is made.
    pub fn new(cfg: &ProviderConfig) -> Result<Self, AskError> {
        let key = cfg.api_key().ok_or_else(|| {
            AskError::Configuration(format!(
                "environment variable {} is not set",
                cfg.api_key_env
            ))
        })?;

        let mut headers = header::HeaderMap::new();
        let value = format!("Bearer {key}");
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&value).map_err(|_| {
                AskError::Configuration(format!(
                    "value of {} contains invalid Authorization header characters",
                    cfg.api_key_env
                ))
            })?,
        );

        let client = Client::builder()
            .default_headers(headers.clone())
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| AskError::Configuration(format!("building HTTP client: {e}")))?;

        let stream_client = Client::builder()
            .default_headers(headers)
            .connect_timeout(STREAM_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AskError::Configuration(format!("building streaming HTTP client: {e}")))?;

        Ok(Self {
            client,
            stream_client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            stream_max_tokens: cfg.stream_max_tokens,
            reasoning_effort: cfg.reasoning_effort.clone(),
        })
    }

    /// Buffered mode: one call, full body, first completion's text.
    pub async fn complete(&self, system: &str, question: &str) -> Result<String, AskError> {
        let url = self.completions_url();
        let body = self.request_body(system, question, false);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AskError::ProviderTransport(format!("POST {url}: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AskError::ProviderTransport(format!("reading provider response: {e}")))?;

        if !status.is_success() {
            return Err(AskError::ProviderTransport(provider_error_detail(
                status.as_u16(),
                &text,
            )));
        }

        let parsed: Value = serde_json::from_str(&text).map_err(|e| {
            AskError::ProviderContract(format!("provider response is not valid JSON: {e}"))
        })?;

        let answer = parsed
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AskError::ProviderContract("no completion text in provider response".into())
            })?
            .trim()
            .to_string();

        if answer.chars().count() < MIN_ANSWER_CHARS {
            return Err(AskError::ProviderContract(format!(
                "provider returned an implausibly short answer ({} chars)",
                answer.chars().count()
            )));
        }

        Ok(answer)
    }

    /// Streaming mode: one call, live body handed to the relay decoder.
    pub async fn complete_stream(
        &self,
        system: &str,
        question: &str,
    ) -> Result<DeltaStream, AskError> {
        let url = self.completions_url();
        let body = self.request_body(system, question, true);

        let response = self
            .stream_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AskError::ProviderTransport(format!("POST {url} (streaming): {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AskError::ProviderTransport(provider_error_detail(
                status.as_u16(),
                &text,
            )));
        }

        Ok(relay::relay(response.bytes_stream()))
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    /// Shape the provider envelope. Streaming requests get the larger token
    /// budget, the `stream` flag and the optional effort hint; buffered
    /// requests get neither.
    fn request_body(&self, system: &str, question: &str, stream: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user",   "content": question },
            ],
            "max_completion_tokens": if stream { self.stream_max_tokens } else { self.max_tokens },
        });

        if stream {
            body["stream"] = Value::Bool(true);
            if let Some(effort) = &self.reasoning_effort {
                body["reasoning_effort"] = Value::String(effort.clone());
            }
        }

        body
    }
}

/// Extract the provider's own error message when the body carries one,
/// falling back to the raw status.
fn provider_error_detail(status: u16, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(Value::as_str)
                .map(String::from)
        })
        .unwrap_or_else(|| format!("HTTP {status}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt as _;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_KEY_VAR: &str = "CATALOG_QA_PROVIDER_TEST_KEY";

    fn cfg_for(server: &MockServer) -> ProviderConfig {
        // test-only env mutation; the variable is unique to this module
        std::env::set_var(TEST_KEY_VAR, "sk-test");
        ProviderConfig {
            base_url: server.uri(),
            api_key_env: TEST_KEY_VAR.into(),
            model: "gpt-5-nano".into(),
            mode: crate::config::Mode::Buffered,
            timeout_ms: 5_000,
            max_tokens: 256,
            stream_max_tokens: 512,
            reasoning_effort: None,
        }
    }

    fn ok_completion(content: &str) -> Value {
        json!({ "choices": [{ "message": { "content": content } }] })
    }

    // -----------------------------------------------------------------------
    // ProviderClient::new — credential resolution
    // -----------------------------------------------------------------------

    #[test]
    fn new_fails_with_configuration_error_when_key_env_is_unset() {
        let cfg = ProviderConfig {
            base_url: "http://localhost:1".into(),
            api_key_env: "CATALOG_QA_DEFINITELY_NOT_SET_ABC".into(),
            model: "m".into(),
            mode: crate::config::Mode::Buffered,
            timeout_ms: 5_000,
            max_tokens: 256,
            stream_max_tokens: 512,
            reasoning_effort: None,
        };
        let err = ProviderClient::new(&cfg).err().expect("must fail without a key");
        assert!(matches!(err, AskError::Configuration(_)));
        assert!(err.to_string().contains("CATALOG_QA_DEFINITELY_NOT_SET_ABC"));
    }

    // -----------------------------------------------------------------------
    // Request shaping
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn buffered_body_has_ordered_messages_and_no_stream_flag() {
        let server = MockServer::start().await;
        let client = ProviderClient::new(&cfg_for(&server)).unwrap();

        let body = client.request_body("system text", "user question", false);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "system text");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "user question");
        assert_eq!(body["max_completion_tokens"], 256);
        assert!(body.get("stream").is_none());
        assert!(body.get("reasoning_effort").is_none());
    }

    #[tokio::test]
    async fn streaming_body_gets_stream_flag_budget_and_effort_hint() {
        let server = MockServer::start().await;
        let mut cfg = cfg_for(&server);
        cfg.reasoning_effort = Some("low".into());
        let client = ProviderClient::new(&cfg).unwrap();

        let body = client.request_body("s", "q", true);
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_completion_tokens"], 512);
        assert_eq!(body["reasoning_effort"], "low");
    }

    // -----------------------------------------------------------------------
    // complete — buffered mode
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn complete_returns_the_first_completion_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(ok_completion("Так, цей фільм є на сайті.")),
            )
            .mount(&server)
            .await;

        let client = ProviderClient::new(&cfg_for(&server)).unwrap();
        let answer = client.complete("s", "q").await.unwrap();
        assert_eq!(answer, "Так, цей фільм є на сайті.");
    }

    #[tokio::test]
    async fn complete_issues_exactly_one_outbound_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_completion("Відповідь тут.")))
            .expect(1)
            .mount(&server)
            .await;

        let client = ProviderClient::new(&cfg_for(&server)).unwrap();
        client.complete("s", "q").await.unwrap();
        // wiremock verifies the expectation on drop
    }

    #[tokio::test]
    async fn complete_does_not_retry_on_provider_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": { "message": "upstream exploded" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ProviderClient::new(&cfg_for(&server)).unwrap();
        let err = client.complete("s", "q").await.unwrap_err();
        assert!(matches!(err, AskError::ProviderTransport(_)));
        assert!(err.to_string().contains("upstream exploded"), "got: {err}");
    }

    #[tokio::test]
    async fn complete_falls_back_to_status_when_error_body_is_opaque() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = ProviderClient::new(&cfg_for(&server)).unwrap();
        let err = client.complete("s", "q").await.unwrap_err();
        assert!(err.to_string().contains("HTTP 429"), "got: {err}");
    }

    #[tokio::test]
    async fn complete_rejects_unparseable_body_as_contract_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json {{{"))
            .mount(&server)
            .await;

        let client = ProviderClient::new(&cfg_for(&server)).unwrap();
        let err = client.complete("s", "q").await.unwrap_err();
        assert!(matches!(err, AskError::ProviderContract(_)));
    }

    #[tokio::test]
    async fn complete_rejects_missing_choices_as_contract_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let client = ProviderClient::new(&cfg_for(&server)).unwrap();
        let err = client.complete("s", "q").await.unwrap_err();
        assert!(matches!(err, AskError::ProviderContract(_)));
    }

    #[tokio::test]
    async fn complete_rejects_too_short_answer_as_contract_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_completion("ok")))
            .mount(&server)
            .await;

        let client = ProviderClient::new(&cfg_for(&server)).unwrap();
        let err = client.complete("s", "q").await.unwrap_err();
        assert!(matches!(err, AskError::ProviderContract(_)));
        assert!(err.to_string().contains("short"), "got: {err}");
    }

    // -----------------------------------------------------------------------
    // complete_stream — streaming mode
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn complete_stream_relays_deltas_until_the_sentinel() {
        let sse = "data: {\"choices\":[{\"delta\":{\"content\":\"Пер\"}}]}\n\n\
                   data: {\"choices\":[{\"delta\":{\"content\":\"ший\"}}]}\n\n\
                   data: [DONE]\n\n";
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .mount(&server)
            .await;

        let client = ProviderClient::new(&cfg_for(&server)).unwrap();
        let mut stream = client.complete_stream("s", "q").await.unwrap();

        let mut out = String::new();
        while let Some(item) = stream.next().await {
            out.push_str(std::str::from_utf8(&item.unwrap()).unwrap());
        }
        assert_eq!(out, "Перший");
    }

    #[tokio::test]
    async fn complete_stream_surfaces_non_success_before_streaming() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({
                "error": { "message": "overloaded" }
            })))
            .mount(&server)
            .await;

        let client = ProviderClient::new(&cfg_for(&server)).unwrap();
        let Err(err) = client.complete_stream("s", "q").await else {
            panic!("expected a transport error before any streaming began");
        };
        assert!(matches!(err, AskError::ProviderTransport(_)));
        assert!(err.to_string().contains("overloaded"), "got: {err}");
    }
}
