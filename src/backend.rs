//! Model server client
//!
//! `OllamaBackend` owns every outbound call to the model server. Bounded calls
//! apply a per-request timeout; chat streams and model pulls apply none and
//! end only when the server closes the stream or the returned stream is
//! dropped.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::{Value, json};

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::streaming::line_decoder::{JsonLineStream, decode_json_lines};
use crate::types::chat::BackendChatRequest;
use crate::types::image::BackendGenerateRequest;
use crate::types::models::validate_model_name;

/// Build default headers for backend requests.
pub fn build_headers(additional_headers: &HashMap<String, String>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    for (key, value) in additional_headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| RelayError::Config(format!("Invalid header name '{key}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| RelayError::Config(format!("Invalid header value for '{key}': {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Outbound client for the model server.
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    config: RelayConfig,
    http: reqwest::Client,
}

impl OllamaBackend {
    /// Create a backend client.
    ///
    /// The shared client carries only the connect timeout; request timeouts
    /// are applied per call.
    pub fn new(config: RelayConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(build_headers(&config.headers)?)
            .build()
            .map_err(|e| RelayError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    /// Create a backend client reusing an existing `reqwest::Client`.
    pub fn with_http_client(config: RelayConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    fn url(&self, endpoint: &str) -> String {
        self.config.backend_endpoint(endpoint)
    }

    /// `GET /api/tags`, returned unchanged.
    pub async fn list_models(&self) -> Result<Value> {
        let timeout = self.config.request_timeout;
        tracing::debug!(url = %self.url("tags"), "listing models");
        let response = self
            .http
            .get(self.url("tags"))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| RelayError::from_reqwest(e, timeout))?;
        read_json(response, timeout).await
    }

    /// `POST /api/pull` with streaming enabled.
    ///
    /// Returns the decoded progress lines. No timeout applies.
    pub async fn pull(&self, model_name: &str) -> Result<JsonLineStream> {
        validate_model_name(model_name)?;
        tracing::debug!(model = %model_name, "starting model pull");
        let body = json!({ "model": model_name, "stream": true });
        self.open_stream("pull", &body).await
    }

    /// `DELETE /api/delete`.
    pub async fn delete(&self, model_name: &str) -> Result<()> {
        validate_model_name(model_name)?;
        let timeout = self.config.request_timeout;
        tracing::debug!(model = %model_name, "deleting model");
        let response = self
            .http
            .delete(self.url("delete"))
            .json(&json!({ "model": model_name }))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| RelayError::from_reqwest(e, timeout))?;
        check_status(response).await?;
        Ok(())
    }

    /// `POST /api/show`, returned unchanged.
    pub async fn show(&self, model_name: &str) -> Result<Value> {
        validate_model_name(model_name)?;
        self.post_json("show", &json!({ "model": model_name }), self.config.request_timeout)
            .await
    }

    /// Single-shot `POST /api/chat`; `stream` is forced off.
    pub async fn chat(&self, request: &BackendChatRequest) -> Result<Value> {
        let mut request = request.clone();
        request.stream = false;
        tracing::debug!(model = %request.model, messages = request.messages.len(), "chat");
        self.post_json("chat", &request, self.config.generation_timeout)
            .await
    }

    /// Streaming `POST /api/chat`; `stream` is forced on. No timeout applies.
    pub async fn chat_stream(&self, request: &BackendChatRequest) -> Result<JsonLineStream> {
        let mut request = request.clone();
        request.stream = true;
        tracing::debug!(model = %request.model, messages = request.messages.len(), "chat stream");
        self.open_stream("chat", &request).await
    }

    /// `POST /api/generate`, returned unchanged.
    pub async fn generate(
        &self,
        request: &BackendGenerateRequest,
        timeout: Duration,
    ) -> Result<Value> {
        tracing::debug!(
            model = %request.model,
            images = request.images.as_ref().map_or(0, Vec::len),
            "generate"
        );
        self.post_json("generate", request, timeout).await
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<Value> {
        let response = self
            .http
            .post(self.url(endpoint))
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| RelayError::from_reqwest(e, timeout))?;
        read_json(response, timeout).await
    }

    async fn open_stream<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<JsonLineStream> {
        let response = self.http.post(self.url(endpoint)).json(body).send().await?;
        let response = check_status(response).await?;
        Ok(decode_json_lines(response.bytes_stream()))
    }
}

/// Map a send failure, keeping the configured timeout.
/// Turn a non-success response into `RelayError::Backend`.
///
/// The message is the backend's `error` field when the body is JSON, the raw
/// body otherwise, and the status reason when the body is empty.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = backend_error_message(&body)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
    tracing::warn!(status = status.as_u16(), message = %message, "backend returned an error");
    Err(RelayError::backend(status.as_u16(), message))
}

fn backend_error_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(body) {
        Ok(value) => value
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| Some(body.to_string())),
        Err(_) => Some(body.to_string()),
    }
}

async fn read_json(response: reqwest::Response, timeout: Duration) -> Result<Value> {
    let response = check_status(response).await?;
    let bytes = response.bytes().await.map_err(|e| RelayError::from_reqwest(e, timeout))?;
    if bytes.is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(&bytes)
        .map_err(|e| RelayError::Parse(format!("Invalid JSON from backend: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::chat::{ChatRequest, Message};
    use futures_util::StreamExt;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> OllamaBackend {
        let config = RelayConfig::builder()
            .backend_url(server.uri())
            .build()
            .unwrap();
        OllamaBackend::new(config).unwrap()
    }

    #[test]
    fn error_message_prefers_error_field() {
        assert_eq!(
            backend_error_message(r#"{"error":"model 'x' not found"}"#).as_deref(),
            Some("model 'x' not found")
        );
        assert_eq!(backend_error_message("plain").as_deref(), Some("plain"));
        assert_eq!(backend_error_message("  "), None);
    }

    #[test]
    fn invalid_header_is_config_error() {
        let mut headers = HashMap::new();
        headers.insert("bad header".to_string(), "v".to_string());
        assert!(matches!(build_headers(&headers), Err(RelayError::Config(_))));
    }

    #[tokio::test]
    async fn list_models_passes_payload_through() {
        let server = MockServer::start().await;
        let payload = json!({"models": [{"name": "llama3.2:latest", "size": 1}]});
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&payload))
            .mount(&server)
            .await;

        assert_eq!(backend(&server).list_models().await.unwrap(), payload);
    }

    #[tokio::test]
    async fn backend_status_maps_to_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/show"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"error": "model 'nope' not found"})),
            )
            .mount(&server)
            .await;

        let err = backend(&server).show("nope").await.unwrap_err();
        assert_eq!(err, RelayError::backend(404, "model 'nope' not found"));
    }

    #[tokio::test]
    async fn chat_stream_forces_streaming_and_decodes_lines() {
        let server = MockServer::start().await;
        let body = "{\"message\":{\"content\":\"Hel\"}}\n{\"message\":{\"content\":\"lo\"}}\n{\"done\":true}\n";
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"model": "test", "stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
            .mount(&server)
            .await;

        let request = ChatRequest::new("test", vec![Message::user("hi")])
            .stream(false)
            .to_backend();
        let lines: Vec<_> = backend(&server)
            .chat_stream(&request)
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2].as_ref().unwrap()["done"], true);
    }

    #[tokio::test]
    async fn pull_rejects_empty_name_without_calling_backend() {
        let server = MockServer::start().await;
        let err = backend(&server).pull("").await.err().unwrap();
        assert!(matches!(err, RelayError::Validation(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_sends_model_name() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/delete"))
            .and(body_partial_json(json!({"model": "phi3"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        backend(&server).delete("phi3").await.unwrap();
    }

    #[tokio::test]
    async fn bounded_call_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"models": []}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let config = RelayConfig::builder()
            .backend_url(server.uri())
            .request_timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        let err = OllamaBackend::new(config)
            .unwrap()
            .list_models()
            .await
            .unwrap_err();
        assert_eq!(err, RelayError::Timeout(Duration::from_millis(50)));
    }
}
