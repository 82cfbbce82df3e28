//! Gateway consumer
//!
//! `RelayClient` talks to the gateway's HTTP surface and runs the same relay
//! logic on the consumer side: chat event streams come back as
//! [`ChatRelayEvent`]s with cumulative text and reasoning, pull streams as
//! [`PullEvent`]s ending in exactly one terminal event.
//!
//! ## Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use ollama_relay::client::RelayClient;
//! use ollama_relay::streaming::ChatRelayEvent;
//! use ollama_relay::types::{ChatRequest, Message};
//!
//! let client = RelayClient::new("http://localhost:3001/api")?;
//! let mut events = client
//!     .chat_stream(ChatRequest::new("llama3.2", vec![Message::user("hi")]))
//!     .await?;
//! while let Some(event) = events.next().await {
//!     if let ChatRelayEvent::Delta { fragment, .. } = event {
//!         print!("{fragment}");
//!     }
//! }
//! ```

use std::time::Duration;

use futures_util::StreamExt;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::defaults;
use crate::error::{RelayError, Result};
use crate::streaming::cancel::{CancelHandle, make_cancellable};
use crate::streaming::chat::{
    ChatEventStream, ChatOutcome, ChatRelayEvent, ChatStreamHandler, drive, relay_chat_events,
};
use crate::streaming::pull::{PullEvent, PullEventStream, relay_pull_events};
use crate::streaming::sse::sse_json_values;
use crate::types::chat::{ChatRequest, ChatResponse};
use crate::types::image::{GenerateResponse, ImageGenerationRequest, ImageUpload};
use crate::types::models::{
    DeleteResponse, DownloadProgress, HealthResponse, ModelEntry, ModelInfo, ModelList,
    PullRequest,
};

/// Gateway base URL used by [`RelayClient::default`].
pub const DEFAULT_BASE_URL: &str = "http://localhost:3001/api";

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    error: String,
    #[serde(default)]
    details: Option<String>,
}

/// HTTP client for the relay gateway.
#[derive(Debug, Clone)]
pub struct RelayClient {
    base_url: String,
    http: reqwest::Client,
    request_timeout: Duration,
    generation_timeout: Duration,
}

impl Default for RelayClient {
    fn default() -> Self {
        Self::with_http_client(DEFAULT_BASE_URL, reqwest::Client::new())
    }
}

impl RelayClient {
    /// Create a client for the gateway at `base_url` (including `/api`).
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(defaults::CONNECT_TIMEOUT)
            .user_agent(defaults::USER_AGENT)
            .build()
            .map_err(|e| RelayError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::with_http_client(base_url, http))
    }

    pub fn with_http_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            request_timeout: defaults::REQUEST_TIMEOUT,
            generation_timeout: defaults::GENERATION_TIMEOUT,
        }
    }

    /// Timeout for list, delete, info and health.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Timeout for image generation, image analysis and non-streaming chat.
    pub fn generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn model_url(&self, name: &str, suffix: &str) -> String {
        self.url(&format!("models/{}{suffix}", urlencoding::encode(name)))
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let request = self.http.get(self.url("health"));
        self.send_json(request, self.request_timeout).await
    }

    /// Installed models; empty when the backend reports none.
    pub async fn list_models(&self) -> Result<Vec<ModelEntry>> {
        let request = self.http.get(self.url("models"));
        let list: ModelList = self.send_json(request, self.request_timeout).await?;
        Ok(list.models)
    }

    /// Start a pull and return its progress events.
    pub async fn pull_model(&self, name: &str) -> Result<PullEventStream> {
        let body = PullRequest::new(name);
        body.validate()?;
        let response = self
            .http
            .post(self.url("models/pull"))
            .json(&body)
            .send()
            .await?;
        let response = check_status(response).await?;
        let lines = sse_json_values(response.bytes_stream());
        Ok(relay_pull_events(name, lines))
    }

    /// Pull a model, reporting each progress update to `on_progress`.
    pub async fn pull_model_with_progress<F>(
        &self,
        name: &str,
        mut on_progress: F,
    ) -> Result<DownloadProgress>
    where
        F: FnMut(&DownloadProgress),
    {
        let mut events = self.pull_model(name).await?;
        while let Some(event) = events.next().await {
            match event {
                PullEvent::Progress { progress, .. } => on_progress(&progress),
                PullEvent::Completed { progress, .. } => {
                    on_progress(&progress);
                    return Ok(progress);
                }
                PullEvent::Error { error } => return Err(error),
            }
        }
        Err(RelayError::Stream("pull stream ended without a terminal event".to_string()))
    }

    pub async fn delete_model(&self, name: &str) -> Result<DeleteResponse> {
        let request = self.http.delete(self.model_url(name, ""));
        self.send_json(request, self.request_timeout).await
    }

    pub async fn model_info(&self, name: &str) -> Result<ModelInfo> {
        let request = self.http.get(self.model_url(name, "/info"));
        self.send_json(request, self.request_timeout).await
    }

    /// Streaming chat. `stream` is forced on.
    pub async fn chat_stream(&self, request: ChatRequest) -> Result<ChatEventStream> {
        request.validate()?;
        let request = request.stream(true);
        let response = self
            .http
            .post(self.url("chat"))
            .json(&request)
            .send()
            .await?;
        let response = check_status(response).await?;
        let lines = sse_json_values(response.bytes_stream());
        Ok(relay_chat_events(lines))
    }

    /// Streaming chat with a handle that stops the stream and closes the
    /// connection.
    pub async fn chat_stream_cancellable(
        &self,
        request: ChatRequest,
    ) -> Result<(ChatEventStream, CancelHandle)> {
        let events = self.chat_stream(request).await?;
        Ok(make_cancellable::<_, ChatRelayEvent>(events))
    }

    /// Streaming chat dispatched to callbacks.
    pub async fn chat_with_handler<H>(
        &self,
        request: ChatRequest,
        handler: &mut H,
    ) -> Result<ChatOutcome>
    where
        H: ChatStreamHandler + ?Sized,
    {
        match self.chat_stream(request).await {
            Ok(events) => drive(events, handler).await,
            Err(error) => {
                handler.on_error(&error);
                Err(error)
            }
        }
    }

    /// Single-shot chat. `stream` is forced off.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        request.validate()?;
        let request = request.stream(false);
        let builder = self.http.post(self.url("chat")).json(&request);
        self.send_json(builder, self.generation_timeout).await
    }

    pub async fn generate_image(&self, request: &ImageGenerationRequest) -> Result<GenerateResponse> {
        request.validate()?;
        let builder = self.http.post(self.url("generate-image")).json(request);
        self.send_json(builder, self.generation_timeout).await
    }

    /// Upload an image for analysis by a vision model.
    pub async fn analyze_image(
        &self,
        model: &str,
        prompt: Option<&str>,
        image: ImageUpload,
    ) -> Result<GenerateResponse> {
        if model.trim().is_empty() || image.bytes.is_empty() {
            return Err(RelayError::validation("Model and image file are required"));
        }

        let mime = image.mime_type();
        let file_name = image.file_name.clone().unwrap_or_else(|| "image".to_string());
        let part = reqwest::multipart::Part::bytes(image.bytes)
            .file_name(file_name)
            .mime_str(&mime)
            .map_err(|e| RelayError::validation(format!("Invalid image type '{mime}': {e}")))?;

        let mut form = reqwest::multipart::Form::new()
            .text("model", model.to_string())
            .part("image", part);
        if let Some(prompt) = prompt.filter(|p| !p.trim().is_empty()) {
            form = form.text("prompt", prompt.to_string());
        }

        let builder = self.http.post(self.url("analyze-image")).multipart(form);
        self.send_json(builder, self.generation_timeout).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> Result<T> {
        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| RelayError::from_reqwest(e, timeout))?;
        let response = check_status(response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RelayError::from_reqwest(e, timeout))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| RelayError::Parse(format!("Invalid JSON from gateway: {e}")))
    }
}

/// Map gateway error responses back onto `RelayError`.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let body: Option<GatewayErrorBody> = serde_json::from_str(&text).ok();

    Err(match (status.as_u16(), body) {
        (400, Some(body)) => RelayError::Validation(body.error),
        (code, Some(body)) => RelayError::backend(code, body.details.unwrap_or(body.error)),
        (code, None) => RelayError::backend(code, text),
    })
}
