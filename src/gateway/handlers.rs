//! Route handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::{Stream, StreamExt};
use serde_json::{Value, json};
use uuid::Uuid;

use super::AppState;
use super::error::ApiError;
use super::sse::{DisconnectGuard, to_sse_response};
use crate::backend::OllamaBackend;
use crate::error::RelayError;
use crate::streaming::chat::ChatRelay;
use crate::streaming::line_decoder::JsonLineStream;
use crate::streaming::pull::{PullEvent, relay_pull_events};
use crate::types::chat::{BackendChatRequest, ChatRequest};
use crate::types::image::{
    BackendGenerateRequest, DEFAULT_ANALYZE_PROMPT, ImageGenerationRequest, ImageUpload,
};
use crate::types::models::{DeleteResponse, HealthResponse, PullRequest, validate_model_name};

pub(crate) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Ollama relay is running".to_string(),
    })
}

pub(crate) async fn list_models(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let mut models = state
        .backend
        .list_models()
        .await
        .map_err(|e| ApiError::from_relay("Failed to fetch models", e))?;

    if let Some(obj) = models.as_object_mut() {
        obj.entry("models").or_insert_with(|| json!([]));
    }
    Ok(Json(models))
}

pub(crate) async fn pull_model(
    State(state): State<AppState>,
    payload: Result<Json<PullRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    request
        .validate()
        .map_err(|e| ApiError::from_relay("Failed to pull model", e))?;

    let request_id = Uuid::new_v4();
    tracing::info!(%request_id, model = %request.model_name, "pull requested");
    let stream = pull_wire_stream(state.backend.clone(), request.model_name, request_id);
    Ok(to_sse_response(stream).into_response())
}

/// Relay pull progress as wire payloads.
///
/// The event stream is opened before the backend call, so failures to reach
/// the backend are reported in-band.
fn pull_wire_stream(
    backend: Arc<OllamaBackend>,
    model: String,
    request_id: Uuid,
) -> impl Stream<Item = Value> + Send + 'static {
    let name = model.clone();
    let lines: JsonLineStream = Box::pin(async_stream::stream! {
        match backend.pull(&name).await {
            Ok(mut lines) => {
                while let Some(item) = lines.next().await {
                    yield item;
                }
            }
            Err(e) => {
                yield Err(e);
            }
        }
    });

    async_stream::stream! {
        let mut guard = DisconnectGuard::new("pull", request_id);
        let mut events = relay_pull_events(model, lines);
        while let Some(event) = events.next().await {
            if let PullEvent::Error { error } = &event {
                tracing::warn!(%request_id, error = %error, "pull ended with error");
            }
            yield event.to_wire();
        }
        guard.finish();
    }
}

pub(crate) async fn delete_model(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    state
        .backend
        .delete(&name)
        .await
        .map_err(|e| ApiError::from_relay("Failed to delete model", e))?;

    tracing::info!(model = %name, "model deleted");
    Ok(Json(DeleteResponse {
        message: format!("Model {name} deleted successfully"),
    }))
}

pub(crate) async fn model_info(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    validate_model_name(&name).map_err(|e| ApiError::from_relay("Failed to fetch model info", e))?;
    let info = state
        .backend
        .show(&name)
        .await
        .map_err(|e| ApiError::from_relay("Failed to fetch model info", e))?;
    Ok(Json(info))
}

pub(crate) async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    request
        .validate()
        .map_err(|e| ApiError::from_relay("Chat request failed", e))?;

    let backend_request = request.to_backend();

    if !request.stream {
        let response = state
            .backend
            .chat(&backend_request)
            .await
            .map_err(|e| ApiError::from_relay("Chat request failed", e))?;
        return Ok(Json(response).into_response());
    }

    let request_id = Uuid::new_v4();
    tracing::info!(
        %request_id,
        model = %request.model,
        messages = request.messages.len(),
        "chat stream requested"
    );
    let stream = chat_wire_stream(state.backend.clone(), backend_request, request_id);
    Ok(to_sse_response(stream).into_response())
}

/// Forward decoded chat lines unchanged until the turn ends.
///
/// A line carrying `error` or `done: true` is forwarded and then ends the
/// stream. Transport failures are reported as `{"error": "..."}`.
fn chat_wire_stream(
    backend: Arc<OllamaBackend>,
    request: BackendChatRequest,
    request_id: Uuid,
) -> impl Stream<Item = Value> + Send + 'static {
    async_stream::stream! {
        let mut guard = DisconnectGuard::new("chat", request_id);
        let mut relay = ChatRelay::new();
        relay.begin();

        match backend.chat_stream(&request).await {
            Ok(mut lines) => {
                while let Some(item) = lines.next().await {
                    match item {
                        Ok(raw) => {
                            relay.dispatch(raw.clone());
                            yield raw;
                            if relay.is_terminal() {
                                break;
                            }
                        }
                        Err(error) => {
                            yield error_payload(&error);
                            relay.fail(error);
                            break;
                        }
                    }
                }
                relay.finish();
            }
            Err(error) => {
                yield error_payload(&error);
                relay.fail(error);
            }
        }

        tracing::debug!(%request_id, state = %relay.state(), "chat stream closed");
        guard.finish();
    }
}

fn error_payload(error: &RelayError) -> Value {
    json!({ "error": error.user_message() })
}

pub(crate) async fn generate_image(
    State(state): State<AppState>,
    payload: Result<Json<ImageGenerationRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    request
        .validate()
        .map_err(|e| ApiError::from_relay("Image generation failed", e))?;

    let response = state
        .backend
        .generate(&request.to_backend(), state.config.generation_timeout)
        .await
        .map_err(|e| ApiError::from_relay("Image generation failed", e))?;
    Ok(Json(response))
}

pub(crate) async fn analyze_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let mut model = String::new();
    let mut prompt = String::new();
    let mut upload: Option<ImageUpload> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                let mut image = ImageUpload::new(bytes.to_vec());
                image.file_name = file_name;
                image.content_type = content_type;
                upload = Some(image);
            }
            Some("model") => model = field.text().await?,
            Some("prompt") => prompt = field.text().await?,
            _ => {}
        }
    }

    let upload = match upload {
        Some(upload) if !model.trim().is_empty() => upload,
        _ => {
            return Err(ApiError::from_relay(
                "Image analysis failed",
                RelayError::validation("Model and image file are required"),
            ));
        }
    };
    upload
        .check(state.config.max_image_bytes)
        .map_err(|e| ApiError::from_relay("Image analysis failed", e))?;

    let prompt = if prompt.trim().is_empty() {
        DEFAULT_ANALYZE_PROMPT.to_string()
    } else {
        prompt
    };
    tracing::debug!(
        model = %model,
        bytes = upload.bytes.len(),
        mime = %upload.mime_type(),
        "analyzing image"
    );

    let request = BackendGenerateRequest {
        model,
        prompt,
        images: Some(vec![STANDARD.encode(&upload.bytes)]),
        stream: false,
        options: None,
    };
    let response = state
        .backend
        .generate(&request, state.config.generation_timeout)
        .await
        .map_err(|e| ApiError::from_relay("Image analysis failed", e))?;
    Ok(Json(response))
}

pub(crate) async fn not_found() -> ApiError {
    ApiError::new(axum::http::StatusCode::NOT_FOUND, "Not found", None)
}
