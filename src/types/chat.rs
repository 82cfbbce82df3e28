//! Chat wire types.
//!
//! Three shapes travel through the relay:
//! - [`ChatRequest`]: what a client posts to the gateway
//! - [`BackendChatRequest`]: what the gateway posts to the model server
//! - [`ChatChunk`]: one decoded line of the model server's chat stream (also
//!   the shape of a non-streaming chat response)

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::fields::{bool_field, reported_error, str_field, u64_field};
use crate::error::{RelayError, Result};

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_TOP_K: u32 = 40;
pub const DEFAULT_TOP_P: f64 = 0.9;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One conversation turn. Immutable once appended to a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    /// Base64-encoded images attached to the turn (vision models).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            images: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Attach a base64-encoded image.
    pub fn with_image(mut self, base64_image: impl Into<String>) -> Self {
        self.images
            .get_or_insert_with(Vec::new)
            .push(base64_image.into());
        self
    }
}

/// Sampling options.
///
/// Options the relay does not name are carried in `extra` and forwarded
/// unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GenerationOptions {
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Fill in the relay defaults (0.7 / 40 / 0.9) for omitted values.
    pub fn with_defaults(mut self) -> Self {
        self.temperature.get_or_insert(DEFAULT_TEMPERATURE);
        self.top_k.get_or_insert(DEFAULT_TOP_K);
        self.top_p.get_or_insert(DEFAULT_TOP_P);
        self
    }
}

fn default_stream() -> bool {
    true
}

/// Client → gateway chat request.
///
/// Missing fields deserialize to empty values so that validation, not the
/// JSON extractor, reports them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default = "default_stream")]
    pub stream: bool,
    #[serde(default)]
    pub options: GenerationOptions,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: true,
            options: GenerationOptions::default(),
        }
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Reject requests without a model or without messages.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() || self.messages.is_empty() {
            return Err(RelayError::validation("Model and messages are required"));
        }
        Ok(())
    }

    /// Backend request with defaults applied.
    pub fn to_backend(&self) -> BackendChatRequest {
        BackendChatRequest {
            model: self.model.clone(),
            messages: self.messages.clone(),
            stream: self.stream,
            options: self.options.clone().with_defaults(),
        }
    }
}

/// Gateway → model server chat request.
#[derive(Debug, Clone, Serialize)]
pub struct BackendChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
    pub options: GenerationOptions,
}

/// The `message` object inside a chat chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Reasoning explicitly tagged by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Newer backends name the same field `thinking`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
}

impl ChunkMessage {
    /// Explicitly tagged reasoning, `reasoning` first.
    pub fn explicit_reasoning(&self) -> Option<&str> {
        self.reasoning
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.thinking.as_deref().filter(|s| !s.is_empty()))
    }
}

/// One decoded chat stream line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<ChunkMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_eval_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A non-streaming chat response has the same shape as the final chunk.
pub type ChatResponse = ChatChunk;

impl ChatChunk {
    /// Read a decoded line field by field.
    ///
    /// A field of the wrong type reads as absent, so a malformed counter
    /// never hides the line's content, `done` marker or `error`.
    pub fn from_value_lossy(raw: &Value) -> Self {
        let message = raw.get("message").filter(|m| m.is_object()).map(|m| ChunkMessage {
            role: str_field(m, "role"),
            content: str_field(m, "content"),
            reasoning: str_field(m, "reasoning"),
            thinking: str_field(m, "thinking"),
        });
        Self {
            model: str_field(raw, "model"),
            message,
            done: bool_field(raw, "done"),
            done_reason: str_field(raw, "done_reason"),
            eval_count: u64_field(raw, "eval_count"),
            eval_duration: u64_field(raw, "eval_duration"),
            prompt_eval_count: u64_field(raw, "prompt_eval_count"),
            prompt_eval_duration: u64_field(raw, "prompt_eval_duration"),
            total_duration: u64_field(raw, "total_duration"),
            load_duration: u64_field(raw, "load_duration"),
            error: reported_error(raw),
        }
    }

    /// Content fragment carried by this chunk, if non-empty.
    pub fn content(&self) -> Option<&str> {
        self.message
            .as_ref()
            .and_then(|m| m.content.as_deref())
            .filter(|c| !c.is_empty())
    }

    pub fn explicit_reasoning(&self) -> Option<&str> {
        self.message.as_ref().and_then(ChunkMessage::explicit_reasoning)
    }
}

/// Final usage metadata. Absent counters are reported as 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMetadata {
    /// Generated token count (`eval_count`).
    pub tokens: u64,
    pub eval_duration: u64,
    pub prompt_eval_count: u64,
    pub prompt_eval_duration: u64,
}

impl ChatMetadata {
    pub fn from_chunk(chunk: &ChatChunk) -> Self {
        Self {
            tokens: chunk.eval_count.unwrap_or(0),
            eval_duration: chunk.eval_duration.unwrap_or(0),
            prompt_eval_count: chunk.prompt_eval_count.unwrap_or(0),
            prompt_eval_duration: chunk.prompt_eval_duration.unwrap_or(0),
        }
    }
}
