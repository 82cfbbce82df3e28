//! Model lifecycle wire types: list, pull progress, delete, info.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::fields::{reported_error, str_field, u64_field};
use crate::error::{RelayError, Result};

const UNKNOWN: &str = "Unknown";

/// Backend `GET /api/tags` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelList {
    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

/// One installed model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ModelDetails>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Model details as reported by the backend. Every field is optional; the
/// relay never fills in values the backend did not send.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub families: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantization_level: Option<String>,
}

impl ModelDetails {
    pub fn display_parameter_size(&self) -> &str {
        display(&self.parameter_size)
    }

    pub fn display_format(&self) -> &str {
        display(&self.format)
    }

    pub fn display_family(&self) -> &str {
        display(&self.family)
    }
}

fn display(field: &Option<String>) -> &str {
    field
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN)
}

/// Backend `POST /api/show` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modelfile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ModelDetails>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModelInfo {
    /// Details block, empty when the backend sent none.
    pub fn details(&self) -> ModelDetails {
        self.details.clone().unwrap_or_default()
    }
}

/// Client → gateway pull request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullRequest {
    #[serde(rename = "modelName", default)]
    pub model_name: String,
}

impl PullRequest {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_model_name(&self.model_name)
    }
}

/// Reject empty model names.
pub fn validate_model_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(RelayError::validation("Model name is required"));
    }
    Ok(())
}

/// One decoded line of the backend pull stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PullChunk {
    /// Read a decoded line field by field; mistyped fields read as absent.
    pub fn from_value_lossy(raw: &Value) -> Self {
        Self {
            status: str_field(raw, "status"),
            digest: str_field(raw, "digest"),
            total: u64_field(raw, "total"),
            completed: u64_field(raw, "completed"),
            error: reported_error(raw),
        }
    }
}

/// Status string of the terminal pull event.
pub const STATUS_COMPLETED: &str = "completed";

/// Latest known progress of one model download. Superseded in place by
/// each new progress line; no history is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub model: String,
    pub status: String,
    pub completed: u64,
    pub total: u64,
    /// Only present when `total > 0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<u64>,
}

impl DownloadProgress {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Fold one chunk into this record.
    ///
    /// Byte counters are kept when a status-only line arrives, so a
    /// "verifying digest" line does not reset the bar.
    pub fn update(&mut self, chunk: &PullChunk) {
        if let Some(status) = &chunk.status {
            self.status = status.clone();
        }
        if let Some(total) = chunk.total {
            self.total = total;
        }
        if let Some(completed) = chunk.completed {
            self.completed = completed;
        }
        self.percent = percent(self.completed, self.total);
    }

    pub fn is_completed(&self) -> bool {
        self.status == STATUS_COMPLETED
    }
}

/// `round(completed / total * 100)`, or `None` when `total` is 0.
pub fn percent(completed: u64, total: u64) -> Option<u64> {
    if total == 0 {
        return None;
    }
    Some((completed as f64 / total as f64 * 100.0).round() as u64)
}

/// Gateway delete confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub message: String,
}

/// Gateway health payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

/// Whether a model name looks like a vision model.
///
/// Callers use this to route image turns to image analysis instead of chat.
pub fn is_vision_model(name: &str) -> bool {
    let name = name.to_lowercase();
    ["llava", "vision", "bakllava"]
        .iter()
        .any(|marker| name.contains(marker))
}
