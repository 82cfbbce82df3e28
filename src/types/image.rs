//! Image generation and analysis wire types.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{RelayError, Result};

/// Prompt used by image analysis when the caller sends none.
pub const DEFAULT_ANALYZE_PROMPT: &str = "Describe this image in detail.";

/// Seed value asking the relay to pick a random seed.
pub const RANDOM_SEED: i64 = -1;

/// Exclusive upper bound for generated seeds.
const SEED_RANGE: i64 = 1_000_000;

/// Client → gateway image generation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageGenerationRequest {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub options: ImageOptions,
}

impl ImageGenerationRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            options: ImageOptions::default(),
        }
    }

    pub fn options(mut self, options: ImageOptions) -> Self {
        self.options = options;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() || self.prompt.trim().is_empty() {
            return Err(RelayError::validation("Model and prompt are required"));
        }
        Ok(())
    }

    /// Backend generate request with the seed resolved.
    pub fn to_backend(&self) -> BackendGenerateRequest {
        let mut options = self.options.clone();
        options.seed = Some(options.resolve_seed());
        BackendGenerateRequest {
            model: self.model.clone(),
            prompt: self.prompt.clone(),
            images: None,
            stream: false,
            options: Some(serde_json::to_value(options).unwrap_or_default()),
        }
    }
}

/// Numeric generation options. Unnamed options pass through in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cfg_scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ImageOptions {
    /// Options a generation form starts from: random seed, 50 steps,
    /// cfg 7.5, 512x512.
    pub fn standard() -> Self {
        Self {
            seed: Some(RANDOM_SEED),
            steps: Some(50),
            cfg_scale: Some(7.5),
            width: Some(512),
            height: Some(512),
            extra: Map::new(),
        }
    }

    pub fn seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn steps(mut self, steps: u32) -> Self {
        self.steps = Some(steps);
        self
    }

    pub fn cfg_scale(mut self, cfg_scale: f64) -> Self {
        self.cfg_scale = Some(cfg_scale);
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// The caller's seed, or a random one in `[0, 1_000_000)` when the seed
    /// is absent or `-1`.
    pub fn resolve_seed(&self) -> i64 {
        match self.seed {
            Some(seed) if seed != RANDOM_SEED => seed,
            _ => rand::thread_rng().gen_range(0..SEED_RANGE),
        }
    }
}

/// Gateway → model server `POST /api/generate` request.
#[derive(Debug, Clone, Serialize)]
pub struct BackendGenerateRequest {
    pub model: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

/// Model server generate payload. Returned to the caller unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An uploaded image awaiting analysis.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

impl ImageUpload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            file_name: None,
            content_type: None,
        }
    }

    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Reject empty, oversized, or non-image payloads.
    pub fn check(&self, limit: usize) -> Result<()> {
        if self.bytes.is_empty() {
            return Err(RelayError::validation("Model and image file are required"));
        }
        if self.bytes.len() > limit {
            return Err(RelayError::PayloadTooLarge {
                size: self.bytes.len(),
                limit,
            });
        }
        if !infer::is_image(&self.bytes) {
            return Err(RelayError::validation("Uploaded file is not an image"));
        }
        Ok(())
    }

    /// MIME type sniffed from the bytes, falling back to the declared one.
    pub fn mime_type(&self) -> String {
        infer::get(&self.bytes)
            .map(|kind| kind.mime_type().to_string())
            .or_else(|| self.content_type.clone())
            .unwrap_or_else(|| "application/octet-stream".to_string())
    }
}
