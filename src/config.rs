//! Relay configuration.
//!
//! `RelayConfig` holds the backend location, the listening address and the
//! timeout policy. Ordinary request/response calls are bounded by
//! `request_timeout`; streaming calls (chat stream, model pull) run without a
//! timeout and end only when the backend closes or the consumer goes away.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

/// Default values.
pub mod defaults {
    use std::time::Duration;

    pub const BACKEND_URL: &str = "http://localhost:11434";
    pub const PORT: u16 = 3001;
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const GENERATION_TIMEOUT: Duration = Duration::from_secs(60);
    pub const MAX_JSON_BODY: usize = 50 * 1024 * 1024;
    pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
    pub const USER_AGENT: &str = concat!("ollama-relay/", env!("CARGO_PKG_VERSION"));
}

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Base URL of the model server (no trailing `/api`).
    pub backend_url: String,
    /// Address the gateway listens on.
    pub bind_addr: SocketAddr,
    /// Timeout for list, delete and info calls.
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    /// TCP connect timeout, applied to every backend call including streams.
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
    /// Timeout for image generation, image analysis and non-streaming chat.
    #[serde(with = "duration_serde")]
    pub generation_timeout: Duration,
    /// Upper bound for JSON request bodies.
    pub max_json_body: usize,
    /// Upper bound for uploaded images.
    pub max_image_bytes: usize,
    /// User agent sent to the backend.
    pub user_agent: String,
    /// Extra headers sent to the backend.
    pub headers: HashMap<String, String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            backend_url: defaults::BACKEND_URL.to_string(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], defaults::PORT)),
            request_timeout: defaults::REQUEST_TIMEOUT,
            connect_timeout: defaults::CONNECT_TIMEOUT,
            generation_timeout: defaults::GENERATION_TIMEOUT,
            max_json_body: defaults::MAX_JSON_BODY,
            max_image_bytes: defaults::MAX_IMAGE_BYTES,
            user_agent: defaults::USER_AGENT.to_string(),
            headers: HashMap::new(),
        }
    }
}

impl RelayConfig {
    /// Returns a builder for constructing `RelayConfig`
    pub fn builder() -> RelayConfigBuilder {
        RelayConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    ///
    /// Supported variables:
    /// - `OLLAMA_BASE_URL`: backend base URL
    /// - `PORT`: port to listen on (host stays `0.0.0.0`)
    /// - `RELAY_BIND`: full listen address, overrides `PORT`
    /// - `RELAY_REQUEST_TIMEOUT_SECS`: bounded-call timeout in seconds
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`RelayConfig::from_env`] with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();

        if let Some(url) = lookup("OLLAMA_BASE_URL") {
            builder = builder.backend_url(url);
        }

        if let Some(port) = lookup("PORT") {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|e| RelayError::Config(format!("Invalid PORT '{port}': {e}")))?;
            builder = builder.bind_addr(SocketAddr::from(([0, 0, 0, 0], port)));
        }

        if let Some(bind) = lookup("RELAY_BIND") {
            let addr: SocketAddr = bind
                .trim()
                .parse()
                .map_err(|e| RelayError::Config(format!("Invalid RELAY_BIND '{bind}': {e}")))?;
            builder = builder.bind_addr(addr);
        }

        if let Some(secs) = lookup("RELAY_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|e| {
                RelayError::Config(format!("Invalid RELAY_REQUEST_TIMEOUT_SECS '{secs}': {e}"))
            })?;
            builder = builder.request_timeout(Duration::from_secs(secs));
        }

        builder.build()
    }

    /// Backend URL for an `/api/...` endpoint.
    pub fn backend_endpoint(&self, endpoint: &str) -> String {
        format!(
            "{}/api/{}",
            self.backend_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }
}

/// Builder for `RelayConfig`
#[derive(Debug, Clone, Default)]
pub struct RelayConfigBuilder {
    backend_url: Option<String>,
    bind_addr: Option<SocketAddr>,
    request_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    generation_timeout: Option<Duration>,
    max_json_body: Option<usize>,
    max_image_bytes: Option<usize>,
    user_agent: Option<String>,
    headers: HashMap<String, String>,
}

impl RelayConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = Some(url.into());
        self
    }
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = Some(addr);
        self
    }
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
    pub fn generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = Some(timeout);
        self
    }
    pub fn max_json_body(mut self, bytes: usize) -> Self {
        self.max_json_body = Some(bytes);
        self
    }
    pub fn max_image_bytes(mut self, bytes: usize) -> Self {
        self.max_image_bytes = Some(bytes);
        self
    }
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }
    pub fn header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<RelayConfig> {
        let defaults = RelayConfig::default();

        let backend_url = self
            .backend_url
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .unwrap_or(defaults.backend_url);
        if !(backend_url.starts_with("http://") || backend_url.starts_with("https://")) {
            return Err(RelayError::Config(format!(
                "Backend URL must start with http:// or https://, got '{backend_url}'"
            )));
        }

        let request_timeout = self.request_timeout.unwrap_or(defaults.request_timeout);
        if request_timeout.is_zero() {
            return Err(RelayError::Config(
                "request_timeout must be greater than zero".to_string(),
            ));
        }

        Ok(RelayConfig {
            backend_url,
            bind_addr: self.bind_addr.unwrap_or(defaults.bind_addr),
            request_timeout,
            connect_timeout: self.connect_timeout.unwrap_or(defaults.connect_timeout),
            generation_timeout: self.generation_timeout.unwrap_or(defaults.generation_timeout),
            max_json_body: self.max_json_body.unwrap_or(defaults.max_json_body),
            max_image_bytes: self.max_image_bytes.unwrap_or(defaults.max_image_bytes),
            user_agent: self.user_agent.unwrap_or(defaults.user_agent),
            headers: self.headers,
        })
    }
}

// Durations travel as whole seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
