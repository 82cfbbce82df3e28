//! # ollama-relay
//!
//! Streaming relay between chat clients and a local Ollama model server.
//!
//! The relay forwards chat turns, model pulls and image requests to the model
//! server and re-emits its newline-delimited JSON streams as server-sent
//! events, while accumulating the streamed answer, a best-effort reasoning
//! trace and the final usage metadata.
//!
//! - [`streaming`]: line decoding, the chat and pull relays, reasoning
//!   heuristic, cancellation
//! - [`backend`]: outbound calls to the model server
//! - [`gateway`]: axum router serving the client-facing surface (feature
//!   `server`)
//! - [`client`]: consumer of the gateway surface
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use ollama_relay::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), RelayError> {
//!     let _guard = ollama_relay::telemetry::init_from_env()?;
//!     ollama_relay::gateway::serve(RelayConfig::from_env()?).await
//! }
//! ```

pub mod backend;
pub mod client;
pub mod config;
pub mod error;
#[cfg(feature = "server")]
pub mod gateway;
pub mod streaming;
pub mod telemetry;
pub mod types;

pub use backend::OllamaBackend;
pub use client::RelayClient;
pub use config::RelayConfig;
pub use error::{ErrorCategory, RelayError, Result};

/// Commonly used items.
pub mod prelude {
    pub use crate::backend::OllamaBackend;
    pub use crate::client::RelayClient;
    pub use crate::config::RelayConfig;
    pub use crate::error::{ErrorCategory, RelayError, Result};
    pub use crate::streaming::{
        CancelHandle, ChatOutcome, ChatRelay, ChatRelayEvent, ChatStreamHandler, PullEvent,
        PullRelay, RelayState,
    };
    pub use crate::types::{
        ChatMetadata, ChatRequest, DownloadProgress, GenerationOptions, ImageGenerationRequest,
        ImageOptions, ImageUpload, Message, Role, is_vision_model,
    };
}
