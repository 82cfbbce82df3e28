//! Wire types shared by the backend client, the gateway and the consumer.

pub mod chat;
pub mod fields;
pub mod image;
pub mod models;

pub use chat::{
    BackendChatRequest, ChatChunk, ChatMetadata, ChatRequest, ChatResponse, ChunkMessage,
    GenerationOptions, Message, Role,
};
pub use fields::reported_error;
pub use image::{
    BackendGenerateRequest, DEFAULT_ANALYZE_PROMPT, GenerateResponse, ImageGenerationRequest,
    ImageOptions, ImageUpload,
};
pub use models::{
    DeleteResponse, DownloadProgress, HealthResponse, ModelDetails, ModelEntry, ModelInfo,
    ModelList, PullChunk, PullRequest, is_vision_model,
};
