//! Streaming relay core
//!
//! Both pipelines follow the same shape: byte chunks are split into lines,
//! each line is decoded as JSON independently, and a per-request relay
//! dispatches the decoded objects, maintains its accumulators, and decides
//! when the stream is over.

pub mod cancel;
pub mod chat;
pub mod line_decoder;
pub mod pull;
pub mod reasoning;
pub mod sse;
pub mod state;

pub use cancel::{CancelHandle, make_cancellable, with_cancel};
pub use chat::{
    ChatEventStream, ChatOutcome, ChatRelay, ChatRelayEvent, ChatStreamHandler, drive,
    relay_chat_events,
};
pub use line_decoder::{JsonLineStream, LineDecoder, decode_json_lines};
pub use pull::{PullEvent, PullEventStream, PullRelay, relay_pull_events};
pub use reasoning::ReasoningBuffer;
pub use sse::sse_json_values;
pub use state::{RelayState, StateTracker};
