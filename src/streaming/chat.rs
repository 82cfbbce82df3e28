//! Chat Stream Relay
//!
//! [`ChatRelay`] consumes decoded chat lines one at a time and maintains the
//! three per-turn accumulators: answer text, reasoning text and the final
//! usage metadata. Each relay handles exactly one turn.
//!
//! Lines are read field by field (see [`ChatChunk::from_value_lossy`]).
//! Dispatch rules for one line:
//! - a non-null `error` field ends the turn with that error;
//! - a non-empty `message.content` extends the answer and yields a delta;
//! - reasoning rules (see [`super::reasoning`]) may extend the reasoning text;
//! - `done: true` ends the turn successfully.
//!
//! Once terminal, the relay ignores further input.

use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use serde_json::Value;

use super::line_decoder::JsonLineStream;
use super::reasoning::ReasoningBuffer;
use super::state::{RelayState, StateTracker};
use crate::error::{RelayError, Result};
use crate::types::chat::{ChatChunk, ChatMetadata};

/// Events emitted by the chat relay.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatRelayEvent {
    /// New answer text.
    Delta {
        fragment: String,
        cumulative: String,
        /// The decoded line that carried the fragment.
        raw: Value,
    },
    /// New reasoning text.
    ReasoningDelta { fragment: String, cumulative: String },
    /// Turn finished. `raw` is the `done` line, absent when the stream just
    /// closed.
    Completed {
        content: String,
        reasoning: String,
        metadata: ChatMetadata,
        raw: Option<Value>,
    },
    /// Turn failed. Nothing follows.
    Error { error: RelayError },
}

impl ChatRelayEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Error { .. })
    }
}

/// Stream of chat relay events.
pub type ChatEventStream = Pin<Box<dyn Stream<Item = ChatRelayEvent> + Send>>;

/// Per-turn chat dispatcher.
#[derive(Debug, Default)]
pub struct ChatRelay {
    state: StateTracker,
    content: String,
    reasoning: ReasoningBuffer,
}

impl ChatRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the outbound call as started.
    pub fn begin(&mut self) {
        self.state.begin_request();
    }

    pub fn state(&self) -> RelayState {
        self.state.state()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Answer text so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Reasoning text so far.
    pub fn reasoning(&self) -> &str {
        self.reasoning.as_str()
    }

    /// Dispatch one decoded line.
    pub fn dispatch(&mut self, raw: Value) -> Vec<ChatRelayEvent> {
        if self.is_terminal() {
            return Vec::new();
        }

        if !raw.is_object() {
            tracing::debug!(line = %raw, "skipping chat line that is not an object");
            return Vec::new();
        }
        let chunk = ChatChunk::from_value_lossy(&raw);
        self.state.line_received();

        if let Some(message) = chunk.error.as_deref() {
            let error = RelayError::BackendReported(message.to_string());
            return self.fail(error).into_iter().collect();
        }

        let mut events = Vec::new();

        if let Some(fragment) = chunk.content() {
            self.content.push_str(fragment);
            events.push(ChatRelayEvent::Delta {
                fragment: fragment.to_string(),
                cumulative: self.content.clone(),
                raw: raw.clone(),
            });
        }

        if let Some(fragment) = self
            .reasoning
            .observe(chunk.explicit_reasoning(), chunk.content())
        {
            events.push(ChatRelayEvent::ReasoningDelta {
                fragment,
                cumulative: self.reasoning.as_str().to_string(),
            });
        }

        if chunk.done {
            self.state.complete();
            let metadata = ChatMetadata::from_chunk(&chunk);
            tracing::info!(
                tokens = metadata.tokens,
                chars = self.content.len(),
                "chat stream completed"
            );
            events.push(ChatRelayEvent::Completed {
                content: self.content.clone(),
                reasoning: self.reasoning.as_str().to_string(),
                metadata,
                raw: Some(raw),
            });
        }

        events
    }

    /// Source ended. Yields a completion with zeroed metadata unless the
    /// relay already reached a terminal state.
    pub fn finish(&mut self) -> Option<ChatRelayEvent> {
        if !self.state.complete() {
            return None;
        }
        tracing::info!(chars = self.content.len(), "chat stream closed without done marker");
        Some(ChatRelayEvent::Completed {
            content: self.content.clone(),
            reasoning: self.reasoning.as_str().to_string(),
            metadata: ChatMetadata::default(),
            raw: None,
        })
    }

    /// Fatal failure. Yields an error event unless already terminal.
    pub fn fail(&mut self, error: RelayError) -> Option<ChatRelayEvent> {
        if !self.state.fail() {
            return None;
        }
        tracing::warn!(error = %error, "chat stream failed");
        Some(ChatRelayEvent::Error { error })
    }
}

/// Run a [`ChatRelay`] over a stream of decoded lines.
///
/// Reading stops at the first terminal event, which drops `lines` and with it
/// the underlying connection.
pub fn relay_chat_events(lines: JsonLineStream) -> ChatEventStream {
    let out = async_stream::stream! {
        let mut relay = ChatRelay::new();
        relay.begin();
        let mut lines = lines;

        while let Some(item) = lines.next().await {
            match item {
                Ok(raw) => {
                    for event in relay.dispatch(raw) {
                        yield event;
                    }
                    if relay.is_terminal() {
                        return;
                    }
                }
                Err(error) => {
                    if let Some(event) = relay.fail(error) {
                        yield event;
                    }
                    return;
                }
            }
        }

        if let Some(event) = relay.finish() {
            yield event;
        }
    };

    Box::pin(out)
}

/// Callback sink for chat events.
///
/// All methods default to no-ops so implementors pick what they need.
pub trait ChatStreamHandler {
    fn on_delta(&mut self, _fragment: &str, _cumulative: &str, _raw: &Value) {}

    fn on_reasoning(&mut self, _fragment: &str, _cumulative: &str) {}

    fn on_complete(&mut self, _content: &str, _reasoning: &str, _metadata: &ChatMetadata) {}

    fn on_error(&mut self, _error: &RelayError) {}
}

/// Final state of a successfully completed turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatOutcome {
    pub content: String,
    pub reasoning: String,
    pub metadata: ChatMetadata,
}

/// Drain an event stream into a handler.
///
/// Returns the completed turn, or the error that ended it. A stream that
/// ends without a terminal event is reported as a stream error.
pub async fn drive<H>(mut events: ChatEventStream, handler: &mut H) -> Result<ChatOutcome>
where
    H: ChatStreamHandler + ?Sized,
{
    while let Some(event) = events.next().await {
        match event {
            ChatRelayEvent::Delta {
                fragment,
                cumulative,
                raw,
            } => handler.on_delta(&fragment, &cumulative, &raw),
            ChatRelayEvent::ReasoningDelta {
                fragment,
                cumulative,
            } => handler.on_reasoning(&fragment, &cumulative),
            ChatRelayEvent::Completed {
                content,
                reasoning,
                metadata,
                ..
            } => {
                handler.on_complete(&content, &reasoning, &metadata);
                return Ok(ChatOutcome {
                    content,
                    reasoning,
                    metadata,
                });
            }
            ChatRelayEvent::Error { error } => {
                handler.on_error(&error);
                return Err(error);
            }
        }
    }
    let error = RelayError::Stream("chat stream ended without a completion event".to_string());
    handler.on_error(&error);
    Err(error)
}
