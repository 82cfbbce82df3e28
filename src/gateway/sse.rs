//! Event-stream framing for gateway responses.
//!
//! Every payload is sent as a single `data: <json>` event followed by a blank
//! line. There are no named events and no keep-alive comments.

use std::convert::Infallible;

use axum::response::sse::{Event, Sse};
use futures::{Stream, StreamExt};
use serde_json::Value;
use uuid::Uuid;

/// Convert a stream of JSON payloads into an SSE response.
pub fn to_sse_response<S>(values: S) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send>
where
    S: Stream<Item = Value> + Send + 'static,
{
    Sse::new(values.map(|value| Ok(json_event(&value))))
}

/// One `data:` event carrying compact JSON.
pub fn json_event(value: &Value) -> Event {
    Event::default().data(value.to_string())
}

/// Logs when a relay stream is dropped before it finished, which happens when
/// the client disconnects. Dropping the stream releases the backend
/// connection.
#[derive(Debug)]
pub(crate) struct DisconnectGuard {
    label: &'static str,
    request_id: Uuid,
    finished: bool,
}

impl DisconnectGuard {
    pub(crate) fn new(label: &'static str, request_id: Uuid) -> Self {
        Self {
            label,
            request_id,
            finished: false,
        }
    }

    pub(crate) fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if !self.finished {
            tracing::info!(
                stream = self.label,
                request_id = %self.request_id,
                "client disconnected, releasing backend stream"
            );
        }
    }
}
