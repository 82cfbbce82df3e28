//! Event-stream consumer
//!
//! Decodes `data:` payloads of a server-sent event stream into JSON values.
//! Comment and non-data lines are ignored, as are payloads that are not
//! valid JSON.

use std::fmt::Display;

use eventsource_stream::{EventStreamError, Eventsource};
use futures_util::{Stream, StreamExt};

use super::line_decoder::{JsonLineStream, parse_line};
use crate::error::RelayError;

/// Convert an SSE byte stream into a stream of JSON payloads.
///
/// A transport failure is yielded once and ends the stream; so does a
/// framing error from the event-stream parser.
pub fn sse_json_values<S, B, E>(byte_stream: S) -> JsonLineStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<RelayError> + Display + Send + 'static,
{
    let out = async_stream::stream! {
        let mut events = Box::pin(byte_stream.eventsource());

        while let Some(item) = events.next().await {
            let event = match item {
                Ok(event) => event,
                Err(EventStreamError::Transport(e)) => {
                    yield Err(e.into());
                    return;
                }
                Err(e) => {
                    yield Err(RelayError::Stream(format!("event stream decode error: {e}")));
                    return;
                }
            };

            let data = event.data.trim();
            if data.is_empty() {
                continue;
            }
            if let Some(value) = parse_line(data) {
                yield Ok(value);
            }
        }
    };

    Box::pin(out)
}
