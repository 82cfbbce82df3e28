//! Model pull relay
//!
//! Turns the backend's pull progress lines into [`PullEvent`]s and keeps the
//! single [`DownloadProgress`] record for the model being pulled. The stream
//! always ends with exactly one terminal event: a backend `error` line, an
//! explicit `completed` status, or a synthesized completion when the backend
//! simply closes the stream.

use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use serde_json::{Value, json};

use super::line_decoder::JsonLineStream;
use super::state::{RelayState, StateTracker};
use crate::error::RelayError;
use crate::types::models::{DownloadProgress, PullChunk, STATUS_COMPLETED, percent};

/// Events emitted by the pull relay.
#[derive(Debug, Clone, PartialEq)]
pub enum PullEvent {
    /// A progress line. `raw` is the backend line, with `percent` added when
    /// the line reports a non-zero total.
    Progress { progress: DownloadProgress, raw: Value },
    /// Pull finished.
    Completed { progress: DownloadProgress, raw: Value },
    /// Pull failed. Nothing follows.
    Error { error: RelayError },
}

impl PullEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }

    /// JSON object sent to clients for this event.
    pub fn to_wire(&self) -> Value {
        match self {
            Self::Progress { raw, .. } | Self::Completed { raw, .. } => raw.clone(),
            Self::Error { error } => json!({ "error": error.user_message() }),
        }
    }
}

/// Stream of pull events.
pub type PullEventStream = Pin<Box<dyn Stream<Item = PullEvent> + Send>>;

/// Per-request pull dispatcher.
#[derive(Debug)]
pub struct PullRelay {
    state: StateTracker,
    progress: DownloadProgress,
}

impl PullRelay {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            state: StateTracker::new(),
            progress: DownloadProgress::new(model),
        }
    }

    pub fn begin(&mut self) {
        self.state.begin_request();
    }

    pub fn state(&self) -> RelayState {
        self.state.state()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn progress(&self) -> &DownloadProgress {
        &self.progress
    }

    /// Dispatch one decoded line.
    pub fn dispatch(&mut self, mut raw: Value) -> Option<PullEvent> {
        if self.is_terminal() {
            return None;
        }

        if !raw.is_object() {
            tracing::debug!(line = %raw, "skipping pull line that is not an object");
            return None;
        }
        let chunk = PullChunk::from_value_lossy(&raw);
        self.state.line_received();

        if let Some(message) = chunk.error.as_deref() {
            return self.fail(RelayError::BackendReported(message.to_string()));
        }

        self.progress.update(&chunk);

        if let (Some(pct), Some(obj)) = (
            percent(chunk.completed.unwrap_or(0), chunk.total.unwrap_or(0)),
            raw.as_object_mut(),
        ) {
            obj.insert("percent".to_string(), json!(pct));
        }

        if self.progress.is_completed() {
            self.state.complete();
            tracing::info!(model = %self.progress.model, "model pull completed");
            return Some(PullEvent::Completed {
                progress: self.progress.clone(),
                raw,
            });
        }

        tracing::debug!(
            model = %self.progress.model,
            status = %self.progress.status,
            completed = self.progress.completed,
            total = self.progress.total,
            "pull progress"
        );
        Some(PullEvent::Progress {
            progress: self.progress.clone(),
            raw,
        })
    }

    /// Backend stream ended. Synthesizes the completion event unless the
    /// relay is already terminal.
    pub fn finish(&mut self) -> Option<PullEvent> {
        if !self.state.complete() {
            return None;
        }
        self.progress.status = STATUS_COMPLETED.to_string();
        tracing::info!(model = %self.progress.model, "model pull stream closed");
        Some(PullEvent::Completed {
            progress: self.progress.clone(),
            raw: json!({ "status": STATUS_COMPLETED }),
        })
    }

    pub fn fail(&mut self, error: RelayError) -> Option<PullEvent> {
        if !self.state.fail() {
            return None;
        }
        tracing::warn!(model = %self.progress.model, error = %error, "model pull failed");
        Some(PullEvent::Error { error })
    }
}

/// Run a [`PullRelay`] over a stream of decoded lines.
///
/// Reading stops at the first terminal event; later backend output is never
/// read.
pub fn relay_pull_events(model: impl Into<String>, lines: JsonLineStream) -> PullEventStream {
    let model = model.into();
    let out = async_stream::stream! {
        let mut relay = PullRelay::new(model);
        relay.begin();
        let mut lines = lines;

        while let Some(item) = lines.next().await {
            let event = match item {
                Ok(raw) => relay.dispatch(raw),
                Err(error) => relay.fail(error),
            };
            if let Some(event) = event {
                yield event;
            }
            if relay.is_terminal() {
                return;
            }
        }

        if let Some(event) = relay.finish() {
            yield event;
        }
    };

    Box::pin(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;

    async fn collect(values: Vec<Result<Value>>) -> Vec<PullEvent> {
        let lines: JsonLineStream = Box::pin(futures_util::stream::iter(values));
        relay_pull_events("llama3.2", lines).collect().await
    }

    #[tokio::test]
    async fn percent_is_added_when_total_known() {
        let events = collect(vec![
            Ok(json!({"status": "pulling manifest"})),
            Ok(json!({"status": "pulling abc", "digest": "sha256:abc", "completed": 50, "total": 200})),
        ])
        .await;

        let wire: Vec<Value> = events.iter().map(PullEvent::to_wire).collect();
        assert!(wire[0].get("percent").is_none());
        assert_eq!(wire[1]["percent"], 25);
        assert_eq!(wire[1]["digest"], "sha256:abc");
        match &events[1] {
            PullEvent::Progress { progress, .. } => {
                assert_eq!(progress.model, "llama3.2");
                assert_eq!(progress.percent, Some(25));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_end_synthesizes_completed() {
        let events = collect(vec![
            Ok(json!({"status": "pulling manifest"})),
            Ok(json!({"status": "success"})),
        ])
        .await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].to_wire(), json!({"status": "completed"}));
        assert!(events[2].is_terminal());
    }

    #[tokio::test]
    async fn empty_stream_still_completes() {
        let events = collect(vec![]).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], PullEvent::Completed { .. }));
    }

    #[tokio::test]
    async fn explicit_completed_is_not_duplicated() {
        let events = collect(vec![
            Ok(json!({"status": "completed"})),
            Ok(json!({"status": "ignored"})),
        ])
        .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], PullEvent::Completed { .. }));
    }

    #[tokio::test]
    async fn error_line_discards_the_rest() {
        let events = collect(vec![
            Ok(json!({"status": "pulling manifest"})),
            Ok(json!({"error": "pull model manifest: file does not exist"})),
            Ok(json!({"status": "success"})),
        ])
        .await;
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1].to_wire(),
            json!({"error": "pull model manifest: file does not exist"})
        );
    }

    #[tokio::test]
    async fn structured_error_is_terminal() {
        let events = collect(vec![
            Ok(json!({"status": "pulling manifest"})),
            Ok(json!({"error": {"code": 500, "message": "registry unavailable"}})),
            Ok(json!({"status": "completed"})),
        ])
        .await;
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            PullEvent::Error {
                error: RelayError::BackendReported(
                    r#"{"code":500,"message":"registry unavailable"}"#.into()
                )
            }
        );
    }

    #[tokio::test]
    async fn mistyped_counters_do_not_drop_the_line() {
        let events = collect(vec![
            Ok(json!({"status": "pulling abc", "completed": 50, "total": 200})),
            Ok(json!({"status": "completed", "total": -1})),
            Ok(json!({"status": "ignored"})),
        ])
        .await;
        assert_eq!(events.len(), 2);
        match &events[1] {
            PullEvent::Completed { progress, .. } => {
                assert_eq!(progress.total, 200);
                assert_eq!(progress.percent, Some(25));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_object_lines_are_skipped() {
        let events = collect(vec![Ok(json!("pulling")), Ok(json!(42))]).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], PullEvent::Completed { .. }));
    }

    #[tokio::test]
    async fn transport_error_is_terminal() {
        let events = collect(vec![
            Ok(json!({"status": "pulling manifest"})),
            Err(RelayError::transport("connection reset")),
        ])
        .await;
        assert!(matches!(
            events.last(),
            Some(PullEvent::Error {
                error: RelayError::Transport(_)
            })
        ));
    }
}
