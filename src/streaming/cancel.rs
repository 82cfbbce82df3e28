//! Cancellation for consumer streams
//!
//! Wrapping a stream with [`make_cancellable`] returns a [`CancelHandle`].
//! Cancelling wakes a pending read immediately, ends the stream, and drops
//! the inner stream together with its HTTP connection.

use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

/// Handle that stops a wrapped stream.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Handle cancelled together with this one, but able to cancel on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    /// Resolves once cancellation was requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// Wrap `stream` so that it ends when `handle` is cancelled.
pub fn with_cancel<S, T>(stream: S, handle: &CancelHandle) -> Pin<Box<dyn Stream<Item = T> + Send>>
where
    S: Stream<Item = T> + Send + 'static,
    T: Send + 'static,
{
    let token = handle.token.clone();
    let out = async_stream::stream! {
        let mut inner = Box::pin(stream);
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                item = inner.next() => item,
            };
            match next {
                Some(item) => yield item,
                None => break,
            }
        }
        if token.is_cancelled() {
            tracing::debug!("stream cancelled by consumer");
        }
    };
    Box::pin(out)
}

/// Wrap `stream` with a fresh handle.
pub fn make_cancellable<S, T>(stream: S) -> (Pin<Box<dyn Stream<Item = T> + Send>>, CancelHandle)
where
    S: Stream<Item = T> + Send + 'static,
    T: Send + 'static,
{
    let handle = CancelHandle::new();
    (with_cancel(stream, &handle), handle)
}
