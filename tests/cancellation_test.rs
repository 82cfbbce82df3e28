//! Cancellation of streams that never finish, on both sides of the gateway.

#[path = "support/gateway.rs"]
mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::response::Response;
use axum::{Router, routing::post};
use futures::StreamExt;
use ollama_relay::streaming::ChatRelayEvent;
use ollama_relay::types::{ChatRequest, Message};
use serde_json::{Value, json};
use support::{spawn_backend, spawn_gateway};

/// Model server that emits one fragment and then stalls.
fn stalled_backend() -> Router {
    Router::new().route(
        "/api/chat",
        post(|| async {
            let stream = async_stream::stream! {
                yield Ok::<Bytes, std::io::Error>(Bytes::from_static(
                    b"{\"message\":{\"content\":\"Once upon\"}}\n",
                ));
                futures::future::pending::<()>().await;
            };
            Response::builder()
                .header("content-type", "application/x-ndjson")
                .body(Body::from_stream(stream))
                .unwrap()
        }),
    )
}

#[tokio::test]
async fn cancel_ends_a_stalled_stream_promptly() {
    let (backend_url, _backend) = spawn_backend(stalled_backend()).await;
    let gateway = spawn_gateway(&backend_url).await;

    let request = ChatRequest::new("test", vec![Message::user("tell me a story")]);
    let (mut events, handle) = gateway
        .client
        .chat_stream_cancellable(request)
        .await
        .unwrap();

    let first = tokio::time::timeout(Duration::from_secs(5), events.next())
        .await
        .expect("first fragment arrives");
    assert!(matches!(
        first,
        Some(ChatRelayEvent::Delta { ref cumulative, .. }) if cumulative == "Once upon"
    ));

    let canceller = handle.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let next = tokio::time::timeout(Duration::from_secs(5), events.next())
        .await
        .expect("cancellation wakes the pending read");
    assert!(next.is_none());
    assert!(handle.is_cancelled());
}

#[tokio::test]
async fn cancelled_stream_yields_nothing_further() {
    let (backend_url, _backend) = spawn_backend(stalled_backend()).await;
    let gateway = spawn_gateway(&backend_url).await;

    let request = ChatRequest::new("test", vec![Message::user("hi")]);
    let (mut events, handle) = gateway
        .client
        .chat_stream_cancellable(request)
        .await
        .unwrap();
    handle.cancel();

    assert!(events.next().await.is_none());
    assert!(events.next().await.is_none());
}

/// Sets its flag when dropped.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Model server whose `route` streams `line` forever. The returned flag
/// flips once the server drops the response body.
fn endless_backend(route: &'static str, line: Value) -> (Router, Arc<AtomicBool>) {
    let dropped = Arc::new(AtomicBool::new(false));
    let flag = dropped.clone();
    let app = Router::new().route(
        route,
        post(move || {
            let flag = flag.clone();
            let line = format!("{line}\n");
            async move {
                let stream = async_stream::stream! {
                    let _guard = DropFlag(flag);
                    loop {
                        yield Ok::<Bytes, std::io::Error>(Bytes::from(line.clone()));
                        tokio::time::sleep(Duration::from_millis(20)).await;
                    }
                };
                Response::builder()
                    .header("content-type", "application/x-ndjson")
                    .body(Body::from_stream(stream))
                    .unwrap()
            }
        }),
    );
    (app, dropped)
}

async fn wait_for(flag: &AtomicBool) -> bool {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !flag.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .is_ok()
}

/// Post to a streaming gateway route, read the first event, then hang up.
async fn read_one_event_and_disconnect(url: String, body: Value) {
    let mut response = reqwest::Client::new()
        .post(url)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let first = tokio::time::timeout(Duration::from_secs(5), response.chunk())
        .await
        .expect("first event arrives")
        .unwrap()
        .expect("body is not empty");
    assert!(first.starts_with(b"data: "));
    drop(response);
}

#[tokio::test]
async fn abandoned_pull_releases_backend_stream() {
    let (app, dropped) = endless_backend(
        "/api/pull",
        json!({"status": "pulling abc", "completed": 1, "total": 100}),
    );
    let (backend_url, _backend) = spawn_backend(app).await;
    let gateway = spawn_gateway(&backend_url).await;

    read_one_event_and_disconnect(
        format!("{}/models/pull", gateway.api_url()),
        json!({"modelName": "llama3.2"}),
    )
    .await;

    assert!(wait_for(&dropped).await, "backend pull stream still open");
}

#[tokio::test]
async fn abandoned_chat_releases_backend_stream() {
    let (app, dropped) = endless_backend("/api/chat", json!({"message": {"content": "more "}}));
    let (backend_url, _backend) = spawn_backend(app).await;
    let gateway = spawn_gateway(&backend_url).await;

    read_one_event_and_disconnect(
        format!("{}/chat", gateway.api_url()),
        json!({"model": "test", "messages": [{"role": "user", "content": "hi"}]}),
    )
    .await;

    assert!(wait_for(&dropped).await, "backend chat stream still open");
}
