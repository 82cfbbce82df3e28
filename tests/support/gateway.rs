//! Test helpers: run the gateway in-process against a fake model server.

#![allow(dead_code)]

use std::net::SocketAddr;

use axum::Router;
use ollama_relay::RelayConfig;
use ollama_relay::client::RelayClient;
use ollama_relay::gateway::{self, AppState};

/// A gateway bound to an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub client: RelayClient,
    task: tokio::task::JoinHandle<()>,
}

impl TestGateway {
    /// Base URL including the `/api` prefix.
    pub fn api_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub async fn spawn_gateway(backend_url: &str) -> TestGateway {
    let config = RelayConfig::builder()
        .backend_url(backend_url)
        .build()
        .expect("config");
    spawn_gateway_with(config).await
}

pub async fn spawn_gateway_with(config: RelayConfig) -> TestGateway {
    let state = AppState::new(config).expect("state");
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        axum::serve(listener, gateway::app(state)).await.unwrap();
    });
    let client = RelayClient::new(format!("http://{addr}/api")).expect("client");
    TestGateway { addr, client, task }
}

/// Serve an arbitrary router as a fake model server; returns its base URL.
pub async fn spawn_backend(app: Router) -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), task)
}

/// Newline-delimited JSON body.
pub fn ndjson(lines: &[serde_json::Value]) -> String {
    lines
        .iter()
        .map(|l| format!("{l}\n"))
        .collect::<String>()
}

/// Minimal valid PNG header, enough for content sniffing.
pub const PNG_BYTES: &[u8] = &[
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D', b'R',
];
