//! Image generation and analysis forwarding.

#[path = "support/gateway.rs"]
mod support;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ollama_relay::RelayConfig;
use ollama_relay::RelayError;
use ollama_relay::types::{DEFAULT_ANALYZE_PROMPT, ImageGenerationRequest, ImageOptions, ImageUpload};
use serde_json::{Value, json};
use support::{PNG_BYTES, spawn_gateway, spawn_gateway_with};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_generate(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llava",
            "response": "A small red square.",
            "done": true,
            "eval_count": 7
        })))
        .mount(server)
        .await;
}

async fn last_backend_body(server: &MockServer) -> Value {
    let requests = server.received_requests().await.unwrap();
    let last = requests.last().expect("backend was called");
    serde_json::from_slice(&last.body).unwrap()
}

#[tokio::test]
async fn random_seed_is_resolved_before_forwarding() {
    let backend = MockServer::start().await;
    mount_generate(&backend).await;
    let gateway = spawn_gateway(&backend.uri()).await;

    let request = ImageGenerationRequest::new("sdxl", "a lighthouse at dusk")
        .options(ImageOptions::standard().steps(30));
    let reply = gateway.client.generate_image(&request).await.unwrap();
    assert_eq!(reply.response, "A small red square.");

    let body = last_backend_body(&backend).await;
    assert_eq!(body["model"], "sdxl");
    assert_eq!(body["prompt"], "a lighthouse at dusk");
    assert_eq!(body["stream"], false);
    assert_eq!(body["options"]["steps"], 30);
    assert_eq!(body["options"]["width"], 512);
    let seed = body["options"]["seed"].as_i64().unwrap();
    assert!((0..1_000_000).contains(&seed), "seed {seed} out of range");
}

#[tokio::test]
async fn explicit_seed_is_kept() {
    let backend = MockServer::start().await;
    mount_generate(&backend).await;
    let gateway = spawn_gateway(&backend.uri()).await;

    let request = ImageGenerationRequest::new("sdxl", "a lighthouse")
        .options(ImageOptions::default().seed(1234));
    gateway.client.generate_image(&request).await.unwrap();

    let body = last_backend_body(&backend).await;
    assert_eq!(body["options"]["seed"], 1234);
}

#[tokio::test]
async fn generation_requires_model_and_prompt() {
    let backend = MockServer::start().await;
    let gateway = spawn_gateway(&backend.uri()).await;

    let response = reqwest::Client::new()
        .post(format!("{}/generate-image", gateway.api_url()))
        .json(&json!({"model": "sdxl"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"error": "Model and prompt are required"}));
}

#[tokio::test]
async fn analysis_sends_base64_image_with_default_prompt() {
    let backend = MockServer::start().await;
    mount_generate(&backend).await;
    let gateway = spawn_gateway(&backend.uri()).await;

    let upload = ImageUpload::new(PNG_BYTES.to_vec()).file_name("square.png");
    let reply = gateway
        .client
        .analyze_image("llava", None, upload)
        .await
        .unwrap();
    assert_eq!(reply.response, "A small red square.");
    assert_eq!(reply.eval_count, Some(7));

    let body = last_backend_body(&backend).await;
    assert_eq!(body["model"], "llava");
    assert_eq!(body["prompt"], DEFAULT_ANALYZE_PROMPT);
    assert_eq!(body["stream"], false);
    assert_eq!(body["images"], json!([STANDARD.encode(PNG_BYTES)]));
}

#[tokio::test]
async fn analysis_keeps_caller_prompt() {
    let backend = MockServer::start().await;
    mount_generate(&backend).await;
    let gateway = spawn_gateway(&backend.uri()).await;

    let upload = ImageUpload::new(PNG_BYTES.to_vec());
    gateway
        .client
        .analyze_image("llava", Some("What colour is it?"), upload)
        .await
        .unwrap();

    let body = last_backend_body(&backend).await;
    assert_eq!(body["prompt"], "What colour is it?");
}

#[tokio::test]
async fn non_image_upload_is_rejected() {
    let backend = MockServer::start().await;
    let gateway = spawn_gateway(&backend.uri()).await;

    let upload = ImageUpload::new(b"just some text".to_vec()).content_type("text/plain");
    let err = gateway
        .client
        .analyze_image("llava", None, upload)
        .await
        .unwrap_err();
    assert_eq!(err, RelayError::Validation("Uploaded file is not an image".into()));
    assert!(backend.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn oversized_upload_is_rejected_with_413() {
    let backend = MockServer::start().await;
    let config = RelayConfig::builder()
        .backend_url(backend.uri())
        .max_image_bytes(8)
        .build()
        .unwrap();
    let gateway = spawn_gateway_with(config).await;

    let upload = ImageUpload::new(PNG_BYTES.to_vec());
    let err = gateway
        .client
        .analyze_image("llava", None, upload)
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Backend { status: 413, .. }), "{err:?}");
    assert!(backend.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn upload_without_model_is_rejected() {
    let backend = MockServer::start().await;
    let gateway = spawn_gateway(&backend.uri()).await;

    let part = reqwest::multipart::Part::bytes(PNG_BYTES.to_vec())
        .file_name("square.png")
        .mime_str("image/png")
        .unwrap();
    let form = reqwest::multipart::Form::new().part("image", part);
    let response = reqwest::Client::new()
        .post(format!("{}/analyze-image", gateway.api_url()))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"error": "Model and image file are required"}));
}
