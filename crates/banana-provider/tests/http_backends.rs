// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP backends against a mock server.

use std::sync::Arc;
use std::time::Duration;

use banana_config::model::CommonConfig;
use banana_core::{
    ApiFlavor, AspectRatio, BananaError, FailureReason, GenerationRequest, ImageData, ImageSize,
    ProviderSelection, SelectionOrigin,
};
use banana_provider::{
    BackendCall, GeminiBackend, ImageBackend, OpenAiBackend, Payload, PayloadOptions,
    ProviderDispatcher, ProviderSpec, RetryPolicy, build_client,
};
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL: &str = "gemini-3-pro-image-preview";

fn spec(name: &str, flavor: ApiFlavor, base_url: String, stream: bool) -> ProviderSpec {
    ProviderSpec {
        name: name.into(),
        flavor,
        base_url,
        model: MODEL.into(),
        keys: vec![SecretString::from("test-key".to_string())],
        stream,
        enabled: true,
        timeout: Duration::from_secs(10),
        max_payload_bytes: None,
    }
}

fn request(names: &[&str]) -> GenerationRequest {
    GenerationRequest {
        trigger: "bnt".into(),
        prompt: "sunset over mountains".into(),
        images: vec![ImageData::new("image/png", vec![1, 2, 3])],
        aspect_ratio: "16:9".parse::<AspectRatio>().unwrap(),
        image_size: ImageSize::FourK,
        google_search: false,
        providers: ProviderSelection {
            names: names.iter().map(|n| n.to_string()).collect(),
            origin: SelectionOrigin::Invocation,
        },
        min_images: 1,
        max_images: 6,
        refer_images: vec![],
        gather_mode: false,
    }
}

fn client() -> reqwest::Client {
    build_client(&CommonConfig::default()).unwrap()
}

fn gemini_ok() -> serde_json::Value {
    json!({
        "candidates": [{
            "finishReason": "STOP",
            "content": {"parts": [{"inlineData": {"mimeType": "image/png", "data": "iVBORw0KGgo="}}]}
        }]
    })
}

#[tokio::test]
async fn gemini_buffered_sends_shaped_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/{MODEL}:generateContent")))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "generationConfig": {"imageConfig": {"aspectRatio": "16:9", "imageSize": "4K"}}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_ok()))
        .expect(1)
        .mount(&server)
        .await;

    let provider = spec("g", ApiFlavor::Gemini, server.uri(), false);
    let req = request(&["g"]);
    let payload = Payload::build(ApiFlavor::Gemini, MODEL, &req, PayloadOptions::default());
    let key = provider.keys[0].clone();
    let out = GeminiBackend::new(client())
        .generate(BackendCall {
            provider: &provider,
            key: &key,
            payload: &payload,
            streaming: false,
        })
        .await
        .unwrap();
    assert_eq!(out.images.len(), 1);
    assert_eq!(out.images[0].mime_type, "image/png");
}

#[tokio::test]
async fn gemini_streaming_collects_chunks() {
    let server = MockServer::start().await;
    let body = format!(
        "data: {}\n\ndata: {}\n\n",
        json!({"candidates": [{"content": {"parts": [{"text": "drawing"}]}}]}),
        gemini_ok()
    );
    Mock::given(method("POST"))
        .and(path(format!("/{MODEL}:streamGenerateContent")))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(&server)
        .await;

    let provider = spec("g", ApiFlavor::Gemini, server.uri(), true);
    let req = request(&["g"]);
    let payload = Payload::build(ApiFlavor::Gemini, MODEL, &req, PayloadOptions::default());
    let key = provider.keys[0].clone();
    let out = GeminiBackend::new(client())
        .generate(BackendCall {
            provider: &provider,
            key: &key,
            payload: &payload,
            streaming: true,
        })
        .await
        .unwrap();
    assert_eq!(out.images.len(), 1);
    assert_eq!(out.text.as_deref(), Some("drawing"));
}

#[tokio::test]
async fn gemini_error_status_carries_api_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}
        })))
        .mount(&server)
        .await;

    let provider = spec("g", ApiFlavor::Gemini, server.uri(), false);
    let req = request(&["g"]);
    let payload = Payload::build(ApiFlavor::Gemini, MODEL, &req, PayloadOptions::default());
    let key = provider.keys[0].clone();
    let err = GeminiBackend::new(client())
        .generate(BackendCall {
            provider: &provider,
            key: &key,
            payload: &payload,
            streaming: false,
        })
        .await
        .unwrap_err();
    assert_eq!(
        err,
        FailureReason::Http {
            status: 400,
            message: "API key not valid".into()
        }
    );
}

#[tokio::test]
async fn openai_returns_message_images() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"model": MODEL, "stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {
                "role": "assistant",
                "content": "",
                "images": [{"type": "image_url", "image_url": {"url": "data:image/png;base64,AQID"}}]
            }}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = spec(
        "o",
        ApiFlavor::OpenAi,
        format!("{}/v1/chat/completions", server.uri()),
        false,
    );
    let req = request(&["o"]);
    let payload = Payload::build(ApiFlavor::OpenAi, MODEL, &req, PayloadOptions::default());
    let key = provider.keys[0].clone();
    let out = OpenAiBackend::new(client())
        .generate(BackendCall {
            provider: &provider,
            key: &key,
            payload: &payload,
            streaming: false,
        })
        .await
        .unwrap();
    assert_eq!(out.images, vec![ImageData::new("image/png", vec![1, 2, 3])]);
}

#[tokio::test]
async fn dispatcher_falls_back_over_http() {
    let primary = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&primary)
        .await;
    let backup = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_ok()))
        .mount(&backup)
        .await;

    let client = client();
    let dispatcher = ProviderDispatcher::new(
        vec![
            spec("gemini-primary", ApiFlavor::Gemini, primary.uri(), false),
            spec("gemini-backup", ApiFlavor::Gemini, backup.uri(), false),
        ],
        RetryPolicy {
            max_retry: 2,
            smart_retry: true,
        },
        PayloadOptions::default(),
    )
    .with_backend(Arc::new(GeminiBackend::new(client.clone())))
    .with_backend(Arc::new(OpenAiBackend::new(client)));

    let outcome = dispatcher
        .dispatch(&request(&["gemini-primary", "gemini-backup"]), false)
        .await
        .unwrap();
    assert_eq!(outcome.image.provider, "gemini-backup");
    assert_eq!(outcome.failures.len(), 1);
    assert!(matches!(
        outcome.failures[0].reason,
        FailureReason::Http { status: 503, .. }
    ));
    // 503 is retryable, so the primary's single key used both attempts.
    assert_eq!(primary.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn dispatcher_reports_every_http_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        })))
        .mount(&server)
        .await;

    let client = client();
    let dispatcher = ProviderDispatcher::new(
        vec![spec("g", ApiFlavor::Gemini, server.uri(), false)],
        RetryPolicy::default(),
        PayloadOptions::default(),
    )
    .with_backend(Arc::new(GeminiBackend::new(client)));

    let err = dispatcher.dispatch(&request(&["g"]), false).await.unwrap_err();
    let BananaError::AllProvidersFailed { failures } = err else {
        panic!("expected aggregate failure");
    };
    assert_eq!(failures[0].reason, FailureReason::Blocked("SAFETY".into()));
}
