// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible chat-completions backend.
//!
//! Image-capable chat models return pictures either in `message.images` or as
//! data URLs inside the text content; both are accepted.

use async_trait::async_trait;
use banana_core::{ApiFlavor, FailureReason, ImageData};
use futures::StreamExt;
use secrecy::ExposeSecret;
use tracing::{debug, warn};

use crate::backend::{BackendCall, ImageBackend};
use crate::http::{read_body, status_failure, transport_failure};
use crate::payload::Payload;
use crate::response::{BackendOutput, OpenAiResponse};
use crate::sse::parse_sse_stream;

/// HTTP backend for OpenAI-style endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    client: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Downloads images the API returned by URL instead of inline.
    async fn fetch_remote(&self, urls: Vec<String>, out: &mut BackendOutput, secrets: &[&str]) {
        for url in urls {
            let result = async {
                let resp = self.client.get(&url).send().await?.error_for_status()?;
                resp.bytes().await
            }
            .await;
            match result {
                Ok(bytes) if !bytes.is_empty() => out.images.push(ImageData::from_bytes(bytes.to_vec())),
                Ok(_) => {}
                Err(e) => warn!(
                    error = %banana_security::redact(&e.to_string(), secrets),
                    "failed to download generated image"
                ),
            }
        }
    }
}

#[async_trait]
impl ImageBackend for OpenAiBackend {
    fn flavor(&self) -> ApiFlavor {
        ApiFlavor::OpenAi
    }

    async fn generate(&self, call: BackendCall<'_>) -> Result<BackendOutput, FailureReason> {
        let Payload::OpenAi(body) = call.payload else {
            return Err(FailureReason::FlavorMismatch);
        };
        let secrets = call.provider.secret_values();
        let mut body = body.clone();
        body.stream = call.streaming;
        debug!(provider = %call.provider.name, streaming = call.streaming, "sending chat completion request");

        let response = self
            .client
            .post(&call.provider.base_url)
            .bearer_auth(call.key.expose_secret())
            .timeout(call.provider.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_failure(&e, &secrets))?;

        if !response.status().is_success() {
            return Err(status_failure(&call.provider.name, response, &secrets).await);
        }

        let (mut out, remote) = if call.streaming {
            let mut stream = parse_sse_stream::<OpenAiResponse>(response);
            let mut chunks = Vec::new();
            while let Some(chunk) = stream.next().await {
                chunks.push(chunk?);
            }
            OpenAiResponse::from_chunks(chunks).into_output()
        } else {
            let text = read_body(response, &secrets).await?;
            let parsed: OpenAiResponse = serde_json::from_str(&text)
                .map_err(|e| FailureReason::Decode(format!("chat completion response: {e}")))?;
            parsed.into_output()
        };

        self.fetch_remote(remote, &mut out, &secrets).await;
        out.require_images()
    }
}
