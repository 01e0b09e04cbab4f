// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gemini `generateContent` backend.

use async_trait::async_trait;
use banana_core::{ApiFlavor, FailureReason};
use futures::StreamExt;
use secrecy::ExposeSecret;
use tracing::debug;

use crate::backend::{BackendCall, ImageBackend};
use crate::http::{read_body, status_failure, transport_failure};
use crate::payload::Payload;
use crate::response::{BackendOutput, GeminiResponse};
use crate::sse::parse_sse_stream;

/// HTTP backend for Gemini-style endpoints.
#[derive(Debug, Clone)]
pub struct GeminiBackend {
    client: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn url(call: &BackendCall<'_>) -> String {
        let p = call.provider;
        if call.streaming {
            format!("{}/{}:streamGenerateContent?alt=sse", p.base_url, p.model)
        } else {
            format!("{}/{}:generateContent", p.base_url, p.model)
        }
    }
}

#[async_trait]
impl ImageBackend for GeminiBackend {
    fn flavor(&self) -> ApiFlavor {
        ApiFlavor::Gemini
    }

    async fn generate(&self, call: BackendCall<'_>) -> Result<BackendOutput, FailureReason> {
        let Payload::Gemini(body) = call.payload else {
            return Err(FailureReason::FlavorMismatch);
        };
        let secrets = call.provider.secret_values();
        let url = Self::url(&call);
        debug!(provider = %call.provider.name, streaming = call.streaming, "sending gemini request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", call.key.expose_secret())
            .timeout(call.provider.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_failure(&e, &secrets))?;

        if !response.status().is_success() {
            return Err(status_failure(&call.provider.name, response, &secrets).await);
        }

        if !call.streaming {
            let text = read_body(response, &secrets).await?;
            let parsed: GeminiResponse = serde_json::from_str(&text)
                .map_err(|e| FailureReason::Decode(format!("gemini response: {e}")))?;
            return parsed.into_output();
        }

        let mut chunks = parse_sse_stream::<GeminiResponse>(response);
        let mut out = BackendOutput::default();
        let mut finish = None;
        let mut blocked = None;
        while let Some(chunk) = chunks.next().await {
            let (output, chunk_finish, chunk_blocked) = chunk?.chunk_output();
            out.merge(output);
            finish = chunk_finish.or(finish);
            blocked = chunk_blocked.or(blocked);
        }
        if out.images.is_empty() {
            if let Some(reason) = blocked {
                return Err(FailureReason::Blocked(reason));
            }
            if let Some(reason) = finish.filter(|r| r != "STOP") {
                return Err(FailureReason::Api(format!("finish reason {reason}")));
            }
        }
        out.require_images()
    }
}
