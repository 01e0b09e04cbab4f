// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock image backend for deterministic testing.
//!
//! `MockBackend` implements `ImageBackend` with per-provider scripted results,
//! enabling dispatch and orchestration tests without external API calls.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use banana_core::{ApiFlavor, FailureReason};
use banana_provider::payload::{GeminiPart, OpenAiContentPart};
use banana_provider::{BackendCall, BackendOutput, ImageBackend, Payload};

use crate::fixtures::png;

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub provider: String,
    pub streaming: bool,
    /// Text parts of the payload, joined.
    pub prompt: String,
    /// Inline images carried by the payload.
    pub image_count: usize,
}

impl RecordedCall {
    fn from_call(call: &BackendCall<'_>) -> Self {
        let mut texts = Vec::new();
        let mut image_count = 0;
        match call.payload {
            Payload::Gemini(body) => {
                for part in body.contents.iter().flat_map(|c| c.parts.iter()) {
                    match part {
                        GeminiPart::Text { text } => texts.push(text.clone()),
                        GeminiPart::Inline { .. } => image_count += 1,
                    }
                }
            }
            Payload::OpenAi(body) => {
                for part in body.messages.iter().flat_map(|m| m.content.iter()) {
                    match part {
                        OpenAiContentPart::Text { text } => texts.push(text.clone()),
                        OpenAiContentPart::ImageUrl { .. } => image_count += 1,
                    }
                }
            }
        }
        Self {
            provider: call.provider.name.clone(),
            streaming: call.streaming,
            prompt: texts.join(" "),
            image_count,
        }
    }
}

/// A backend that replays scripted results per provider name.
///
/// Results are popped from each provider's FIFO queue. When a queue is empty
/// the call succeeds with a single small PNG.
pub struct MockBackend {
    flavor: ApiFlavor,
    script: Mutex<HashMap<String, VecDeque<Result<BackendOutput, FailureReason>>>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Option<Duration>,
}

impl MockBackend {
    pub fn new(flavor: ApiFlavor) -> Self {
        Self {
            flavor,
            script: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Every call sleeps for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queues the next result for `provider`.
    pub async fn push(&self, provider: &str, result: Result<BackendOutput, FailureReason>) {
        self.script
            .lock()
            .await
            .entry(provider.to_string())
            .or_default()
            .push_back(result);
    }

    /// Queues a failure for `provider`.
    pub async fn fail(&self, provider: &str, reason: FailureReason) {
        self.push(provider, Err(reason)).await;
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

/// Output with one image of `bytes` bytes.
pub fn output_of(bytes: usize) -> BackendOutput {
    let mut image = png();
    image.data.resize(bytes.max(image.data.len()), 0);
    BackendOutput {
        images: vec![image],
        text: None,
    }
}

#[async_trait]
impl ImageBackend for MockBackend {
    fn flavor(&self) -> ApiFlavor {
        self.flavor
    }

    async fn generate(&self, call: BackendCall<'_>) -> Result<BackendOutput, FailureReason> {
        self.calls.lock().await.push(RecordedCall::from_call(&call));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.script
            .lock()
            .await
            .get_mut(&call.provider.name)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Ok(BackendOutput {
                    images: vec![png()],
                    text: None,
                })
            })
    }
}
