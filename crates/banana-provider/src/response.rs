// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Response shapes and image extraction for both API flavors.

use std::sync::LazyLock;

use banana_core::{FailureReason, ImageData};
use regex::Regex;
use serde::Deserialize;

/// Images and optional text pulled out of a provider response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendOutput {
    pub images: Vec<ImageData>,
    pub text: Option<String>,
}

impl BackendOutput {
    fn push_text(&mut self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        match &mut self.text {
            Some(existing) => existing.push_str(text),
            None => self.text = Some(text.to_string()),
        }
    }

    /// Appends another chunk's output, keeping image order.
    pub fn merge(&mut self, other: BackendOutput) {
        self.images.extend(other.images);
        if let Some(text) = other.text {
            self.push_text(&text);
        }
    }

    /// An output without images is a failure.
    pub fn require_images(self) -> Result<Self, FailureReason> {
        if self.images.is_empty() {
            Err(FailureReason::Empty)
        } else {
            Ok(self)
        }
    }
}

// --- Gemini -----------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePart {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub inline_data: Option<ResponseInlineData>,
    /// Reasoning parts some models emit before the image; never shown.
    #[serde(default)]
    pub thought: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseInlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

/// Error envelope shared by both flavors: `{"error": {"message": ...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: String,
}

/// Extracts the error message from a failed response body, if it has one.
pub fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ApiErrorResponse>(body)
        .ok()
        .map(|e| e.error.message)
        .filter(|m| !m.is_empty())
}

impl GeminiResponse {
    /// Images from a complete (buffered) response.
    ///
    /// Every candidate must finish with `STOP`; a safety block with no
    /// candidates is reported as [`FailureReason::Blocked`].
    pub fn into_output(self) -> Result<BackendOutput, FailureReason> {
        let blocked = self.block_reason();
        let mut out = BackendOutput::default();
        for candidate in self.candidates {
            match candidate.finish_reason.as_deref() {
                Some("STOP") => {}
                Some(other) => return Err(FailureReason::Api(format!("finish reason {other}"))),
                None => return Err(FailureReason::Api("missing finish reason".to_string())),
            }
            out.merge(candidate_output(candidate.content));
        }
        if out.images.is_empty() {
            if let Some(reason) = blocked {
                return Err(FailureReason::Blocked(reason));
            }
        }
        out.require_images()
    }

    /// Images from one streamed chunk; finish reasons are checked by the caller.
    pub fn chunk_output(self) -> (BackendOutput, Option<String>, Option<String>) {
        let blocked = self.block_reason();
        let mut out = BackendOutput::default();
        let mut finish = None;
        for candidate in self.candidates {
            if candidate.finish_reason.is_some() {
                finish = candidate.finish_reason.clone();
            }
            out.merge(candidate_output(candidate.content));
        }
        (out, finish, blocked)
    }

    fn block_reason(&self) -> Option<String> {
        self.prompt_feedback.as_ref().map(|f| {
            f.block_reason
                .clone()
                .unwrap_or_else(|| "unspecified".to_string())
        })
    }
}

fn candidate_output(content: Option<CandidateContent>) -> BackendOutput {
    let mut out = BackendOutput::default();
    for part in content.map(|c| c.parts).unwrap_or_default() {
        if part.thought == Some(true) {
            continue;
        }
        if let Some(inline) = part.inline_data {
            match ImageData::from_base64(inline.mime_type, &inline.data) {
                Ok(img) if !img.is_empty() => out.images.push(img),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "skipping undecodable inline image"),
            }
        }
        if let Some(text) = part.text {
            out.push_text(&text);
        }
    }
    out
}

// --- OpenAI -----------------------------------------------------------------

static DATA_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"data:(image/[a-zA-Z0-9.+\-]+);base64,([A-Za-z0-9+/=]+)").unwrap()
});

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Choice {
    /// Present in buffered responses.
    #[serde(default)]
    pub message: Option<ChoiceMessage>,
    /// Present in streamed chunks.
    #[serde(default)]
    pub delta: Option<ChoiceMessage>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub images: Vec<ChoiceImage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceImage {
    pub image_url: ChoiceImageUrl,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceImageUrl {
    pub url: String,
}

impl OpenAiResponse {
    /// Folds streamed deltas into one buffered-style response so data URLs
    /// split across chunks are reassembled.
    pub fn from_chunks(chunks: Vec<OpenAiResponse>) -> Self {
        let mut message = ChoiceMessage::default();
        let mut content = String::new();
        for chunk in chunks {
            for choice in chunk.choices {
                let Some(part) = choice.message.or(choice.delta) else {
                    continue;
                };
                if let Some(text) = part.content {
                    content.push_str(&text);
                }
                message.images.extend(part.images);
            }
        }
        if !content.is_empty() {
            message.content = Some(content);
        }
        Self {
            choices: vec![Choice {
                message: Some(message),
                delta: None,
                finish_reason: None,
            }],
        }
    }

    /// Images from `message.images`, or data URLs embedded in the content.
    ///
    /// Remote (`http`) image URLs are returned separately for the backend to
    /// download.
    pub fn into_output(self) -> (BackendOutput, Vec<String>) {
        let mut out = BackendOutput::default();
        let mut remote = Vec::new();
        for choice in self.choices {
            let Some(message) = choice.message.or(choice.delta) else {
                continue;
            };
            for image in message.images {
                match parse_data_url(&image.image_url.url) {
                    Some(img) => out.images.push(img),
                    None if image.image_url.url.starts_with("http") => {
                        remote.push(image.image_url.url)
                    }
                    None => {}
                }
            }
            if let Some(content) = message.content {
                let embedded: Vec<ImageData> = DATA_URL
                    .captures_iter(&content)
                    .filter_map(|c| ImageData::from_base64(&c[1], &c[2]).ok())
                    .collect();
                if embedded.is_empty() {
                    out.push_text(&content);
                } else {
                    out.images.extend(embedded);
                }
            }
        }
        (out, remote)
    }
}

/// Decodes `data:image/...;base64,...`.
pub fn parse_data_url(url: &str) -> Option<ImageData> {
    let caps = DATA_URL.captures(url)?;
    ImageData::from_base64(&caps[1], &caps[2]).ok()
}
