// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Banana image generation engine.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

/// The primary error type used across the orchestration pipeline.
#[derive(Debug, Error)]
pub enum BananaError {
    /// Configuration errors (invalid TOML, missing provider, bad alias entry).
    #[error("configuration error: {0}")]
    Config(String),

    /// A flag value could not be coerced, or the image bounds are inconsistent.
    #[error("invalid value `{value}` for --{flag}: expected {expected}")]
    Validation {
        flag: String,
        value: String,
        expected: String,
    },

    /// Not enough reference images after every fallback source was tried.
    #[error("need at least {required} image(s), only {available} available")]
    InsufficientImages {
        required: usize,
        available: usize,
        exhausted: Vec<ImageSourceKind>,
    },

    /// Every provider in the resolved list failed.
    #[error("{}", format_provider_failures(.failures))]
    AllProvidersFailed { failures: Vec<ProviderFailure> },

    /// Whitelist or admin check refused the caller. Never shown to end users.
    #[error("permission denied for {subject}")]
    PermissionDenied { subject: String },

    /// Provider backend errors outside the fallback loop (client construction, bad payload).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Channel adapter errors (send failure, avatar lookup, image download).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Local file errors (reference images, saved output).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BananaError {
    /// Text suitable for a chat reply.
    ///
    /// Provider failures collapse into a single line; the per-provider detail
    /// stays in the logs because raw bodies can carry keys or encoded images.
    pub fn user_message(&self) -> String {
        match self {
            BananaError::Validation {
                flag,
                value,
                expected,
            } => format!("❌ Invalid parameter --{flag} `{value}`: expected {expected}"),
            BananaError::InsufficientImages {
                required,
                available,
                exhausted,
            } => {
                let sources = exhausted
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "❌ Not enough images: need {required}, got {available} (short by {}). Tried: {sources}",
                    required.saturating_sub(*available)
                )
            }
            BananaError::AllProvidersFailed { failures } if failures.is_empty() => {
                "❌ Image generation failed: no provider is available".to_string()
            }
            BananaError::AllProvidersFailed { failures } => format!(
                "❌ Image generation failed after trying {} provider(s)",
                failures.len()
            ),
            BananaError::Timeout { .. } => "❌ Image generation timed out".to_string(),
            _ => "❌ An internal error occurred while processing the request".to_string(),
        }
    }
}

fn format_provider_failures(failures: &[ProviderFailure]) -> String {
    if failures.is_empty() {
        return "no provider available".to_string();
    }
    let detail = failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    format!("all providers failed: {detail}")
}

/// Where a reference image came from during assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ImageSourceKind {
    Attached,
    Reference,
    MentionAvatar,
    SenderAvatar,
}

/// One failed provider attempt, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    pub provider: String,
    pub reason: FailureReason,
}

impl ProviderFailure {
    pub fn new(provider: impl Into<String>, reason: FailureReason) -> Self {
        Self {
            provider: provider.into(),
            reason,
        }
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.reason)
    }
}

/// Why a single provider attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// No response within the provider's timeout.
    Timeout,
    /// Non-success HTTP status with an extracted error message.
    Http { status: u16, message: String },
    /// Successful status, but the API reported an error or a non-STOP finish.
    Api(String),
    /// Content safety system refused the prompt.
    Blocked(String),
    /// Response carried no image data.
    Empty,
    /// An image exceeded the provider's configured size cap.
    Oversized { size: usize, limit: usize },
    /// Connection-level failure.
    Transport(String),
    /// Response body could not be decoded.
    Decode(String),
    /// The name is not configured.
    UnknownProvider,
    /// The provider has no API key configured.
    NoKeys,
    /// Payload flavor does not match the backend.
    FlavorMismatch,
}

impl FailureReason {
    /// Statuses worth retrying on the same key: 408 and the 5xx gateway family.
    pub fn is_retryable(&self) -> bool {
        match self {
            FailureReason::Timeout => true,
            FailureReason::Http { status, .. } => {
                matches!(status, 408 | 500 | 502 | 503 | 504)
            }
            _ => false,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout => write!(f, "timed out"),
            FailureReason::Http { status, message } => write!(f, "HTTP {status}: {message}"),
            FailureReason::Api(msg) => write!(f, "api error: {msg}"),
            FailureReason::Blocked(reason) => write!(f, "blocked by safety system: {reason}"),
            FailureReason::Empty => write!(f, "response contained no image data"),
            FailureReason::Oversized { size, limit } => {
                write!(f, "image of {size} bytes exceeds limit of {limit} bytes")
            }
            FailureReason::Transport(msg) => write!(f, "transport error: {msg}"),
            FailureReason::Decode(msg) => write!(f, "decode error: {msg}"),
            FailureReason::UnknownProvider => write!(f, "provider is not configured"),
            FailureReason::NoKeys => write!(f, "no API key configured"),
            FailureReason::FlavorMismatch => write!(f, "payload flavor does not match backend"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_user_message_names_flag() {
        let err = BananaError::Validation {
            flag: "max_images".into(),
            value: "many".into(),
            expected: "an integer".into(),
        };
        let msg = err.user_message();
        assert!(msg.contains("--max_images"));
        assert!(msg.contains("many"));
    }

    #[test]
    fn insufficient_images_reports_shortfall() {
        let err = BananaError::InsufficientImages {
            required: 3,
            available: 1,
            exhausted: vec![ImageSourceKind::Attached, ImageSourceKind::SenderAvatar],
        };
        let msg = err.user_message();
        assert!(msg.contains("short by 2"));
        assert!(msg.contains("sender_avatar"));
    }

    #[test]
    fn provider_failures_hidden_from_user_message() {
        let err = BananaError::AllProvidersFailed {
            failures: vec![
                ProviderFailure::new(
                    "a",
                    FailureReason::Http {
                        status: 500,
                        message: "secret body".into(),
                    },
                ),
                ProviderFailure::new("b", FailureReason::Timeout),
            ],
        };
        assert!(!err.user_message().contains("secret body"));
        // Display keeps the ordered detail for logs.
        let detail = err.to_string();
        let a = detail.find("a: HTTP 500").unwrap();
        let b = detail.find("b: timed out").unwrap();
        assert!(a < b);
    }

    #[test]
    fn retryable_statuses() {
        assert!(FailureReason::Timeout.is_retryable());
        for status in [408, 500, 502, 503, 504] {
            assert!(
                FailureReason::Http {
                    status,
                    message: String::new()
                }
                .is_retryable()
            );
        }
        for status in [401, 403, 422, 429] {
            assert!(
                !FailureReason::Http {
                    status,
                    message: String::new()
                }
                .is_retryable()
            );
        }
        assert!(!FailureReason::Empty.is_retryable());
    }
}
