// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The raw backend seam: one HTTP call for one key.

use async_trait::async_trait;
use banana_core::{ApiFlavor, FailureReason};
use secrecy::SecretString;

use crate::payload::Payload;
use crate::response::BackendOutput;
use crate::spec::ProviderSpec;

/// Everything a backend needs for a single attempt.
#[derive(Debug, Clone, Copy)]
pub struct BackendCall<'a> {
    pub provider: &'a ProviderSpec,
    pub key: &'a SecretString,
    pub payload: &'a Payload,
    /// Use the streaming endpoint.
    pub streaming: bool,
}

/// Sends a payload to a provider and returns the decoded images.
///
/// Implementations perform exactly one request; retries, key rotation and
/// fallback belong to the dispatcher.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// API flavor this backend speaks.
    fn flavor(&self) -> ApiFlavor;

    async fn generate(&self, call: BackendCall<'_>) -> Result<BackendOutput, FailureReason>;
}
