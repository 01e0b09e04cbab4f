// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime provider descriptions built from configuration.

use std::fmt;
use std::time::Duration;

use banana_config::model::CommonConfig;
use banana_config::ProviderConfig;
use banana_core::ApiFlavor;
use secrecy::{ExposeSecret, SecretString};

/// Chat-completions endpoint used when an OpenAI provider sets no `base_url`.
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Model collection endpoint used when a Gemini provider sets no `base_url`.
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// One configured image-generation provider.
#[derive(Clone)]
pub struct ProviderSpec {
    pub name: String,
    pub flavor: ApiFlavor,
    pub base_url: String,
    pub model: String,
    pub keys: Vec<SecretString>,
    pub stream: bool,
    pub enabled: bool,
    pub timeout: Duration,
    pub max_payload_bytes: Option<usize>,
}

impl ProviderSpec {
    /// Fills flavor defaults and the global timeout.
    pub fn from_config(config: &ProviderConfig, common: &CommonConfig) -> Self {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(config.api_type).to_string());
        Self {
            name: config.name.clone(),
            flavor: config.api_type,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            keys: config
                .keys
                .iter()
                .map(|k| SecretString::from(k.clone()))
                .collect(),
            stream: config.stream,
            enabled: config.enabled,
            timeout: config
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| common.timeout()),
            max_payload_bytes: config.max_payload_bytes,
        }
    }

    /// Raw key values, for redacting them out of logged bodies.
    pub fn secret_values(&self) -> Vec<&str> {
        self.keys.iter().map(|k| k.expose_secret()).collect()
    }
}

pub fn default_base_url(flavor: ApiFlavor) -> &'static str {
    match flavor {
        ApiFlavor::OpenAi => DEFAULT_OPENAI_URL,
        ApiFlavor::Gemini => DEFAULT_GEMINI_URL,
    }
}

impl fmt::Debug for ProviderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSpec")
            .field("name", &self.name)
            .field("flavor", &self.flavor)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("keys", &format_args!("[{} redacted]", self.keys.len()))
            .field("stream", &self.stream)
            .field("enabled", &self.enabled)
            .field("timeout", &self.timeout)
            .field("max_payload_bytes", &self.max_payload_bytes)
            .finish()
    }
}
