// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ordered fallback across providers.
//!
//! Providers are tried strictly one after another in selection order. Inside
//! a provider, keys rotate from a random starting index and each key gets up
//! to `max_retry` attempts. The provider's timeout bounds each attempt, not
//! the provider as a whole, so a hanging provider can hold a request for up
//! to keys x attempts x timeout. The first attempt that yields images within
//! its timeout and the size cap wins; every provider that failed before it
//! is reported alongside the result.

use std::collections::HashMap;
use std::sync::Arc;

use banana_config::BananaConfig;
use banana_config::model::CommonConfig;
use banana_core::{
    ApiFlavor, BananaError, FailureReason, GeneratedImage, GenerationRequest, ProviderFailure,
    ProviderSelection, SelectionOrigin,
};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::backend::{BackendCall, ImageBackend};
use crate::gemini::GeminiBackend;
use crate::http::build_client;
use crate::openai::OpenAiBackend;
use crate::payload::{Payload, PayloadOptions};
use crate::response::BackendOutput;
use crate::spec::ProviderSpec;

/// Per-key retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per key; zero behaves as one.
    pub max_retry: u32,
    /// Only retry a key on timeouts and 408/500/502/503/504.
    pub smart_retry: bool,
}

impl RetryPolicy {
    pub fn from_config(common: &CommonConfig) -> Self {
        Self {
            max_retry: common.max_retry,
            smart_retry: common.smart_retry,
        }
    }

    fn attempts(&self) -> u32 {
        self.max_retry.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&CommonConfig::default())
    }
}

/// A successful dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub image: GeneratedImage,
    /// Providers that failed before the winning one, in attempt order.
    pub failures: Vec<ProviderFailure>,
}

/// One entry of the resolved attempt list.
#[derive(Debug, Clone)]
pub enum PlannedAttempt {
    Provider(Arc<ProviderSpec>),
    Unknown(String),
}

/// Dispatches generation requests across configured providers.
pub struct ProviderDispatcher {
    providers: Vec<Arc<ProviderSpec>>,
    backends: HashMap<ApiFlavor, Arc<dyn ImageBackend>>,
    retry: RetryPolicy,
    options: PayloadOptions,
}

impl ProviderDispatcher {
    /// Creates a dispatcher with no backends registered.
    pub fn new(providers: Vec<ProviderSpec>, retry: RetryPolicy, options: PayloadOptions) -> Self {
        Self {
            providers: providers.into_iter().map(Arc::new).collect(),
            backends: HashMap::new(),
            retry,
            options,
        }
    }

    /// Registers the backend for its flavor, replacing any previous one.
    pub fn with_backend(mut self, backend: Arc<dyn ImageBackend>) -> Self {
        self.backends.insert(backend.flavor(), backend);
        self
    }

    /// Builds providers from `[[providers]]` with both HTTP backends.
    pub fn from_config(config: &BananaConfig) -> Result<Self, BananaError> {
        let client = build_client(&config.common)?;
        let providers = config
            .providers
            .iter()
            .map(|p| ProviderSpec::from_config(p, &config.common))
            .collect();
        Ok(Self::new(
            providers,
            RetryPolicy::from_config(&config.common),
            PayloadOptions {
                text_response: config.common.text_response,
            },
        )
        .with_backend(Arc::new(GeminiBackend::new(client.clone())))
        .with_backend(Arc::new(OpenAiBackend::new(client))))
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderSpec> {
        self.providers
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.as_ref())
    }

    pub fn providers(&self) -> impl Iterator<Item = &ProviderSpec> {
        self.providers.iter().map(|p| p.as_ref())
    }

    /// Resolves a selection into the attempt list.
    ///
    /// Names given on the invocation are tried even when disabled; preset and
    /// default selections skip disabled providers. Unknown names stay in the
    /// list so they are reported as failures in order.
    pub fn plan(&self, selection: &ProviderSelection) -> Vec<PlannedAttempt> {
        let explicit = selection.origin == SelectionOrigin::Invocation;
        selection
            .names
            .iter()
            .filter_map(|name| {
                match self.providers.iter().find(|p| &p.name == name) {
                    None => Some(PlannedAttempt::Unknown(name.clone())),
                    Some(p) if p.enabled || explicit => Some(PlannedAttempt::Provider(Arc::clone(p))),
                    Some(_) => {
                        debug!(provider = %name, "skipping disabled provider");
                        None
                    }
                }
            })
            .collect()
    }

    /// Generates an image, falling back through the selected providers.
    ///
    /// `incremental` reports whether the channel can take streamed output;
    /// streaming providers fall back to buffered calls when it cannot.
    pub async fn dispatch(
        &self,
        request: &GenerationRequest,
        incremental: bool,
    ) -> Result<DispatchOutcome, BananaError> {
        request.check_image_bounds()?;
        let mut failures = Vec::new();

        for planned in self.plan(&request.providers) {
            let spec = match planned {
                PlannedAttempt::Unknown(name) => {
                    warn!(provider = %name, "provider is not configured");
                    failures.push(ProviderFailure::new(name, FailureReason::UnknownProvider));
                    continue;
                }
                PlannedAttempt::Provider(spec) => spec,
            };

            let result = self
                .attempt_provider(&spec, request, incremental)
                .await
                .and_then(|out| check_size(&spec, out));
            match result {
                Ok(out) => {
                    info!(
                        provider = %spec.name,
                        images = out.images.len(),
                        failed_before = failures.len(),
                        "image generated"
                    );
                    return Ok(DispatchOutcome {
                        image: GeneratedImage {
                            provider: spec.name.clone(),
                            images: out.images,
                            text: out.text,
                        },
                        failures,
                    });
                }
                Err(reason) => {
                    warn!(provider = %spec.name, reason = %reason, "provider failed, trying next");
                    failures.push(ProviderFailure::new(spec.name.clone(), reason));
                }
            }
        }

        Err(BananaError::AllProvidersFailed { failures })
    }

    async fn attempt_provider(
        &self,
        spec: &ProviderSpec,
        request: &GenerationRequest,
        incremental: bool,
    ) -> Result<BackendOutput, FailureReason> {
        if spec.keys.is_empty() {
            return Err(FailureReason::NoKeys);
        }
        let backend = self
            .backends
            .get(&spec.flavor)
            .ok_or(FailureReason::FlavorMismatch)?;
        let payload = Payload::build(spec.flavor, &spec.model, request, self.options);
        let streaming = spec.stream && incremental;

        let key_count = spec.keys.len();
        let start = rand::thread_rng().gen_range(0..key_count);
        let attempts = self.retry.attempts();
        let mut last = FailureReason::Empty;

        for offset in 0..key_count {
            let key_index = (start + offset) % key_count;
            for attempt in 1..=attempts {
                let call = BackendCall {
                    provider: spec,
                    key: &spec.keys[key_index],
                    payload: &payload,
                    streaming,
                };
                // Per attempt; retries and key rotation each get a fresh budget.
                let result = match tokio::time::timeout(spec.timeout, backend.generate(call)).await {
                    Ok(result) => result,
                    Err(_) => Err(FailureReason::Timeout),
                };
                match result {
                    Ok(out) => return Ok(out),
                    Err(reason) => {
                        warn!(
                            provider = %spec.name,
                            key_index,
                            attempt,
                            max_attempts = attempts,
                            reason = %reason,
                            "generation attempt failed"
                        );
                        let retryable = reason.is_retryable();
                        last = reason;
                        if self.retry.smart_retry && !retryable {
                            break;
                        }
                    }
                }
            }
            if offset + 1 < key_count {
                debug!(provider = %spec.name, "switching to next key");
            }
        }
        Err(last)
    }
}

fn check_size(spec: &ProviderSpec, out: BackendOutput) -> Result<BackendOutput, FailureReason> {
    let Some(limit) = spec.max_payload_bytes else {
        return Ok(out);
    };
    match out.images.iter().map(|i| i.len()).find(|size| *size > limit) {
        Some(size) => Err(FailureReason::Oversized { size, limit }),
        None => Ok(out),
    }
}
