// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared HTTP plumbing for the provider backends.

use banana_config::model::CommonConfig;
use banana_core::{BananaError, FailureReason};
use banana_security::sanitize_body;
use tracing::{error, warn};

/// Builds the client used by every backend.
///
/// TLS 1.2 minimum; `common.proxy` applies to all requests when set.
pub fn build_client(common: &CommonConfig) -> Result<reqwest::Client, BananaError> {
    let mut builder = reqwest::Client::builder()
        .min_tls_version(reqwest::tls::Version::TLS_1_2)
        .user_agent(concat!("banana/", env!("CARGO_PKG_VERSION")));
    if let Some(proxy) = common.proxy.as_deref().filter(|p| !p.is_empty()) {
        let proxy = reqwest::Proxy::all(proxy).map_err(|e| BananaError::Config(format!(
            "invalid proxy `{proxy}`: {e}"
        )))?;
        builder = builder.proxy(proxy);
    }
    builder.build().map_err(|e| {
        error!("failed to build HTTP client: {e}");
        BananaError::Provider {
            message: format!("failed to build HTTP client: {e}"),
            source: Some(Box::new(e)),
        }
    })
}

/// Maps a send or body error to a failure reason.
pub(crate) fn transport_failure(e: &reqwest::Error, secrets: &[&str]) -> FailureReason {
    if e.is_timeout() {
        FailureReason::Timeout
    } else {
        FailureReason::Transport(banana_security::redact(&e.to_string(), secrets))
    }
}

/// Turns a non-success response into [`FailureReason::Http`], logging a
/// redacted excerpt of the body.
pub(crate) async fn status_failure(
    provider: &str,
    response: reqwest::Response,
    secrets: &[&str],
) -> FailureReason {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    warn!(
        provider,
        status = status.as_u16(),
        body = %sanitize_body(&body, secrets),
        "provider returned an error status"
    );
    let message = crate::response::error_message(&body)
        .map(|m| banana_security::redact(&m, secrets))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());
    FailureReason::Http {
        status: status.as_u16(),
        message,
    }
}

/// Reads a successful body as text.
pub(crate) async fn read_body(
    response: reqwest::Response,
    secrets: &[&str],
) -> Result<String, FailureReason> {
    response
        .text()
        .await
        .map_err(|e| transport_failure(&e, secrets))
}
