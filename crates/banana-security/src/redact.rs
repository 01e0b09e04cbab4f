// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Secret redaction for log output and error messages.
//!
//! Two complementary mechanisms:
//! 1. **Regex-based**: known key formats, bearer tokens, inline image data.
//! 2. **Exact-match**: configured provider keys passed in at runtime.

use std::sync::LazyLock;

use regex::Regex;

/// Known secret patterns to redact from output.
static REDACTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // Google API keys: AIzaSy...
        Regex::new(r"AIza[0-9A-Za-z_\-]{30,}").unwrap(),
        // OpenAI-style secret keys, including sk-proj-... and sk-or-v1-...
        Regex::new(r"sk-[a-zA-Z0-9_\-]{20,}").unwrap(),
        // Bearer tokens in headers
        Regex::new(r"Bearer\s+[a-zA-Z0-9._\-]{10,}").unwrap(),
        // key=... query parameters
        Regex::new(r"([?&]key=)[^&\s]+").unwrap(),
    ]
});

/// Inline base64 payloads: data URLs and long bare runs.
static BASE64_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"data:[a-z]+/[a-z0-9.+\-]+;base64,[A-Za-z0-9+/=]+").unwrap(),
        Regex::new(r"[A-Za-z0-9+/]{200,}={0,2}").unwrap(),
    ]
});

/// The redaction placeholder.
const REDACTED: &str = "[REDACTED]";

const BASE64_ELIDED: &str = "[base64 elided]";

/// Default length used by [`truncate_for_log`] callers.
pub const LOG_BODY_LIMIT: usize = 512;

/// Redact secrets from a string using regex patterns and exact secret values.
pub fn redact(input: &str, secrets: &[&str]) -> String {
    let mut result = input.to_string();

    for pattern in BASE64_PATTERNS.iter() {
        result = pattern.replace_all(&result, BASE64_ELIDED).to_string();
    }
    for pattern in REDACTION_PATTERNS.iter() {
        result = pattern
            .replace_all(&result, |caps: &regex::Captures<'_>| match caps.get(1) {
                Some(prefix) => format!("{}{REDACTED}", prefix.as_str()),
                None => REDACTED.to_string(),
            })
            .to_string();
    }

    // Longest first so a key containing another key is replaced whole.
    let mut sorted: Vec<&str> = secrets.iter().copied().filter(|s| !s.is_empty()).collect();
    sorted.sort_by_key(|s| std::cmp::Reverse(s.len()));
    for secret in sorted {
        result = result.replace(secret, REDACTED);
    }

    result
}

/// Cuts `input` to at most `limit` characters on a char boundary.
pub fn truncate_for_log(input: &str, limit: usize) -> String {
    match input.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}... ({} bytes total)", &input[..idx], input.len()),
        None => input.to_string(),
    }
}

/// Redacts then truncates a provider response body for logging.
pub fn sanitize_body(body: &str, secrets: &[&str]) -> String {
    truncate_for_log(&redact(body, secrets), LOG_BODY_LIMIT)
}
