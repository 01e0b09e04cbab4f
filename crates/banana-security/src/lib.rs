// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Access control and secret hygiene for the Banana image generation engine.
//!
//! Provides the group/user whitelist consulted before any message is handled
//! and redaction of API keys and inline image data from log output.

pub mod redact;
pub mod whitelist;

pub use redact::{LOG_BODY_LIMIT, redact, sanitize_body, truncate_for_log};
pub use whitelist::{Denial, Whitelist, WhitelistScope, WhitelistSnapshot};
