// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Image-generation providers for the Banana engine.
//!
//! [`ProviderDispatcher`] walks the resolved provider list with per-key retry
//! and rotation. Request bodies are shaped per API flavor in [`payload`]; the
//! HTTP calls themselves sit behind the [`ImageBackend`] trait so tests and
//! alternative transports can replace them.

pub mod backend;
pub mod dispatcher;
pub mod gemini;
pub mod http;
pub mod openai;
pub mod payload;
pub mod response;
pub mod spec;
pub mod sse;

pub use backend::{BackendCall, ImageBackend};
pub use dispatcher::{DispatchOutcome, PlannedAttempt, ProviderDispatcher, RetryPolicy};
pub use gemini::GeminiBackend;
pub use http::build_client;
pub use openai::OpenAiBackend;
pub use payload::{FieldSet, Payload, PayloadOptions};
pub use response::BackendOutput;
pub use spec::ProviderSpec;
