// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request orchestration for the Banana image generation engine.
//!
//! The [`Orchestrator`] is the central coordinator that:
//! - Receives messages from a channel adapter
//! - Serializes each sender's messages through a per-key queue
//! - Drives gather sessions and preset triggers into generation requests
//! - Serves LLM function-tool calls over the same pipeline
//! - Assembles reference images and dispatches across providers
//! - Delivers results and handles graceful shutdown

pub mod admin;
pub mod assembler;
pub mod delivery;
pub mod orchestrator;
pub mod queue;
pub mod shutdown;
pub mod tool;

pub use admin::{AdminCommand, AdminOps};
pub use assembler::{AssemblySources, ImageReferenceAssembler};
pub use delivery::{ImageSaver, build_reply};
pub use orchestrator::{Handled, Orchestrator};
pub use queue::KeyedQueue;
pub use shutdown::install_signal_handler;
pub use tool::{TOOL_NAME, ToolOutput, ToolRequest};
