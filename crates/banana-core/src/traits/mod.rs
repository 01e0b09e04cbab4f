// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait definitions for the external collaborators of the engine.
//!
//! The provider backend trait lives next to its HTTP implementations in
//! `banana-provider`; only the chat transport is shared workspace-wide.

pub mod channel;

pub use channel::ChannelAdapter;
