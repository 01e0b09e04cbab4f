// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Banana image generation engine.
//!
//! This crate provides the error taxonomy, the request and message types, and
//! the channel trait used throughout the workspace.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{BananaError, FailureReason, ImageSourceKind, ProviderFailure};
pub use traits::ChannelAdapter;
pub use types::{
    ApiFlavor, AspectRatio, Attachment, ChannelCapabilities, ConversationId, GeneratedImage,
    GenerationRequest, ImageData, ImageRef, ImageSize, InboundMessage, MessageId, MessageSegment,
    OutboundMessage, ParticipantId, ProviderSelection, QuotedMessage, SelectionOrigin, SessionKey,
};
