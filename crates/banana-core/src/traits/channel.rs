// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel adapter trait for chat platform integrations.

use async_trait::async_trait;

use crate::error::BananaError;
use crate::types::{
    ChannelCapabilities, ConversationId, ImageData, InboundMessage, MessageId, OutboundMessage,
    ParticipantId,
};

/// Adapter for a chat platform.
///
/// Besides sending and receiving, the adapter is the only component that
/// talks to the platform's media endpoints, so avatar lookup and remote image
/// download go through it as well.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Human-readable adapter name used in logs.
    fn name(&self) -> &str;

    /// Returns the capabilities supported by this channel.
    fn capabilities(&self) -> ChannelCapabilities;

    /// Sends a message through the channel.
    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, BananaError>;

    /// Receives the next inbound message. `Ok(None)` means the channel closed.
    async fn receive(&self) -> Result<Option<InboundMessage>, BananaError>;

    /// Resolves a participant's avatar within a conversation.
    async fn resolve_avatar(
        &self,
        conversation: &ConversationId,
        participant: &ParticipantId,
    ) -> Result<ImageData, BananaError>;

    /// Downloads a remote image referenced by a message.
    async fn fetch_image(&self, url: &str) -> Result<ImageData, BananaError>;
}
