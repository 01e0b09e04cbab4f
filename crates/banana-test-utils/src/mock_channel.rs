// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock channel adapter for deterministic testing.
//!
//! `MockChannel` implements `ChannelAdapter` with injectable inbound messages,
//! captured outbound messages, and in-memory avatar and image tables standing
//! in for the platform's media endpoints.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use banana_core::{
    BananaError, ChannelAdapter, ChannelCapabilities, ConversationId, ImageData, InboundMessage,
    MessageId, OutboundMessage, ParticipantId,
};

/// A mock messaging channel for testing.
///
/// Provides two queues:
/// - **inbound**: Messages injected via `inject_message()` are returned by `receive()`
/// - **sent**: Messages passed to `send()` are captured and retrievable via `sent_messages()`
///
/// Avatars and remote images are looked up in tables filled through the
/// `with_*` builders; anything missing fails like an unreachable URL would.
pub struct MockChannel {
    inbound: Arc<Mutex<VecDeque<InboundMessage>>>,
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    notify: Arc<Notify>,
    closed: AtomicBool,
    capabilities: ChannelCapabilities,
    avatars: HashMap<String, ImageData>,
    images: HashMap<String, ImageData>,
    fetched: Mutex<Vec<String>>,
}

impl MockChannel {
    /// Create a new mock channel with empty queues and no media capabilities.
    pub fn new() -> Self {
        Self {
            inbound: Arc::new(Mutex::new(VecDeque::new())),
            sent: Arc::new(Mutex::new(Vec::new())),
            notify: Arc::new(Notify::new()),
            closed: AtomicBool::new(false),
            capabilities: ChannelCapabilities::default(),
            avatars: HashMap::new(),
            images: HashMap::new(),
            fetched: Mutex::new(Vec::new()),
        }
    }

    pub fn with_capabilities(mut self, capabilities: ChannelCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Registers the avatar returned for `participant` in any conversation.
    pub fn with_avatar(mut self, participant: &str, image: ImageData) -> Self {
        self.avatars.insert(participant.to_string(), image);
        self
    }

    /// Registers the bytes served for `url`.
    pub fn with_image(mut self, url: &str, image: ImageData) -> Self {
        self.images.insert(url.to_string(), image);
        self
    }

    /// Inject an inbound message into the receive queue.
    ///
    /// The next call to `receive()` will return this message.
    pub async fn inject_message(&self, msg: InboundMessage) {
        self.inbound.lock().await.push_back(msg);
        self.notify.notify_one();
    }

    /// Ends the inbound stream once the queue drains.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Get all messages that were sent through `send()`.
    pub async fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().await.clone()
    }

    /// Text of every sent message, in order; attachment-only messages yield "".
    pub async fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .map(|m| m.text.clone().unwrap_or_default())
            .collect()
    }

    /// Get the count of sent messages.
    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Clear all sent messages.
    pub async fn clear_sent(&self) {
        self.sent.lock().await.clear();
    }

    /// URLs requested through `fetch_image`, in call order.
    pub async fn fetched_urls(&self) -> Vec<String> {
        self.fetched.lock().await.clone()
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelAdapter for MockChannel {
    fn name(&self) -> &str {
        "mock-channel"
    }

    fn capabilities(&self) -> ChannelCapabilities {
        self.capabilities.clone()
    }

    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, BananaError> {
        let id = format!("mock-msg-{}", uuid::Uuid::new_v4());
        self.sent.lock().await.push(msg);
        Ok(MessageId(id))
    }

    async fn receive(&self) -> Result<Option<InboundMessage>, BananaError> {
        loop {
            {
                let mut queue = self.inbound.lock().await;
                if let Some(msg) = queue.pop_front() {
                    return Ok(Some(msg));
                }
                if self.closed.load(Ordering::SeqCst) {
                    return Ok(None);
                }
            }
            // Wait for notification that a new message was injected
            self.notify.notified().await;
        }
    }

    async fn resolve_avatar(
        &self,
        _conversation: &ConversationId,
        participant: &ParticipantId,
    ) -> Result<ImageData, BananaError> {
        self.avatars
            .get(&participant.0)
            .cloned()
            .ok_or_else(|| BananaError::Channel {
                message: format!("no avatar for {participant}"),
                source: None,
            })
    }

    async fn fetch_image(&self, url: &str) -> Result<ImageData, BananaError> {
        self.fetched.lock().await.push(url.to_string());
        self.images.get(url).cloned().ok_or_else(|| BananaError::Channel {
            message: format!("failed to download {url}"),
            source: None,
        })
    }
}
