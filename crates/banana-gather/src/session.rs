// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gather session FSM for one `(conversation, participant)` key.
//!
//! A session starts `Active` when a gather-mode preset is triggered and ends
//! in exactly one terminal state: `TerminatedStart` (dispatch the collected
//! request), `TerminatedCancel`, or `Expired`. The FSM itself knows nothing
//! about timers; the table drives expiry.

use std::fmt;
use std::time::Duration;

use banana_core::{BananaError, GenerationRequest, ImageRef, InboundMessage, SessionKey};
use tokio::time::Instant;

/// States in the gather FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatherState {
    /// Collecting text fragments and images.
    Active,
    /// A start word arrived; the collected request is dispatched.
    TerminatedStart,
    /// A cancel word arrived; everything collected is discarded.
    TerminatedCancel,
    /// The deadline passed without a message.
    Expired,
}

impl fmt::Display for GatherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatherState::Active => write!(f, "active"),
            GatherState::TerminatedStart => write!(f, "terminated_start"),
            GatherState::TerminatedCancel => write!(f, "terminated_cancel"),
            GatherState::Expired => write!(f, "expired"),
        }
    }
}

/// Words that end a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Terminators {
    pub start: Vec<String>,
    pub cancel: Vec<String>,
}

impl Default for Terminators {
    fn default() -> Self {
        Self {
            start: vec!["开始".to_string()],
            cancel: vec!["取消".to_string()],
        }
    }
}

impl Terminators {
    fn classify(&self, text: &str) -> Option<GatherState> {
        let text = text.trim();
        if self.start.iter().any(|w| w == text) {
            Some(GatherState::TerminatedStart)
        } else if self.cancel.iter().any(|w| w == text) {
            Some(GatherState::TerminatedCancel)
        } else {
            None
        }
    }
}

/// Snapshot shown to the user after each contribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatherProgress {
    pub trigger: String,
    /// Base prompt followed by the fragments collected so far.
    pub prompt: String,
    pub image_count: usize,
    pub timeout: Duration,
}

/// What a finished session hands to the orchestrator.
#[derive(Debug, Clone)]
pub struct CollectedRequest {
    /// Base request with the fragments appended to its prompt.
    pub request: GenerationRequest,
    /// Message that started the session; its own attachments and mentions
    /// still count as references.
    pub trigger_message: InboundMessage,
    /// Images contributed during collection, in arrival order, not yet fetched.
    pub images: Vec<ImageRef>,
}

/// Result of feeding one message to an active session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Appended,
    Start,
    Cancel,
}

/// Accumulated state of one gather conversation.
#[derive(Debug, Clone)]
pub struct GatherSession {
    key: SessionKey,
    state: GatherState,
    base: GenerationRequest,
    trigger_message: InboundMessage,
    fragments: Vec<String>,
    images: Vec<ImageRef>,
    created_at: Instant,
    deadline: Instant,
    timeout: Duration,
}

impl GatherSession {
    pub fn new(
        trigger_message: InboundMessage,
        base: GenerationRequest,
        timeout: Duration,
    ) -> Self {
        let now = Instant::now();
        Self {
            key: trigger_message.session_key(),
            state: GatherState::Active,
            base,
            trigger_message,
            fragments: Vec::new(),
            images: Vec::new(),
            created_at: now,
            deadline: now + timeout,
            timeout,
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn state(&self) -> GatherState {
        self.state
    }

    pub fn trigger(&self) -> &str {
        &self.base.trigger
    }

    pub fn trigger_message(&self) -> &InboundMessage {
        &self.trigger_message
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    pub fn images(&self) -> &[ImageRef] {
        &self.images
    }

    pub fn progress(&self) -> GatherProgress {
        let preview = self
            .base
            .clone()
            .with_appended_text(self.fragments.iter().map(String::as_str));
        GatherProgress {
            trigger: self.base.trigger.clone(),
            prompt: preview.prompt,
            image_count: self.images.len(),
            timeout: self.timeout,
        }
    }

    /// Feeds one message from the session's key.
    ///
    /// A terminator moves the session to its terminal state and contributes
    /// nothing; any other message appends its text and images and pushes the
    /// deadline out by the full timeout.
    pub fn accept(
        &mut self,
        msg: &InboundMessage,
        terminators: &Terminators,
    ) -> Result<Step, BananaError> {
        self.ensure_active()?;
        let text = msg.plain_text();
        match terminators.classify(&text) {
            Some(GatherState::TerminatedStart) => {
                self.state = GatherState::TerminatedStart;
                return Ok(Step::Start);
            }
            Some(_) => {
                self.state = GatherState::TerminatedCancel;
                return Ok(Step::Cancel);
            }
            None => {}
        }
        self.append(msg);
        Ok(Step::Appended)
    }

    /// Appends a message as ordinary content, even if it looks like a trigger.
    pub fn extend_with(&mut self, msg: &InboundMessage) -> Result<(), BananaError> {
        self.ensure_active()?;
        self.append(msg);
        Ok(())
    }

    fn append(&mut self, msg: &InboundMessage) {
        let text = msg.plain_text();
        if !text.is_empty() {
            self.fragments.push(text);
        }
        self.images.extend(msg.attached_images());
        self.deadline = Instant::now() + self.timeout;
    }

    /// Marks the session expired. Only an active session can expire.
    pub fn expire(&mut self) -> Result<(), BananaError> {
        self.ensure_active()?;
        self.state = GatherState::Expired;
        Ok(())
    }

    /// Consumes a started session into the request to dispatch.
    pub fn into_collected(self) -> Result<CollectedRequest, BananaError> {
        if self.state != GatherState::TerminatedStart {
            return Err(BananaError::Internal(format!(
                "gather session {} collected in state {}",
                self.key, self.state
            )));
        }
        let request = self
            .base
            .with_appended_text(self.fragments.iter().map(String::as_str));
        Ok(CollectedRequest {
            request,
            trigger_message: self.trigger_message,
            images: self.images,
        })
    }

    fn ensure_active(&self) -> Result<(), BananaError> {
        if self.state == GatherState::Active {
            Ok(())
        } else {
            Err(BananaError::Internal(format!(
                "gather session {} is {}, not active",
                self.key, self.state
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use banana_core::{
        AspectRatio, ImageSize, MessageSegment, ProviderSelection,
    };

    use super::*;

    fn base() -> GenerationRequest {
        GenerationRequest {
            trigger: "bna".into(),
            prompt: "turn into a figurine".into(),
            images: vec![],
            aspect_ratio: AspectRatio::default(),
            image_size: ImageSize::OneK,
            google_search: false,
            providers: ProviderSelection::default(),
            min_images: 1,
            max_images: 6,
            refer_images: vec![],
            gather_mode: true,
        }
    }

    fn session() -> GatherSession {
        GatherSession::new(
            InboundMessage::text("g", "alice", "bna"),
            base(),
            Duration::from_secs(60),
        )
    }

    fn image_msg(url: &str) -> InboundMessage {
        let mut msg = InboundMessage::text("g", "alice", "");
        msg.segments = vec![MessageSegment::Image(ImageRef::Url(url.into()))];
        msg
    }

    #[tokio::test]
    async fn accumulates_until_start() {
        let mut s = session();
        let t = Terminators::default();
        assert_eq!(s.accept(&InboundMessage::text("g", "alice", "add a cat"), &t).unwrap(), Step::Appended);
        assert_eq!(s.accept(&image_msg("http://x/1.png"), &t).unwrap(), Step::Appended);
        assert_eq!(s.accept(&InboundMessage::text("g", "alice", " 开始 "), &t).unwrap(), Step::Start);
        assert_eq!(s.state(), GatherState::TerminatedStart);

        let collected = s.into_collected().unwrap();
        assert_eq!(collected.request.prompt, "turn into a figurine add a cat");
        assert_eq!(collected.images, vec![ImageRef::Url("http://x/1.png".into())]);
    }

    #[tokio::test]
    async fn cancel_discards() {
        let mut s = session();
        let t = Terminators::default();
        s.accept(&InboundMessage::text("g", "alice", "more"), &t).unwrap();
        assert_eq!(s.accept(&InboundMessage::text("g", "alice", "取消"), &t).unwrap(), Step::Cancel);
        assert_eq!(s.state(), GatherState::TerminatedCancel);
        assert!(s.clone().into_collected().is_err());
        assert!(s.accept(&InboundMessage::text("g", "alice", "late"), &t).is_err());
    }

    #[tokio::test]
    async fn terminator_must_be_whole_message() {
        let mut s = session();
        let t = Terminators::default();
        assert_eq!(s.accept(&InboundMessage::text("g", "alice", "开始吧"), &t).unwrap(), Step::Appended);
        assert_eq!(s.fragments(), ["开始吧"]);
    }

    #[tokio::test]
    async fn custom_terminators() {
        let mut s = session();
        let t = Terminators {
            start: vec!["go".into()],
            cancel: vec!["stop".into()],
        };
        assert_eq!(s.accept(&InboundMessage::text("g", "alice", "开始"), &t).unwrap(), Step::Appended);
        assert_eq!(s.accept(&InboundMessage::text("g", "alice", "go"), &t).unwrap(), Step::Start);
    }

    #[tokio::test(start_paused = true)]
    async fn append_pushes_deadline() {
        let mut s = session();
        let first = s.deadline();
        tokio::time::advance(Duration::from_secs(30)).await;
        s.accept(&InboundMessage::text("g", "alice", "x"), &Terminators::default()).unwrap();
        assert_eq!(s.deadline() - first, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn expire_only_from_active() {
        let mut s = session();
        s.expire().unwrap();
        assert_eq!(s.state(), GatherState::Expired);
        assert!(s.expire().is_err());
    }

    #[tokio::test]
    async fn progress_reports_counts() {
        let mut s = session();
        let t = Terminators::default();
        s.accept(&image_msg("http://x/1.png"), &t).unwrap();
        s.accept(&InboundMessage::text("g", "alice", "blue"), &t).unwrap();
        let p = s.progress();
        assert_eq!(p.image_count, 1);
        assert_eq!(p.prompt, "turn into a figurine blue");
        assert_eq!(p.trigger, "bna");
    }
}
