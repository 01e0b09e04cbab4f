// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyed table of gather sessions with cancellable expiry timers.
//!
//! Each key owns a slot behind an async mutex, so all mutations for one
//! `(conversation, participant)` are serialized while different keys proceed
//! in parallel. Every mutation bumps the slot generation and re-arms the
//! timer; a timer only expires the session if the generation it was armed
//! with is still current.

use std::sync::Arc;
use std::time::Duration;

use banana_config::GatherConflictPolicy;
use banana_config::model::GatherConfig;
use banana_core::{
    BananaError, ConversationId, GenerationRequest, InboundMessage, MessageId, SessionKey,
};
use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::session::{CollectedRequest, GatherProgress, GatherSession, Step, Terminators};

/// Runtime settings for the table.
#[derive(Debug, Clone)]
pub struct GatherSettings {
    pub timeout: Duration,
    pub terminators: Terminators,
    pub conflict: GatherConflictPolicy,
}

impl GatherSettings {
    pub fn from_config(config: &GatherConfig) -> Self {
        Self {
            timeout: config.timeout(),
            terminators: Terminators {
                start: config.start_words.clone(),
                cancel: config.cancel_words.clone(),
            },
            conflict: config.conflict,
        }
    }
}

impl Default for GatherSettings {
    fn default() -> Self {
        Self::from_config(&GatherConfig::default())
    }
}

/// Emitted when a session expires without a start or cancel word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryEvent {
    pub key: SessionKey,
    pub trigger: String,
    pub conversation: ConversationId,
    /// The message that opened the session.
    pub reply_to: MessageId,
}

/// Result of a gather-enabled trigger.
#[derive(Debug, Clone)]
pub enum BeginOutcome {
    Started(GatherProgress),
    /// A session was already active and the trigger was refused.
    Rejected { active_trigger: String },
    /// The trigger message was appended to the active session as text.
    Extended(GatherProgress),
    /// The previous session was discarded and a new one started.
    Replaced {
        previous_trigger: String,
        progress: GatherProgress,
    },
}

/// Result of routing a message to an active session.
#[derive(Debug, Clone)]
pub enum GatherOutcome {
    Appended(GatherProgress),
    Start(Box<CollectedRequest>),
    Cancelled { trigger: String },
}

#[derive(Default)]
struct Slot {
    session: Option<GatherSession>,
    generation: u64,
    timer: Option<CancellationToken>,
}

impl Slot {
    fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

struct Inner {
    slots: DashMap<SessionKey, Arc<Mutex<Slot>>>,
    settings: GatherSettings,
    events: mpsc::UnboundedSender<ExpiryEvent>,
    shutdown: CancellationToken,
}

/// Shared handle to the session table.
#[derive(Clone)]
pub struct GatherTable {
    inner: Arc<Inner>,
}

impl GatherTable {
    /// Creates the table and the receiver for expiry events.
    pub fn new(settings: GatherSettings) -> (Self, mpsc::UnboundedReceiver<ExpiryEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let table = Self {
            inner: Arc::new(Inner {
                slots: DashMap::new(),
                settings,
                events: tx,
                shutdown: CancellationToken::new(),
            }),
        };
        (table, rx)
    }

    pub fn settings(&self) -> &GatherSettings {
        &self.inner.settings
    }

    fn slot(&self, key: &SessionKey) -> Arc<Mutex<Slot>> {
        self.inner
            .slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Slot::default())))
            .clone()
    }

    /// Drops the slot when nobody else holds it and it carries no session.
    fn release(&self, key: &SessionKey) {
        self.inner.slots.remove_if(key, |_, slot| {
            Arc::strong_count(slot) == 1
                && slot.try_lock().map(|s| s.session.is_none()).unwrap_or(false)
        });
    }

    /// Whether `key` has an active session.
    pub async fn is_active(&self, key: &SessionKey) -> bool {
        let Some(slot) = self.inner.slots.get(key).map(|s| s.clone()) else {
            return false;
        };
        let guard = slot.lock().await;
        guard.session.is_some()
    }

    /// Number of active sessions.
    pub async fn active_count(&self) -> usize {
        let slots: Vec<_> = self.inner.slots.iter().map(|e| e.value().clone()).collect();
        let mut count = 0;
        for slot in slots {
            if slot.lock().await.session.is_some() {
                count += 1;
            }
        }
        count
    }

    /// Opens a session for a gather-enabled trigger, applying the conflict
    /// policy when one is already active.
    pub async fn begin(
        &self,
        msg: &InboundMessage,
        request: GenerationRequest,
    ) -> Result<BeginOutcome, BananaError> {
        let key = msg.session_key();
        let slot = self.slot(&key);
        let mut guard = slot.lock().await;

        let outcome = match guard.session.as_mut() {
            None => {
                let session = GatherSession::new(msg.clone(), request, self.inner.settings.timeout);
                let progress = session.progress();
                guard.session = Some(session);
                info!(key = %key, trigger = %progress.trigger, "gather session started");
                BeginOutcome::Started(progress)
            }
            Some(active) => match self.inner.settings.conflict {
                GatherConflictPolicy::Reject => {
                    debug!(key = %key, trigger = %request.trigger, "gather trigger rejected, session active");
                    return Ok(BeginOutcome::Rejected {
                        active_trigger: active.trigger().to_string(),
                    });
                }
                GatherConflictPolicy::Extend => {
                    active.extend_with(msg)?;
                    BeginOutcome::Extended(active.progress())
                }
                GatherConflictPolicy::Replace => {
                    let previous_trigger = active.trigger().to_string();
                    let session =
                        GatherSession::new(msg.clone(), request, self.inner.settings.timeout);
                    let progress = session.progress();
                    guard.session = Some(session);
                    info!(key = %key, previous = %previous_trigger, trigger = %progress.trigger, "gather session replaced");
                    BeginOutcome::Replaced {
                        previous_trigger,
                        progress,
                    }
                }
            },
        };

        self.arm(&key, &slot, &mut guard);
        Ok(outcome)
    }

    /// Routes a message to the key's active session.
    ///
    /// Returns `Ok(None)` when no session is active for the sender.
    pub async fn handle(&self, msg: &InboundMessage) -> Result<Option<GatherOutcome>, BananaError> {
        let key = msg.session_key();
        let Some(slot) = self.inner.slots.get(&key).map(|s| s.clone()) else {
            return Ok(None);
        };
        let mut guard = slot.lock().await;
        let Some(session) = guard.session.as_mut() else {
            drop(guard);
            drop(slot);
            self.release(&key);
            return Ok(None);
        };

        let outcome = match session.accept(msg, &self.inner.settings.terminators)? {
            Step::Appended => {
                let progress = session.progress();
                debug!(key = %key, images = progress.image_count, "gather fragment appended");
                self.arm(&key, &slot, &mut guard);
                GatherOutcome::Appended(progress)
            }
            Step::Start => {
                guard.disarm();
                let session = guard.session.take().ok_or_else(|| {
                    BananaError::Internal(format!("gather session {key} vanished"))
                })?;
                let collected = session.into_collected()?;
                info!(
                    key = %key,
                    trigger = %collected.request.trigger,
                    images = collected.images.len(),
                    "gather session started generation"
                );
                GatherOutcome::Start(Box::new(collected))
            }
            Step::Cancel => {
                let trigger = session.trigger().to_string();
                guard.disarm();
                guard.session = None;
                info!(key = %key, trigger = %trigger, "gather session cancelled");
                GatherOutcome::Cancelled { trigger }
            }
        };

        if !matches!(outcome, GatherOutcome::Appended(_)) {
            drop(guard);
            drop(slot);
            self.release(&key);
        }
        Ok(Some(outcome))
    }

    /// Re-arms the expiry timer for the slot's current session.
    fn arm(&self, key: &SessionKey, slot: &Arc<Mutex<Slot>>, guard: &mut Slot) {
        guard.disarm();
        guard.generation += 1;
        let Some(session) = guard.session.as_ref() else {
            return;
        };
        let generation = guard.generation;
        let deadline = session.deadline();
        let token = self.inner.shutdown.child_token();
        guard.timer = Some(token.clone());

        let table = self.clone();
        let slot = Arc::clone(slot);
        let key = key.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    table.expire(&key, slot, generation).await;
                }
            }
        });
    }

    /// Takes the timer's own handle to the slot so the slot can be released.
    async fn expire(&self, key: &SessionKey, slot: Arc<Mutex<Slot>>, generation: u64) {
        let mut guard = slot.lock().await;
        if guard.generation != generation {
            debug!(key = %key, "stale gather timer ignored");
            return;
        }
        let Some(mut session) = guard.session.take() else {
            return;
        };
        guard.timer = None;
        drop(guard);
        drop(slot);
        self.release(key);

        if let Err(e) = session.expire() {
            warn!(key = %key, error = %e, "gather session could not expire");
            return;
        }
        info!(key = %key, trigger = %session.trigger(), "gather session expired");
        let event = ExpiryEvent {
            key: key.clone(),
            trigger: session.trigger().to_string(),
            conversation: session.trigger_message().conversation.clone(),
            reply_to: session.trigger_message().id.clone(),
        };
        if self.inner.events.send(event).is_err() {
            debug!(key = %key, "expiry receiver dropped");
        }
    }

    /// Discards every session and stops all timers.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let slots: Vec<_> = self.inner.slots.iter().map(|e| e.value().clone()).collect();
        let mut discarded = 0usize;
        for slot in slots {
            let mut guard = slot.lock().await;
            guard.timer = None;
            if guard.session.take().is_some() {
                discarded += 1;
            }
        }
        self.inner.slots.clear();
        info!(discarded, "gather table shut down");
    }
}
