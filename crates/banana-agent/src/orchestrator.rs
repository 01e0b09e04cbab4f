// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The request pipeline from inbound message to delivered image.
//!
//! Per message: wake prefix, admin commands, whitelist (silent drop), then
//! either the sender's active gather session or a preset trigger. A resolved
//! request either opens a gather session or goes straight through assembly,
//! dispatch and delivery.

use std::sync::Arc;
use std::time::Duration;

use banana_config::BananaConfig;
use banana_config::model::PrefixConfig;
use banana_core::{
    BananaError, ChannelAdapter, GenerationRequest, ImageRef, InboundMessage, MessageId,
    OutboundMessage, SessionKey,
};
use banana_gather::{
    BeginOutcome, CollectedRequest, ExpiryEvent, GatherOutcome, GatherProgress, GatherSettings,
    GatherTable,
};
use banana_preset::{GlobalDefaults, ParamValues, ParameterResolver, Preset, PresetStore};
use banana_provider::ProviderDispatcher;
use banana_security::Whitelist;
use futures::FutureExt;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::admin::{AdminCommand, AdminOps};
use crate::assembler::{AssemblySources, ImageReferenceAssembler};
use crate::delivery::{ImageSaver, build_reply};
use crate::queue::KeyedQueue;
use crate::tool::{TOOL_NAME, ToolOutput, ToolRequest};

/// How long shutdown waits for queued messages to finish.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// Not a trigger, command, or gather contribution.
    Ignored,
    /// Dropped by the whitelist or an admin check.
    Denied,
    /// An admin command ran.
    Admin,
    /// A gather session started, grew, was refused, or was cancelled.
    Gathering,
    Generated { provider: String, failures: usize },
    /// The user was told why the request could not be served.
    Failed,
    /// Shutdown interrupted the generation.
    Cancelled,
}

struct Inner {
    channel: Arc<dyn ChannelAdapter>,
    presets: Arc<PresetStore>,
    resolver: ParameterResolver,
    gather: GatherTable,
    expiries: Mutex<Option<mpsc::UnboundedReceiver<ExpiryEvent>>>,
    assembler: ImageReferenceAssembler,
    dispatcher: ProviderDispatcher,
    whitelist: Arc<Whitelist>,
    admin: AdminOps,
    prefix: PrefixConfig,
    progress_notice: String,
    saver: ImageSaver,
    queue: KeyedQueue<SessionKey>,
    cancel: CancellationToken,
}

/// Shared handle to the pipeline.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Builds the pipeline with the HTTP backends from configuration.
    pub fn from_config(
        config: &BananaConfig,
        channel: Arc<dyn ChannelAdapter>,
    ) -> Result<Self, BananaError> {
        let dispatcher = ProviderDispatcher::from_config(config)?;
        Self::new(config, channel, dispatcher)
    }

    /// Builds the pipeline around an existing dispatcher.
    pub fn new(
        config: &BananaConfig,
        channel: Arc<dyn ChannelAdapter>,
        dispatcher: ProviderDispatcher,
    ) -> Result<Self, BananaError> {
        let presets = Arc::new(PresetStore::from_config(config)?);
        let resolver =
            ParameterResolver::new(presets.parser().clone(), GlobalDefaults::from_config(config));
        let (gather, expiries) = GatherTable::new(GatherSettings::from_config(&config.gather));
        let whitelist = Arc::new(Whitelist::from_config(&config.whitelist));
        let admin = AdminOps::new(Arc::clone(&presets), Arc::clone(&whitelist), &config.admin);
        let assembler = ImageReferenceAssembler::new(
            Arc::clone(&channel),
            &config.storage,
            config.preference.clone(),
        );

        Ok(Self {
            inner: Arc::new(Inner {
                channel,
                presets,
                resolver,
                gather,
                expiries: Mutex::new(Some(expiries)),
                assembler,
                dispatcher,
                whitelist,
                admin,
                prefix: config.prefix.clone(),
                progress_notice: config.common.progress_notice.clone(),
                saver: ImageSaver::from_config(&config.storage),
                queue: KeyedQueue::new(),
                cancel: CancellationToken::new(),
            }),
        })
    }

    pub fn admin(&self) -> &AdminOps {
        &self.inner.admin
    }

    pub fn presets(&self) -> &Arc<PresetStore> {
        &self.inner.presets
    }

    pub fn gather(&self) -> &GatherTable {
        &self.inner.gather
    }

    /// Receives messages until the channel closes or `cancel` fires.
    ///
    /// Messages are handed to a per-key queue so one sender's messages are
    /// handled in order while different senders proceed concurrently.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), BananaError> {
        let mut expiries = self
            .inner
            .expiries
            .lock()
            .await
            .take()
            .ok_or_else(|| BananaError::Internal("orchestrator is already running".into()))?;
        info!(channel = %self.inner.channel.name(), "orchestrator running");

        loop {
            tokio::select! {
                msg = self.inner.channel.receive() => {
                    match msg {
                        Ok(Some(inbound)) => self.submit(inbound),
                        Ok(None) => {
                            info!("channel closed, stopping orchestrator");
                            break;
                        }
                        Err(e) => error!(error = %e, "channel receive error"),
                    }
                }
                Some(event) = expiries.recv() => self.submit_expiry(event),
                _ = cancel.cancelled() => {
                    info!("shutdown signal received, stopping orchestrator");
                    break;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Queues a message behind earlier messages from the same sender.
    pub fn submit(&self, inbound: InboundMessage) {
        let key = inbound.session_key();
        let this = self.clone();
        self.inner.queue.push(
            key.clone(),
            async move {
                match this.handle_message(inbound).await {
                    Ok(handled) => debug!(key = %key, ?handled, "message handled"),
                    Err(e) => error!(key = %key, error = %e, "failed to handle inbound message"),
                }
            }
            .boxed(),
        );
    }

    fn submit_expiry(&self, event: ExpiryEvent) {
        let this = self.clone();
        self.inner.queue.push(
            event.key.clone(),
            async move { this.notify_expiry(event).await }.boxed(),
        );
    }

    /// Cancels in-flight generations, drops gather sessions, and drains the queue.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.gather.shutdown().await;
        self.inner.queue.drain(DRAIN_TIMEOUT).await;
        info!("orchestrator stopped");
    }

    /// Runs the whole pipeline for one message.
    ///
    /// User-facing problems become replies; only channel failures are
    /// returned as errors.
    pub async fn handle_message(&self, msg: InboundMessage) -> Result<Handled, BananaError> {
        let addressed = self.strip_wake_prefix(&msg);
        let stripped = addressed.as_ref().map(InboundMessage::plain_text);

        if let Some(command) = stripped.as_deref().and_then(AdminCommand::parse) {
            return self.run_admin(&msg, command).await;
        }

        if let Err(denial) = self.inner.whitelist.check(&msg) {
            debug!(sender = %msg.sender, ?denial, "message dropped by whitelist");
            return Ok(Handled::Denied);
        }

        let key = msg.session_key();
        let preset = stripped.as_deref().and_then(|text| self.match_preset(text));
        // Gather sees the text after the wake prefix.
        let contribution = addressed.as_ref().unwrap_or(&msg);

        if self.inner.gather.is_active(&key).await {
            if let (Some(preset), Some(text)) = (&preset, stripped.as_deref()) {
                match self.inner.resolver.resolve(text, preset) {
                    Ok(request) if request.gather_mode => {
                        return self.begin_gather(contribution, request).await;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(trigger = %preset.trigger, error = %e, "request rejected");
                        self.reply(&msg, e.user_message()).await?;
                        return Ok(Handled::Failed);
                    }
                }
            }
            if let Some(outcome) = self.inner.gather.handle(contribution).await? {
                return self.on_gather_outcome(&msg, outcome).await;
            }
        }

        let (Some(preset), Some(text)) = (preset, stripped.as_deref()) else {
            return Ok(Handled::Ignored);
        };
        let request = match self.inner.resolver.resolve(text, &preset) {
            Ok(request) => request,
            Err(e) => {
                warn!(trigger = %preset.trigger, error = %e, "request rejected");
                self.reply(&msg, e.user_message()).await?;
                return Ok(Handled::Failed);
            }
        };

        if request.gather_mode {
            return self.begin_gather(contribution, request).await;
        }
        self.generate(request, &msg, &[]).await
    }

    /// Serves one LLM tool call made on behalf of `origin`'s sender.
    ///
    /// Generated images go to `origin`'s conversation as a reply; the
    /// returned text is for the model.
    pub async fn handle_tool(
        &self,
        origin: &InboundMessage,
        request: ToolRequest,
    ) -> Result<ToolOutput, BananaError> {
        if let Err(denial) = self.inner.whitelist.check(origin) {
            info!(sender = %origin.sender, ?denial, "tool call refused by whitelist");
            return Ok(ToolOutput::error(
                "Image generation is not available to this user or group.",
            ));
        }

        match request {
            ToolRequest::ListPresets => {
                let triggers = self.inner.presets.triggers();
                if triggers.is_empty() {
                    return Ok(ToolOutput::ok("No presets are available."));
                }
                let names: Vec<String> = triggers.iter().map(|t| format!("- {t}")).collect();
                Ok(ToolOutput::ok(format!(
                    "Available presets:\n{}",
                    names.join("\n")
                )))
            }
            ToolRequest::GetPreset { name } => match self.inner.presets.get(&name) {
                Some(preset) if preset.prompt.trim().is_empty() => {
                    Ok(ToolOutput::ok(banana_preset::USER_TEXT))
                }
                Some(preset) => Ok(ToolOutput::ok(preset.prompt.clone())),
                None => {
                    warn!(preset = %name, "tool asked for unknown preset");
                    Ok(ToolOutput::error(format!(
                        "No preset named 「{name}」. Ask the user for the exact preset name."
                    )))
                }
            },
            ToolRequest::Generate { preset, prompt } => {
                let prompt = prompt.trim();
                if prompt.is_empty() {
                    return Ok(ToolOutput::error("The prompt must not be empty."));
                }
                let base = match preset {
                    Some(name) => match self.inner.presets.get(&name) {
                        Some(found) => Preset {
                            prompt: String::new(),
                            ..(*found).clone()
                        },
                        None => {
                            warn!(preset = %name, "tool asked for unknown preset");
                            return Ok(ToolOutput::error(format!(
                                "No preset named 「{name}」. Use a valid preset name."
                            )));
                        }
                    },
                    // Without a preset, text-only generation is allowed.
                    None => Preset {
                        trigger: TOOL_NAME.to_string(),
                        prompt: String::new(),
                        params: ParamValues {
                            min_images: Some(0),
                            ..ParamValues::default()
                        },
                    },
                };
                // The refined prompt replaces the template verbatim, flags included.
                let mut request = match self.inner.resolver.resolve(&base.trigger, &base) {
                    Ok(request) => request,
                    Err(e) => return Ok(ToolOutput::error(e.user_message())),
                };
                request.prompt = prompt.to_string();
                request.gather_mode = false;
                info!(trigger = %request.trigger, "tool generation requested");

                Ok(match self.generate(request, origin, &[]).await? {
                    Handled::Generated { provider, .. } => ToolOutput::ok(format!(
                        "The image was generated by {provider} and sent to the user."
                    )),
                    Handled::Cancelled => ToolOutput::error("Generation was cancelled."),
                    _ => ToolOutput::error(
                        "Generation failed; the user has been told why.",
                    ),
                })
            }
        }
    }

    /// The message with a configured wake prefix removed, or `None` when it
    /// does not address the bot.
    fn strip_wake_prefix(&self, msg: &InboundMessage) -> Option<InboundMessage> {
        let prefixes = &self.inner.prefix.prefixes;
        if prefixes.is_empty() {
            return Some(msg.clone());
        }
        if let Some(stripped) = prefixes
            .iter()
            .filter(|p| !p.is_empty())
            .find_map(|prefix| msg.strip_text_prefix(prefix))
        {
            return Some(stripped);
        }
        (msg.addressed_to_bot || self.inner.prefix.coexist).then(|| msg.clone())
    }

    /// Exact, case-sensitive match on the first token.
    fn match_preset(&self, text: &str) -> Option<Arc<Preset>> {
        let first = text.split_whitespace().next()?;
        self.inner.presets.get(first)
    }

    async fn run_admin(
        &self,
        msg: &InboundMessage,
        command: AdminCommand,
    ) -> Result<Handled, BananaError> {
        if command.requires_admin() && !self.inner.admin.is_admin(&msg.sender) {
            info!(sender = %msg.sender, ?command, "admin command from non-admin ignored");
            return Ok(Handled::Denied);
        }
        let reply = match self.inner.admin.execute(&msg.sender, command) {
            Ok(reply) => reply,
            Err(e) => format!("❌ {e}"),
        };
        self.reply(msg, reply).await?;
        Ok(Handled::Admin)
    }

    async fn begin_gather(
        &self,
        msg: &InboundMessage,
        request: GenerationRequest,
    ) -> Result<Handled, BananaError> {
        let text = match self.inner.gather.begin(msg, request).await? {
            BeginOutcome::Started(progress) => self.gather_notice("📝 Gather mode is on", &progress),
            BeginOutcome::Extended(progress) => self.gather_notice("📝 Added to the current collection", &progress),
            BeginOutcome::Replaced {
                previous_trigger,
                progress,
            } => self.gather_notice(
                &format!("♻️ Discarded 「{previous_trigger}」 and started over"),
                &progress,
            ),
            BeginOutcome::Rejected { active_trigger } => {
                let (start, cancel) = self.terminator_words();
                format!(
                    "⚠️ Still collecting for 「{active_trigger}」. Send 「{start}」 to generate or 「{cancel}」 to cancel first."
                )
            }
        };
        self.reply(msg, text).await?;
        Ok(Handled::Gathering)
    }

    async fn on_gather_outcome(
        &self,
        msg: &InboundMessage,
        outcome: GatherOutcome,
    ) -> Result<Handled, BananaError> {
        match outcome {
            GatherOutcome::Appended(progress) => {
                self.reply(msg, self.gather_notice("📝 Collected so far", &progress))
                    .await?;
                Ok(Handled::Gathering)
            }
            GatherOutcome::Cancelled { trigger } => {
                self.reply(msg, format!("✅ Cancelled 「{trigger}」"))
                    .await?;
                Ok(Handled::Gathering)
            }
            GatherOutcome::Start(collected) => {
                let CollectedRequest {
                    request,
                    trigger_message,
                    images,
                } = *collected;
                self.generate(request, &trigger_message, &images).await
            }
        }
    }

    /// Assembles images, dispatches, and delivers. Replies go to `trigger`.
    async fn generate(
        &self,
        request: GenerationRequest,
        trigger: &InboundMessage,
        gathered: &[ImageRef],
    ) -> Result<Handled, BananaError> {
        let capabilities = self.inner.channel.capabilities();
        let sources = AssemblySources {
            message: trigger,
            gathered,
        };
        let images = match self
            .inner
            .assembler
            .assemble(&request, sources, &capabilities)
            .await
        {
            Ok(images) => images,
            Err(e) => {
                warn!(trigger = %request.trigger, error = %e, "image assembly failed");
                self.reply(trigger, e.user_message()).await?;
                return Ok(Handled::Failed);
            }
        };
        let request = request.with_images(images);

        if !self.inner.progress_notice.is_empty() {
            self.reply(trigger, self.inner.progress_notice.clone())
                .await?;
        }
        info!(
            trigger = %request.trigger,
            images = request.images.len(),
            providers = ?request.providers.names,
            "dispatching generation"
        );

        let dispatched = tokio::select! {
            result = self.inner.dispatcher.dispatch(&request, capabilities.incremental_delivery) => result,
            _ = self.inner.cancel.cancelled() => {
                info!(trigger = %request.trigger, "generation cancelled by shutdown");
                return Ok(Handled::Cancelled);
            }
        };

        match dispatched {
            Ok(outcome) => {
                if let Err(e) = self.inner.saver.save(&outcome.image.images).await {
                    warn!(error = %e, "failed to save generated images");
                }
                let reply = build_reply(&trigger.conversation, &trigger.id, &outcome.image, &capabilities);
                self.inner.channel.send(reply).await?;
                info!(
                    trigger = %request.trigger,
                    provider = %outcome.image.provider,
                    images = outcome.image.images.len(),
                    "generation delivered"
                );
                Ok(Handled::Generated {
                    provider: outcome.image.provider,
                    failures: outcome.failures.len(),
                })
            }
            Err(e) => {
                error!(
                    trigger = %request.trigger,
                    error = %banana_security::redact(&e.to_string(), &[]),
                    "generation failed"
                );
                self.reply(trigger, e.user_message()).await?;
                Ok(Handled::Failed)
            }
        }
    }

    async fn notify_expiry(&self, event: ExpiryEvent) {
        let text = format!("❌ Timed out, 「{}」 was cancelled.", event.trigger);
        let msg = OutboundMessage::text(event.conversation, Some(event.reply_to), text);
        if let Err(e) = self.inner.channel.send(msg).await {
            warn!(key = %event.key, error = %e, "failed to send expiry notice");
        }
    }

    fn terminator_words(&self) -> (&str, &str) {
        let terminators = &self.inner.gather.settings().terminators;
        (
            terminators.start.first().map_or("开始", String::as_str),
            terminators.cancel.first().map_or("取消", String::as_str),
        )
    }

    fn gather_notice(&self, title: &str, progress: &GatherProgress) -> String {
        let (start, cancel) = self.terminator_words();
        format!(
            "{title}\nText: {}\nImages: {}\n\n💡 Keep sending text or images, or:\n• send 「{start}」 to generate\n• send 「{cancel}」 to cancel\n• expires after {}s without a message",
            progress.prompt,
            progress.image_count,
            progress.timeout.as_secs(),
        )
    }

    async fn reply(&self, msg: &InboundMessage, text: String) -> Result<MessageId, BananaError> {
        self.inner
            .channel
            .send(OutboundMessage::text(
                msg.conversation.clone(),
                Some(msg.id.clone()),
                text,
            ))
            .await
    }
}
