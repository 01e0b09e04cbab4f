// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `banana shell` command implementation.
//!
//! Runs the full orchestrator against a terminal channel. Each input line
//! is one chat message from the local user. Tokens of the form
//! `img:<path>` attach a local image and `@name` mentions a participant.

use std::sync::Arc;

use async_trait::async_trait;
use banana_agent::{Orchestrator, install_signal_handler};
use banana_config::BananaConfig;
use banana_core::{
    Attachment, BananaError, ChannelAdapter, ChannelCapabilities, ConversationId, ImageData,
    ImageRef, InboundMessage, MessageId, MessageSegment, OutboundMessage, ParticipantId,
};
use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};

const CONVERSATION: &str = "console";
const IMAGE_TOKEN: &str = "img:";
const LOCAL_SCHEME: &str = "file://";

/// Runs the interactive shell until EOF, `/quit`, or a shutdown signal.
pub async fn run_shell(config: &BananaConfig, user: String) -> Result<(), BananaError> {
    let lines = spawn_reader()?;
    let channel = Arc::new(ConsoleChannel::new(user, lines));
    let orchestrator = Orchestrator::from_config(config, channel)?;

    println!("{}", "banana shell".bold().green());
    println!(
        "Attach images with {}, mention with {}, type {} to exit.\n",
        "img:<path>".yellow(),
        "@name".yellow(),
        "/quit".yellow()
    );

    let cancel = install_signal_handler();
    orchestrator.run(cancel).await
}

/// Reads lines on a dedicated thread; the receiver closes when input ends.
fn spawn_reader() -> Result<mpsc::UnboundedReceiver<String>, BananaError> {
    let mut rl = DefaultEditor::new()
        .map_err(|e| BananaError::Internal(format!("failed to initialize readline: {e}")))?;
    let (tx, rx) = mpsc::unbounded_channel();
    let prompt = format!("{}> ", "you".green());

    std::thread::spawn(move || {
        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed == "/quit" || trimmed == "/exit" {
                        break;
                    }
                    if trimmed.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(&line);
                    if tx.send(trimmed.to_string()).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
                Err(e) => {
                    eprintln!("{}: {e}", "error".red());
                    break;
                }
            }
        }
        debug!("console reader finished");
    });

    Ok(rx)
}

/// Terminal-backed [`ChannelAdapter`].
pub struct ConsoleChannel {
    user: String,
    lines: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl ConsoleChannel {
    pub fn new(user: String, lines: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            user,
            lines: Mutex::new(lines),
        }
    }
}

#[async_trait]
impl ChannelAdapter for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities::default()
    }

    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, BananaError> {
        if let Some(text) = &msg.text {
            println!("{} {text}", "banana>".yellow().bold());
        }
        for attachment in &msg.attachments {
            let line = match attachment {
                Attachment::Image(image) => {
                    format!("[image] {} ({} bytes)", image.mime_type, image.len())
                }
                Attachment::File { name, image } => format!("[file] {name} ({} bytes)", image.len()),
            };
            println!("        {}", line.cyan());
        }
        Ok(MessageId(uuid::Uuid::new_v4().to_string()))
    }

    async fn receive(&self) -> Result<Option<InboundMessage>, BananaError> {
        let line = self.lines.lock().await.recv().await;
        Ok(line.map(|line| parse_input(&self.user, &line)))
    }

    async fn resolve_avatar(
        &self,
        _conversation: &ConversationId,
        participant: &ParticipantId,
    ) -> Result<ImageData, BananaError> {
        Err(BananaError::Channel {
            message: format!("console has no avatar for {participant}"),
            source: None,
        })
    }

    async fn fetch_image(&self, url: &str) -> Result<ImageData, BananaError> {
        let path = url.strip_prefix(LOCAL_SCHEME).ok_or_else(|| BananaError::Channel {
            message: format!("console only reads local files, got {url}"),
            source: None,
        })?;
        let data = tokio::fs::read(path).await.map_err(|e| BananaError::Channel {
            message: format!("failed to read {path}"),
            source: Some(Box::new(e)),
        })?;
        info!(path, bytes = data.len(), "attached local image");
        Ok(ImageData::from_bytes(data))
    }
}

/// Splits one console line into text, image, and mention segments.
pub fn parse_input(user: &str, line: &str) -> InboundMessage {
    let mut text = Vec::new();
    let mut extra = Vec::new();
    for token in line.split_whitespace() {
        if let Some(path) = token.strip_prefix(IMAGE_TOKEN).filter(|p| !p.is_empty()) {
            extra.push(MessageSegment::Image(ImageRef::Url(format!(
                "{LOCAL_SCHEME}{path}"
            ))));
        } else if let Some(name) = token.strip_prefix('@').filter(|n| !n.is_empty()) {
            extra.push(MessageSegment::Mention(ParticipantId(name.to_string())));
        } else {
            text.push(token);
        }
    }

    let mut msg = InboundMessage::text(CONVERSATION, user, text.join(" "));
    msg.addressed_to_bot = true;
    msg.segments.extend(extra);
    msg
}
