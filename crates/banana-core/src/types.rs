// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the resolver, gather sessions, dispatcher, and orchestrator.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::BananaError;

/// File extensions accepted as images when a message carries a file attachment.
pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".webp", ".bmp", ".gif", ".heic", ".heif",
];

/// Identifier of a conversation (group chat or direct message thread).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

/// Identifier of a chat participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantId(pub String);

/// Unique identifier for a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key for per-participant conversational state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub conversation: ConversationId,
    pub participant: ParticipantId,
}

impl SessionKey {
    pub fn new(conversation: impl Into<String>, participant: impl Into<String>) -> Self {
        Self {
            conversation: ConversationId(conversation.into()),
            participant: ParticipantId(participant.into()),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.conversation, self.participant)
    }
}

/// Raw image bytes with their MIME type.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageData {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl ImageData {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Builds an image from bytes, sniffing the MIME type from the header.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let mime_type = sniff_mime(&data).unwrap_or("image/png").to_string();
        Self { mime_type, data }
    }

    /// Decodes a base64 payload as returned by the provider APIs.
    pub fn from_base64(mime_type: impl Into<String>, b64: &str) -> Result<Self, BananaError> {
        let data = BASE64
            .decode(b64.trim())
            .map_err(|e| BananaError::Provider {
                message: format!("invalid base64 image data: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self::new(mime_type, data))
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.data)
    }

    /// `data:` URL form used by OpenAI-style chat payloads.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// File extension (with leading dot) for the MIME type.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/png" => ".png",
            "image/jpeg" | "image/jpg" => ".jpg",
            "image/webp" => ".webp",
            "image/gif" => ".gif",
            "image/bmp" => ".bmp",
            "image/heic" => ".heic",
            "image/heif" => ".heif",
            _ => ".jpg",
        }
    }
}

// Image payloads can be megabytes; keep Debug output short.
impl fmt::Debug for ImageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageData")
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Detects common image formats from their magic bytes.
pub fn sniff_mime(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("image/png")
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        Some("image/webp")
    } else if data.starts_with(b"BM") {
        Some("image/bmp")
    } else {
        None
    }
}

/// Guesses a MIME type from a file name.
pub fn mime_from_filename(name: &str) -> Option<&'static str> {
    let lower = name.to_ascii_lowercase();
    let ext = lower.rsplit_once('.').map(|(_, ext)| ext)?;
    match ext {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}

/// An image reference carried by a message: either already-downloaded bytes or a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    Inline(ImageData),
    Url(String),
}

/// A quoted (replied-to) message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotedMessage {
    pub sender: ParticipantId,
    pub segments: Vec<MessageSegment>,
}

/// One component of an inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageSegment {
    Text(String),
    Image(ImageRef),
    File { name: String, url: String },
    Mention(ParticipantId),
    Quote(QuotedMessage),
}

impl MessageSegment {
    /// Image carried by this segment, when it is an image or an image-typed remote file.
    fn as_image(&self) -> Option<ImageRef> {
        match self {
            MessageSegment::Image(image) => Some(image.clone()),
            MessageSegment::File { name, url } if is_image_file(name, url) => {
                Some(ImageRef::Url(url.clone()))
            }
            _ => None,
        }
    }
}

fn is_image_file(name: &str, url: &str) -> bool {
    let has_ext = |s: &str| {
        let lower = s.to_ascii_lowercase();
        SUPPORTED_IMAGE_EXTENSIONS
            .iter()
            .any(|ext| lower.ends_with(ext))
    };
    url.starts_with("http") && (has_ext(url) || has_ext(name))
}

/// An inbound message received from the chat platform.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: MessageId,
    pub conversation: ConversationId,
    /// Group identifier for group chats; `None` for direct messages.
    pub group: Option<String>,
    pub sender: ParticipantId,
    /// The bot's own identity on the platform, when known.
    pub self_id: Option<ParticipantId>,
    /// Whether the platform woke the bot explicitly (mention or wake word).
    pub addressed_to_bot: bool,
    pub segments: Vec<MessageSegment>,
    pub timestamp: DateTime<Utc>,
}

impl InboundMessage {
    /// Builds a plain text message; used by local channels and tests.
    pub fn text(
        conversation: impl Into<String>,
        sender: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId(format!("msg-{}", Utc::now().timestamp_nanos_opt().unwrap_or(0))),
            conversation: ConversationId(conversation.into()),
            group: None,
            sender: ParticipantId(sender.into()),
            self_id: None,
            addressed_to_bot: false,
            segments: vec![MessageSegment::Text(text.into())],
            timestamp: Utc::now(),
        }
    }

    pub fn with_segment(mut self, segment: MessageSegment) -> Self {
        self.segments.push(segment);
        self
    }

    pub fn session_key(&self) -> SessionKey {
        SessionKey {
            conversation: self.conversation.clone(),
            participant: self.sender.clone(),
        }
    }

    /// Text segments joined with single spaces and trimmed.
    pub fn plain_text(&self) -> String {
        self.segments
            .iter()
            .filter_map(|s| match s {
                MessageSegment::Text(t) if !t.trim().is_empty() => Some(t.trim()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Copy of the message with `prefix` removed from the start of its text.
    ///
    /// Returns `None` when the text does not start with `prefix`.
    pub fn strip_text_prefix(&self, prefix: &str) -> Option<Self> {
        let index = self.segments.iter().position(|s| match s {
            MessageSegment::Text(t) => !t.trim().is_empty(),
            _ => false,
        })?;
        let MessageSegment::Text(text) = &self.segments[index] else {
            return None;
        };
        let rest = text.trim_start().strip_prefix(prefix)?.trim_start().to_string();
        let mut stripped = self.clone();
        stripped.segments[index] = MessageSegment::Text(rest);
        Some(stripped)
    }

    /// Images carried by the message in segment order; quoted images appear
    /// where the quote sits.
    pub fn attached_images(&self) -> Vec<ImageRef> {
        let mut images = Vec::new();
        for segment in &self.segments {
            match segment {
                MessageSegment::Quote(quote) => {
                    images.extend(quote.segments.iter().filter_map(MessageSegment::as_image));
                }
                other => images.extend(other.as_image()),
            }
        }
        images
    }

    /// Mentioned participants in order, repeats included.
    pub fn mentions(&self) -> Vec<ParticipantId> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                MessageSegment::Mention(p) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    /// Sender of the quoted message, if the message replies to one.
    pub fn quoted_sender(&self) -> Option<&ParticipantId> {
        self.segments.iter().find_map(|s| match s {
            MessageSegment::Quote(q) => Some(&q.sender),
            _ => None,
        })
    }
}

/// One attachment of an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    /// Inline image.
    Image(ImageData),
    /// Image sent as a file, for destinations that cap inline attachment size.
    File { name: String, image: ImageData },
}

/// An outbound message to be sent via the channel adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub conversation: ConversationId,
    pub reply_to: Option<MessageId>,
    pub text: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl OutboundMessage {
    pub fn text(conversation: ConversationId, reply_to: Option<MessageId>, text: String) -> Self {
        Self {
            conversation,
            reply_to,
            text: Some(text),
            attachments: Vec::new(),
        }
    }
}

/// Capabilities reported by a channel adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelCapabilities {
    /// The platform can resolve an avatar for each mentioned participant.
    pub mention_avatars: bool,
    /// The platform can resolve the sender's avatar.
    pub sender_avatar: bool,
    /// The outgoing channel accepts incremental delivery.
    pub incremental_delivery: bool,
    /// Largest inline attachment the destination accepts.
    pub max_attachment_bytes: Option<usize>,
}

/// API shape spoken by a provider.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum ApiFlavor {
    #[serde(rename = "openai", alias = "OpenAI_Chat")]
    #[strum(serialize = "openai")]
    OpenAi,
    #[serde(rename = "gemini", alias = "Gemini")]
    #[strum(serialize = "gemini")]
    Gemini,
}

/// Output resolution tier.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum ImageSize {
    #[default]
    #[serde(rename = "1K")]
    #[strum(to_string = "1K", serialize = "1k")]
    OneK,
    #[serde(rename = "2K")]
    #[strum(to_string = "2K", serialize = "2k")]
    TwoK,
    #[serde(rename = "4K")]
    #[strum(to_string = "4K", serialize = "4k")]
    FourK,
}

/// Aspect ratio: `default` or `W:H` with positive integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AspectRatio(String);

impl AspectRatio {
    pub const DEFAULT: &'static str = "default";

    pub fn is_default(&self) -> bool {
        self.0 == Self::DEFAULT
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case(Self::DEFAULT) {
            return Ok(Self::default());
        }
        let valid = s.split_once(':').is_some_and(|(w, h)| {
            matches!((w.parse::<u32>(), h.parse::<u32>()), (Ok(w), Ok(h)) if w > 0 && h > 0)
        });
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(format!("`{s}` is not `default` or W:H"))
        }
    }
}

impl TryFrom<String> for AspectRatio {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AspectRatio> for String {
    fn from(value: AspectRatio) -> Self {
        value.0
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a request's provider list came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SelectionOrigin {
    /// `--providers` on the triggering message.
    Invocation,
    /// The preset's declared provider list.
    Preset,
    /// Configured enabled providers in declaration order.
    #[default]
    Default,
}

/// Ordered provider names; the first entry is the primary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProviderSelection {
    pub names: Vec<String>,
    pub origin: SelectionOrigin,
}

/// Fully resolved parameters for one generation.
///
/// Built once per invocation; later stages derive new values with the
/// `with_*` methods instead of mutating a shared one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    /// Trigger word of the originating preset.
    pub trigger: String,
    pub prompt: String,
    #[serde(skip)]
    pub images: Vec<ImageData>,
    pub aspect_ratio: AspectRatio,
    pub image_size: ImageSize,
    pub google_search: bool,
    pub providers: ProviderSelection,
    pub min_images: usize,
    pub max_images: usize,
    /// Reference image file names, resolved against the reference directory.
    pub refer_images: Vec<String>,
    pub gather_mode: bool,
}

impl GenerationRequest {
    pub fn with_images(self, images: Vec<ImageData>) -> Self {
        Self { images, ..self }
    }

    /// Appends free text to the prompt, separated by a space.
    pub fn with_appended_text<'a>(self, fragments: impl IntoIterator<Item = &'a str>) -> Self {
        let mut prompt = self.prompt.clone();
        for fragment in fragments {
            let fragment = fragment.trim();
            if fragment.is_empty() {
                continue;
            }
            if !prompt.is_empty() {
                prompt.push(' ');
            }
            prompt.push_str(fragment);
        }
        Self { prompt, ..self }
    }

    /// Checks `min_images <= len(images) <= max_images`.
    pub fn check_image_bounds(&self) -> Result<(), BananaError> {
        let count = self.images.len();
        if count < self.min_images {
            return Err(BananaError::InsufficientImages {
                required: self.min_images,
                available: count,
                exhausted: Vec::new(),
            });
        }
        if count > self.max_images {
            return Err(BananaError::Validation {
                flag: "max_images".to_string(),
                value: self.max_images.to_string(),
                expected: format!("at least {count} for the assembled images"),
            });
        }
        Ok(())
    }
}

/// Images produced by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub provider: String,
    pub images: Vec<ImageData>,
    /// Text the model returned alongside the image, if text responses are enabled.
    pub text: Option<String>,
}
