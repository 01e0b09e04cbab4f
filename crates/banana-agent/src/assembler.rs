// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reference image assembly.
//!
//! Sources are consulted in priority order:
//!
//! 1. images attached to the trigger message (quoted images and image files
//!    included), then images collected by a gather session;
//! 2. the request's reference images, read from the reference directory;
//! 3. one avatar per mention, only while below `min_images`;
//! 4. the sender's avatar, only while still below `min_images`.
//!
//! The result never exceeds `max_images`; surplus is cut from the end so the
//! higher-priority sources survive.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use banana_config::model::{PreferenceConfig, StorageConfig};
use banana_core::types::{mime_from_filename, sniff_mime};
use banana_core::{
    BananaError, ChannelAdapter, ChannelCapabilities, GenerationRequest, ImageData, ImageRef,
    ImageSourceKind, InboundMessage, ParticipantId,
};
use tracing::{debug, warn};

/// Where the images for one request come from.
#[derive(Debug, Clone, Copy)]
pub struct AssemblySources<'a> {
    /// The message that carried the trigger.
    pub message: &'a InboundMessage,
    /// Images contributed during gather mode, in arrival order.
    pub gathered: &'a [ImageRef],
}

impl<'a> AssemblySources<'a> {
    pub fn direct(message: &'a InboundMessage) -> Self {
        Self {
            message,
            gathered: &[],
        }
    }
}

/// Collects reference images for a request.
pub struct ImageReferenceAssembler {
    channel: Arc<dyn ChannelAdapter>,
    refer_dir: PathBuf,
    preference: PreferenceConfig,
}

struct Collected {
    images: Vec<ImageData>,
    max: usize,
    exhausted: Vec<ImageSourceKind>,
}

impl Collected {
    fn full(&self) -> bool {
        self.images.len() >= self.max
    }

    fn push(&mut self, image: ImageData) {
        if !self.full() {
            self.images.push(image);
        }
    }

    fn tried(&mut self, kind: ImageSourceKind) {
        if !self.exhausted.contains(&kind) {
            self.exhausted.push(kind);
        }
    }
}

impl ImageReferenceAssembler {
    pub fn new(
        channel: Arc<dyn ChannelAdapter>,
        storage: &StorageConfig,
        preference: PreferenceConfig,
    ) -> Self {
        Self {
            channel,
            refer_dir: storage.refer_images_path(),
            preference,
        }
    }

    /// Builds the ordered image list for `request`.
    ///
    /// Fails with `InsufficientImages` when every source has been tried and
    /// the count is still below `min_images`.
    pub async fn assemble(
        &self,
        request: &GenerationRequest,
        sources: AssemblySources<'_>,
        capabilities: &ChannelCapabilities,
    ) -> Result<Vec<ImageData>, BananaError> {
        let mut out = Collected {
            images: Vec::new(),
            max: request.max_images,
            exhausted: Vec::new(),
        };
        let min = request.min_images;

        out.tried(ImageSourceKind::Attached);
        let attached = sources
            .message
            .attached_images()
            .into_iter()
            .chain(sources.gathered.iter().cloned());
        self.collect_attached(attached, &mut out).await;

        out.tried(ImageSourceKind::Reference);
        self.collect_references(&request.refer_images, &mut out).await;

        if out.images.len() < min && capabilities.mention_avatars {
            out.tried(ImageSourceKind::MentionAvatar);
            let mentioned = self.mentioned(sources.message);
            self.collect_avatars(sources.message, &mentioned, &mut out)
                .await;
        }

        if out.images.len() < min && capabilities.sender_avatar {
            out.tried(ImageSourceKind::SenderAvatar);
            let sender = [sources.message.sender.clone()];
            self.collect_avatars(sources.message, &sender, &mut out)
                .await;
        }

        if out.images.len() < min {
            return Err(BananaError::InsufficientImages {
                required: min,
                available: out.images.len(),
                exhausted: out.exhausted,
            });
        }
        debug!(
            trigger = %request.trigger,
            count = out.images.len(),
            "reference images assembled"
        );
        Ok(out.images)
    }

    async fn collect_attached(
        &self,
        refs: impl Iterator<Item = ImageRef>,
        out: &mut Collected,
    ) {
        let mut seen = HashSet::new();
        for image in refs {
            if out.full() {
                break;
            }
            match image {
                ImageRef::Inline(data) => out.push(data),
                ImageRef::Url(url) => {
                    if !seen.insert(url.clone()) {
                        continue;
                    }
                    match self.channel.fetch_image(&url).await {
                        Ok(data) if !data.is_empty() => out.push(data),
                        Ok(_) => warn!(url = %url, "downloaded image is empty, skipping"),
                        Err(e) => warn!(url = %url, error = %e, "failed to download image, skipping"),
                    }
                }
            }
        }
    }

    async fn collect_references(&self, names: &[String], out: &mut Collected) {
        for name in names {
            if out.full() {
                break;
            }
            match read_reference(&self.refer_dir, name).await {
                Ok(image) => out.push(image),
                Err(e) => warn!(file = %name, error = %e, "reference image unavailable, skipping"),
            }
        }
    }

    /// One avatar per entry; a participant listed twice contributes twice
    /// but is resolved once.
    async fn collect_avatars(
        &self,
        msg: &InboundMessage,
        participants: &[ParticipantId],
        out: &mut Collected,
    ) {
        let mut resolved: HashMap<&ParticipantId, Option<ImageData>> = HashMap::new();
        for participant in participants {
            if out.full() {
                break;
            }
            if !resolved.contains_key(participant) {
                let avatar = match self
                    .channel
                    .resolve_avatar(&msg.conversation, participant)
                    .await
                {
                    Ok(image) => Some(image),
                    Err(e) => {
                        warn!(participant = %participant, error = %e, "avatar unavailable, skipping");
                        None
                    }
                };
                resolved.insert(participant, avatar);
            }
            if let Some(Some(image)) = resolved.get(participant) {
                out.push(image.clone());
            }
        }
    }

    /// Mentioned participants in mention order, with at most one mention
    /// skipped: the bot's own when it was used to wake the bot, or the quoted
    /// sender's when configured.
    fn mentioned(&self, msg: &InboundMessage) -> Vec<ParticipantId> {
        let quoted = msg.quoted_sender();
        let mut skipped = false;
        let mut out = Vec::new();
        for participant in msg.mentions() {
            if !skipped {
                let is_self = msg.self_id.as_ref() == Some(&participant)
                    && msg.addressed_to_bot
                    && self.preference.skip_self_mention;
                let is_quoted =
                    quoted == Some(&participant) && self.preference.skip_quoted_mention;
                if is_self || is_quoted {
                    skipped = true;
                    continue;
                }
            }
            out.push(participant);
        }
        out
    }
}

/// Reads one reference image. Names must be plain file names.
async fn read_reference(dir: &Path, name: &str) -> Result<ImageData, BananaError> {
    let name = name.trim();
    let plain = Path::new(name)
        .file_name()
        .is_some_and(|f| f == std::ffi::OsStr::new(name));
    if !plain {
        return Err(BananaError::Validation {
            flag: "refer_images".to_string(),
            value: name.to_string(),
            expected: "a file name inside the reference directory".to_string(),
        });
    }
    let data = tokio::fs::read(dir.join(name))
        .await
        .map_err(|e| BananaError::Storage {
            source: Box::new(e),
        })?;
    let mime = mime_from_filename(name)
        .or_else(|| sniff_mime(&data))
        .unwrap_or("image/png");
    Ok(ImageData::new(mime, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use banana_core::{MessageSegment, QuotedMessage};
    use banana_test_utils::{MockChannel, request, tagged_png};
    use tracing_test::traced_test;

    fn caps(mention: bool, sender: bool) -> ChannelCapabilities {
        ChannelCapabilities {
            mention_avatars: mention,
            sender_avatar: sender,
            ..Default::default()
        }
    }

    fn bounds(min: usize, max: usize) -> GenerationRequest {
        let mut req = request("bnt", "p", &[]);
        req.min_images = min;
        req.max_images = max;
        req
    }

    fn storage(dir: &Path) -> StorageConfig {
        StorageConfig {
            refer_images_dir: dir.display().to_string(),
            ..Default::default()
        }
    }

    fn assembler(channel: MockChannel, dir: &Path) -> ImageReferenceAssembler {
        ImageReferenceAssembler::new(Arc::new(channel), &storage(dir), PreferenceConfig::default())
    }

    fn url(n: u8) -> MessageSegment {
        MessageSegment::Image(ImageRef::Url(format!("http://img/{n}.png")))
    }

    fn channel_with_urls(n: u8) -> MockChannel {
        (1..=n).fold(MockChannel::new(), |c, i| {
            c.with_image(&format!("http://img/{i}.png"), tagged_png(i))
        })
    }

    #[tokio::test]
    async fn attachments_suffice_without_avatars() {
        let dir = tempfile::tempdir().unwrap();
        let channel = channel_with_urls(2).with_avatar("alice", tagged_png(99));
        let a = assembler(channel, dir.path());
        let msg = InboundMessage::text("c", "alice", "bnt")
            .with_segment(url(1))
            .with_segment(url(2));

        let images = a
            .assemble(&bounds(2, 6), AssemblySources::direct(&msg), &caps(true, true))
            .await
            .unwrap();
        assert_eq!(images, vec![tagged_png(1), tagged_png(2)]);
    }

    #[tokio::test]
    async fn truncates_from_the_end() {
        let dir = tempfile::tempdir().unwrap();
        let a = assembler(channel_with_urls(3), dir.path());
        let msg = InboundMessage::text("c", "u", "bnt")
            .with_segment(url(1))
            .with_segment(url(2))
            .with_segment(url(3));

        let images = a
            .assemble(&bounds(0, 2), AssemblySources::direct(&msg), &caps(false, false))
            .await
            .unwrap();
        assert_eq!(images, vec![tagged_png(1), tagged_png(2)]);
    }

    #[tokio::test]
    async fn duplicate_urls_fetched_once() {
        let dir = tempfile::tempdir().unwrap();
        let channel = Arc::new(channel_with_urls(1));
        let a = ImageReferenceAssembler::new(
            channel.clone(),
            &storage(dir.path()),
            PreferenceConfig::default(),
        );
        let msg = InboundMessage::text("c", "u", "bnt")
            .with_segment(url(1))
            .with_segment(url(1));
        let gathered = vec![ImageRef::Url("http://img/1.png".into())];

        let images = a
            .assemble(
                &bounds(0, 6),
                AssemblySources {
                    message: &msg,
                    gathered: &gathered,
                },
                &caps(false, false),
            )
            .await
            .unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(channel.fetched_urls().await.len(), 1);
    }

    #[tokio::test]
    async fn attached_then_gathered_then_references() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("style.png"), tagged_png(50).data).unwrap();
        let a = assembler(channel_with_urls(2), dir.path());
        let msg = InboundMessage::text("c", "u", "bna").with_segment(url(1));
        let gathered = vec![ImageRef::Url("http://img/2.png".into())];
        let mut req = bounds(0, 6);
        req.refer_images = vec!["style.png".into(), "missing.png".into()];

        let images = a
            .assemble(
                &req,
                AssemblySources {
                    message: &msg,
                    gathered: &gathered,
                },
                &caps(false, false),
            )
            .await
            .unwrap();
        assert_eq!(images, vec![tagged_png(1), tagged_png(2), tagged_png(50)]);
        assert_eq!(images[2].mime_type, "image/png");
    }

    #[tokio::test]
    async fn reference_names_cannot_escape_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("refs");
        std::fs::create_dir(&inner).unwrap();
        std::fs::write(dir.path().join("secret.png"), tagged_png(1).data).unwrap();
        let a = assembler(MockChannel::new(), &inner);
        let mut req = bounds(0, 6);
        req.refer_images = vec!["../secret.png".into()];
        let msg = InboundMessage::text("c", "u", "bnt");

        let images = a
            .assemble(&req, AssemblySources::direct(&msg), &caps(false, false))
            .await
            .unwrap();
        assert!(images.is_empty());
    }

    #[tokio::test]
    async fn mention_avatars_skip_self_once_then_sender() {
        let dir = tempfile::tempdir().unwrap();
        let channel = MockChannel::new()
            .with_avatar("bot", tagged_png(1))
            .with_avatar("bob", tagged_png(2))
            .with_avatar("alice", tagged_png(3));
        let a = assembler(channel, dir.path());
        let mut msg = InboundMessage::text("c", "alice", "bnt")
            .with_segment(MessageSegment::Mention(ParticipantId("bot".into())))
            .with_segment(MessageSegment::Mention(ParticipantId("bob".into())));
        msg.self_id = Some(ParticipantId("bot".into()));
        msg.addressed_to_bot = true;

        let images = a
            .assemble(&bounds(2, 6), AssemblySources::direct(&msg), &caps(true, true))
            .await
            .unwrap();
        assert_eq!(images, vec![tagged_png(2), tagged_png(3)]);
    }

    #[tokio::test]
    async fn repeated_mention_contributes_per_mention() {
        let dir = tempfile::tempdir().unwrap();
        let channel = MockChannel::new().with_avatar("bob", tagged_png(2));
        let a = assembler(channel, dir.path());
        let msg = InboundMessage::text("c", "alice", "bnt")
            .with_segment(MessageSegment::Mention(ParticipantId("bob".into())))
            .with_segment(MessageSegment::Mention(ParticipantId("bob".into())));

        let images = a
            .assemble(&bounds(2, 6), AssemblySources::direct(&msg), &caps(true, false))
            .await
            .unwrap();
        assert_eq!(images, vec![tagged_png(2), tagged_png(2)]);
    }

    #[tokio::test]
    async fn self_mention_kept_when_not_used_to_wake() {
        let dir = tempfile::tempdir().unwrap();
        let channel = MockChannel::new().with_avatar("bot", tagged_png(1));
        let a = assembler(channel, dir.path());
        let mut msg = InboundMessage::text("c", "alice", "bnt")
            .with_segment(MessageSegment::Mention(ParticipantId("bot".into())));
        msg.self_id = Some(ParticipantId("bot".into()));

        let images = a
            .assemble(&bounds(1, 6), AssemblySources::direct(&msg), &caps(true, false))
            .await
            .unwrap();
        assert_eq!(images, vec![tagged_png(1)]);
    }

    #[tokio::test]
    async fn quoted_sender_mention_skipped_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let channel = MockChannel::new()
            .with_avatar("carol", tagged_png(1))
            .with_avatar("dave", tagged_png(2));
        let a = ImageReferenceAssembler::new(
            Arc::new(channel),
            &storage(dir.path()),
            PreferenceConfig {
                skip_self_mention: true,
                skip_quoted_mention: true,
            },
        );
        let msg = InboundMessage::text("c", "alice", "bnt")
            .with_segment(MessageSegment::Quote(QuotedMessage {
                sender: ParticipantId("carol".into()),
                segments: vec![],
            }))
            .with_segment(MessageSegment::Mention(ParticipantId("carol".into())))
            .with_segment(MessageSegment::Mention(ParticipantId("dave".into())));

        let images = a
            .assemble(&bounds(1, 6), AssemblySources::direct(&msg), &caps(true, false))
            .await
            .unwrap();
        assert_eq!(images, vec![tagged_png(2)]);
    }

    #[tokio::test]
    async fn shortfall_lists_every_source_tried() {
        let dir = tempfile::tempdir().unwrap();
        let a = assembler(MockChannel::new(), dir.path());
        let msg = InboundMessage::text("c", "alice", "bnt");

        let err = a
            .assemble(&bounds(2, 6), AssemblySources::direct(&msg), &caps(true, true))
            .await
            .unwrap_err();
        let BananaError::InsufficientImages {
            required,
            available,
            exhausted,
        } = err
        else {
            panic!("expected InsufficientImages");
        };
        assert_eq!((required, available), (2, 0));
        assert_eq!(
            exhausted,
            vec![
                ImageSourceKind::Attached,
                ImageSourceKind::Reference,
                ImageSourceKind::MentionAvatar,
                ImageSourceKind::SenderAvatar,
            ]
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_download_is_skipped_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let a = assembler(channel_with_urls(1), dir.path());
        let msg = InboundMessage::text("c", "u", "bnt")
            .with_segment(MessageSegment::Image(ImageRef::Url("http://img/gone.png".into())))
            .with_segment(url(1));

        let images = a
            .assemble(&bounds(1, 6), AssemblySources::direct(&msg), &caps(false, false))
            .await
            .unwrap();
        assert_eq!(images, vec![tagged_png(1)]);
        assert!(logs_contain("failed to download image"));
    }
}
