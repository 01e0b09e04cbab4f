// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound message construction and local persistence of results.

use std::path::{Path, PathBuf};

use banana_config::model::StorageConfig;
use banana_core::{
    Attachment, BananaError, ChannelCapabilities, ConversationId, GeneratedImage, ImageData,
    MessageId, OutboundMessage,
};
use chrono::Local;
use tracing::info;

/// Builds the reply carrying generated images.
///
/// When any image exceeds the channel's inline limit, every image goes out
/// as a file so the reply stays in one piece.
pub fn build_reply(
    conversation: &ConversationId,
    reply_to: &MessageId,
    result: &GeneratedImage,
    capabilities: &ChannelCapabilities,
) -> OutboundMessage {
    let as_files = capabilities
        .max_attachment_bytes
        .is_some_and(|limit| result.images.iter().any(|img| img.len() > limit));

    let stamp = timestamp();
    let attachments = result
        .images
        .iter()
        .enumerate()
        .map(|(i, image)| {
            if as_files {
                Attachment::File {
                    name: file_name(&stamp, i, image),
                    image: image.clone(),
                }
            } else {
                Attachment::Image(image.clone())
            }
        })
        .collect();

    OutboundMessage {
        conversation: conversation.clone(),
        reply_to: Some(reply_to.clone()),
        text: result.text.clone().filter(|t| !t.trim().is_empty()),
        attachments,
    }
}

/// Writes generated images to disk when saving is enabled.
#[derive(Debug, Clone)]
pub struct ImageSaver {
    dir: Option<PathBuf>,
}

impl ImageSaver {
    pub fn from_config(storage: &StorageConfig) -> Self {
        Self {
            dir: storage.save_images.then(|| storage.save_path()),
        }
    }

    pub fn disabled() -> Self {
        Self { dir: None }
    }

    /// Saves every image and returns the written paths.
    pub async fn save(&self, images: &[ImageData]) -> Result<Vec<PathBuf>, BananaError> {
        let Some(dir) = &self.dir else {
            return Ok(Vec::new());
        };
        tokio::fs::create_dir_all(dir).await.map_err(storage_err)?;
        let stamp = timestamp();
        let mut paths = Vec::with_capacity(images.len());
        for (i, image) in images.iter().enumerate() {
            let path = dir.join(file_name(&stamp, i, image));
            write_image(&path, image).await?;
            info!(path = %path.display(), "image saved");
            paths.push(path);
        }
        Ok(paths)
    }
}

async fn write_image(path: &Path, image: &ImageData) -> Result<(), BananaError> {
    tokio::fs::write(path, &image.data).await.map_err(storage_err)
}

fn storage_err(e: std::io::Error) -> BananaError {
    BananaError::Storage {
        source: Box::new(e),
    }
}

/// Local time down to milliseconds, e.g. `20261019142501123`.
fn timestamp() -> String {
    Local::now().format("%Y%m%d%H%M%S%3f").to_string()
}

fn file_name(stamp: &str, index: usize, image: &ImageData) -> String {
    if index == 0 {
        format!("banana_{stamp}{}", image.extension())
    } else {
        format!("banana_{stamp}_{index}{}", image.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(sizes: &[usize]) -> GeneratedImage {
        GeneratedImage {
            provider: "p".into(),
            images: sizes
                .iter()
                .map(|n| ImageData::new("image/png", vec![0; *n]))
                .collect(),
            text: Some("  ".into()),
        }
    }

    #[test]
    fn inline_when_within_limit() {
        let caps = ChannelCapabilities {
            max_attachment_bytes: Some(10),
            ..Default::default()
        };
        let reply = build_reply(
            &ConversationId("c".into()),
            &MessageId("m".into()),
            &result(&[4, 10]),
            &caps,
        );
        assert!(reply.attachments.iter().all(|a| matches!(a, Attachment::Image(_))));
        assert_eq!(reply.reply_to, Some(MessageId("m".into())));
        assert!(reply.text.is_none());
    }

    #[test]
    fn one_oversized_image_sends_all_as_files() {
        let caps = ChannelCapabilities {
            max_attachment_bytes: Some(10),
            ..Default::default()
        };
        let reply = build_reply(
            &ConversationId("c".into()),
            &MessageId("m".into()),
            &result(&[4, 11]),
            &caps,
        );
        assert_eq!(reply.attachments.len(), 2);
        for attachment in &reply.attachments {
            let Attachment::File { name, .. } = attachment else {
                panic!("expected file attachment");
            };
            assert!(name.starts_with("banana_") && name.ends_with(".png"));
        }
    }

    #[tokio::test]
    async fn saver_writes_each_image() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageConfig {
            save_dir: dir.path().join("out").display().to_string(),
            save_images: true,
            ..Default::default()
        };
        let saver = ImageSaver::from_config(&storage);
        let paths = saver
            .save(&[
                ImageData::new("image/png", vec![1]),
                ImageData::new("image/jpeg", vec![2]),
            ])
            .await
            .unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[1].to_string_lossy().ends_with("_1.jpg"));
        assert_eq!(std::fs::read(&paths[0]).unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn disabled_saver_writes_nothing() {
        assert!(
            ImageSaver::disabled()
                .save(&[ImageData::new("image/png", vec![1])])
                .await
                .unwrap()
                .is_empty()
        );
    }
}
