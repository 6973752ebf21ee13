use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;

use crate::config::DiscordConfig;
use crate::error::PublishError;
use crate::media::ResolvedMedia;
use crate::platform::{ChannelHandle, Destination, Embed, EmbedImage, MediaKind};

/// Discord rejects embed descriptions longer than this many characters
const MAX_DESCRIPTION_CHARS: usize = 4096;

/// One destination post, built and consumed within a publish call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPost {
    pub title: String,
    pub body: String,
    pub color: u32,
    pub image_url: Option<String>,
    pub attachment: Option<PathBuf>,
}

impl RenderedPost {
    fn embed(&self) -> Embed {
        Embed {
            title: self.title.clone(),
            description: self.body.clone(),
            color: self.color,
            image: self.image_url.clone().map(|url| EmbedImage { url }),
        }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Renders relay messages into posts and sends them to the destination
pub struct Publisher {
    destination: Arc<dyn Destination>,
    title: String,
    color: u32,
    max_upload_bytes: u64,
}

impl Publisher {
    pub fn new(destination: Arc<dyn Destination>, config: &DiscordConfig) -> Self {
        Self {
            destination,
            title: config.embed_title.clone(),
            color: config.embed_color,
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    pub async fn resolve_channel(&self) -> Result<ChannelHandle, PublishError> {
        self.destination.resolve_channel().await
    }

    /// Build the post for `body` and whatever media resolved.
    pub fn render(&self, body: &str, media: Option<&ResolvedMedia>) -> RenderedPost {
        let (image_url, attachment) = match media {
            Some(m) if m.kind == MediaKind::Photo => (Some(m.download_url.clone()), None),
            Some(m) => (None, m.local_file.as_ref().map(|f| f.path().to_path_buf())),
            None => (None, None),
        };

        RenderedPost {
            title: self.title.clone(),
            body: truncate_chars(body, MAX_DESCRIPTION_CHARS),
            color: self.color,
            image_url,
            attachment,
        }
    }

    /// Send the embed, then the attachment if there is one.
    pub async fn publish(&self, channel: &ChannelHandle, post: &RenderedPost) -> Result<(), PublishError> {
        self.destination.send_embed(channel, &post.embed()).await?;

        let path = match &post.attachment {
            Some(path) => path,
            None => return Ok(()),
        };

        let size = tokio::fs::metadata(path).await?.len();
        if size > self.max_upload_bytes {
            warn!(
                "Skipping attachment {} ({} bytes exceeds the {} byte upload limit)",
                path.display(),
                size,
                self.max_upload_bytes
            );
            return Ok(());
        }

        self.destination.send_file(channel, path).await
    }

    /// Render and publish one message. Takes ownership of the resolved
    /// media so any downloaded file is deleted when this returns,
    /// whether or not the sends succeeded.
    pub async fn send(
        &self,
        channel: &ChannelHandle,
        body: &str,
        media: Option<ResolvedMedia>,
    ) -> Result<(), PublishError> {
        let post = self.render(body, media.as_ref());
        let result = self.publish(channel, &post).await;
        drop(media);
        result
    }
}
