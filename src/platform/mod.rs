pub mod discord;
pub mod telegram;

use std::path::Path;

use async_trait::async_trait;

use crate::error::{FetchError, PublishError, ResolveError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Photo => write!(f, "photo"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// Opaque, time-limited handle to media on the source platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub file_id: String,
}

/// A post to relay, normalized from a source update
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RelayMessage {
    /// Primary text, or the media caption; may be empty
    pub text: String,
    pub media: Option<MediaRef>,
}

/// One entry from the source poll endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUpdate {
    pub update_id: i64,
    pub chat_id: Option<i64>,
    /// None for update kinds the relay does not handle
    pub message: Option<RelayMessage>,
}

/// A destination channel that was looked up for the current tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle {
    pub id: u64,
    pub name: Option<String>,
}

impl std::fmt::Display for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "#{} ({})", name, self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Rich post body understood by the destination
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct EmbedImage {
    pub url: String,
}

/// Source of new updates, polled once per tick
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Fetch updates with ids >= `offset` (all pending ones when None)
    async fn fetch(&self, offset: Option<i64>) -> Result<Vec<SourceUpdate>, FetchError>;
}

/// Maps a media handle to a download URL
#[async_trait]
pub trait FileLocator: Send + Sync {
    async fn download_url(&self, file_id: &str) -> Result<String, ResolveError>;
}

/// Destination platform operations used by the publisher
#[async_trait]
pub trait Destination: Send + Sync {
    /// Confirm the credentials work; returns the bot's display name
    async fn ready(&self) -> Result<String, PublishError>;

    async fn resolve_channel(&self) -> Result<ChannelHandle, PublishError>;

    async fn send_embed(&self, channel: &ChannelHandle, embed: &Embed) -> Result<(), PublishError>;

    async fn send_file(&self, channel: &ChannelHandle, path: &Path) -> Result<(), PublishError>;
}
