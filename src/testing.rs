//! Stub implementations of the platform seams, shared by unit tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{DownloadError, PublishError, ResolveError};
use crate::media::VideoDownloader;
use crate::platform::{ChannelHandle, Destination, Embed, FileLocator};

pub struct StubLocator {
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl StubLocator {
    pub fn ok() -> Self {
        Self {
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileLocator for StubLocator {
    async fn download_url(&self, file_id: &str) -> Result<String, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(ResolveError::MissingPath)
        } else {
            Ok(format!("https://files.test/{}", file_id))
        }
    }
}

/// Optionally writes the destination file, then succeeds or fails
#[derive(Default)]
pub struct StubDownloader {
    pub fail: bool,
    pub write_output: bool,
    pub calls: AtomicUsize,
    pub paths: Mutex<Vec<PathBuf>>,
}

impl StubDownloader {
    pub fn writing() -> Self {
        Self {
            write_output: true,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            write_output: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.paths.lock().unwrap().clone()
    }
}

#[async_trait]
impl VideoDownloader for StubDownloader {
    async fn download(&self, _url: &str, dest: &Path) -> Result<(), DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.paths.lock().unwrap().push(dest.to_path_buf());
        if self.write_output {
            std::fs::write(dest, b"video bytes").unwrap();
        }
        if self.fail {
            Err(DownloadError::Failed {
                status: "exit status: 1".to_string(),
                stderr: "ERROR: unsupported URL".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Embed(Embed),
    /// Whether the file existed at the moment it was sent
    File { path: PathBuf, existed: bool },
}

#[derive(Default)]
pub struct RecordingDestination {
    pub channel_missing: bool,
    pub fail_embeds: bool,
    pub fail_files: bool,
    pub sent: Mutex<Vec<Sent>>,
}

impl RecordingDestination {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn embeds(&self) -> Vec<Embed> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Embed(e) => Some(e),
                Sent::File { .. } => None,
            })
            .collect()
    }
}

fn rejected() -> PublishError {
    PublishError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        "destination rejected the send",
    ))
}

#[async_trait]
impl Destination for RecordingDestination {
    async fn ready(&self) -> Result<String, PublishError> {
        Ok("relay-test".to_string())
    }

    async fn resolve_channel(&self) -> Result<ChannelHandle, PublishError> {
        if self.channel_missing {
            return Err(rejected());
        }
        Ok(ChannelHandle {
            id: 1,
            name: Some("general".to_string()),
        })
    }

    async fn send_embed(&self, _channel: &ChannelHandle, embed: &Embed) -> Result<(), PublishError> {
        if self.fail_embeds {
            return Err(rejected());
        }
        self.sent.lock().unwrap().push(Sent::Embed(embed.clone()));
        Ok(())
    }

    async fn send_file(&self, _channel: &ChannelHandle, path: &Path) -> Result<(), PublishError> {
        let existed = path.exists();
        self.sent.lock().unwrap().push(Sent::File {
            path: path.to_path_buf(),
            existed,
        });
        if self.fail_files {
            return Err(rejected());
        }
        Ok(())
    }
}
