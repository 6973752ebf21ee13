use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::MediaConfig;
use crate::error::{DownloadError, ResolveError};
use crate::platform::{FileLocator, MediaKind, MediaRef};

/// How much downloader stderr to keep in an error
const STDERR_TAIL_CHARS: usize = 500;

/// A file on disk owned by one relay step; removed when dropped together
/// with any downloader leftovers sharing its stem (`.part`, `.ytdl`, `.fNNN.*`).
#[derive(Debug)]
pub struct DownloadedFile {
    path: PathBuf,
}

impl DownloadedFile {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

impl Drop for DownloadedFile {
    fn drop(&mut self) {
        remove_quietly(&self.path);

        let (Some(dir), Some(stem)) = (self.path.parent(), self.path.file_stem()) else {
            return;
        };
        let prefix = format!("{}.", stem.to_string_lossy());
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to scan {} for leftovers: {}", dir.display(), e);
                return;
            }
        };
        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                remove_quietly(&entry.path());
            }
        }
    }
}

#[derive(Debug)]
pub struct ResolvedMedia {
    pub kind: MediaKind,
    pub download_url: String,
    /// Present only for a video that was downloaded
    pub local_file: Option<DownloadedFile>,
}

/// Materializes a remote video stream into a local file
#[async_trait]
pub trait VideoDownloader: Send + Sync {
    async fn download(&self, url: &str, dest: &Path) -> Result<(), DownloadError>;
}

/// Runs the yt-dlp executable
pub struct YtDlp {
    program: PathBuf,
    format: String,
}

impl YtDlp {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            program: config.downloader.clone(),
            format: config.format.clone(),
        }
    }

    fn args(&self, url: &str, dest: &Path) -> Vec<OsString> {
        vec![
            "--quiet".into(),
            "--no-warnings".into(),
            "--no-playlist".into(),
            "--no-part".into(),
            "-f".into(),
            self.format.clone().into(),
            "--merge-output-format".into(),
            "mp4".into(),
            "-o".into(),
            dest.as_os_str().to_owned(),
            url.into(),
        ]
    }
}

#[async_trait]
impl VideoDownloader for YtDlp {
    async fn download(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        let output = Command::new(&self.program)
            .args(self.args(url, dest))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(DownloadError::Spawn)?;

        if output.status.success() {
            return Ok(());
        }

        // The URL embeds the source bot token; keep it out of logs.
        let stderr = String::from_utf8_lossy(&output.stderr).replace(url, "<media url>");
        let skip = stderr.chars().count().saturating_sub(STDERR_TAIL_CHARS);
        Err(DownloadError::Failed {
            status: output.status.to_string(),
            stderr: stderr.chars().skip(skip).collect::<String>().trim().to_string(),
        })
    }
}

/// Turns media handles into URLs and, for video, local files
pub struct MediaResolver {
    locator: Arc<dyn FileLocator>,
    downloader: Arc<dyn VideoDownloader>,
    download_dir: PathBuf,
}

impl MediaResolver {
    pub fn new(
        locator: Arc<dyn FileLocator>,
        downloader: Arc<dyn VideoDownloader>,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            locator,
            downloader,
            download_dir,
        }
    }

    /// Unique per call, so concurrent or back-to-back downloads never collide
    fn allocate_path(&self) -> PathBuf {
        let name = format!(
            "relay-{}-{}.mp4",
            Utc::now().format("%Y%m%dT%H%M%S%.3f"),
            Uuid::new_v4().simple()
        );
        self.download_dir.join(name)
    }

    pub async fn resolve(&self, media: &MediaRef) -> Result<ResolvedMedia, ResolveError> {
        let download_url = self.locator.download_url(&media.file_id).await?;

        match media.kind {
            MediaKind::Photo => Ok(ResolvedMedia {
                kind: media.kind,
                download_url,
                local_file: None,
            }),
            MediaKind::Video => {
                // Guard first so a partial download is cleaned up on failure
                let file = DownloadedFile::new(self.allocate_path());
                self.downloader.download(&download_url, file.path()).await?;
                if !file.path().exists() {
                    return Err(DownloadError::MissingOutput(file.path().to_path_buf()).into());
                }
                info!("Downloaded video to {}", file.path().display());
                Ok(ResolvedMedia {
                    kind: media.kind,
                    download_url,
                    local_file: Some(file),
                })
            }
        }
    }
}
