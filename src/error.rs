use std::path::PathBuf;

/// Failure to pull a batch of updates from the source platform.
///
/// The relay loop treats every variant as "no updates this cycle".
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("api rejected request: {0}")]
    Api(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("translation service returned {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed translation response: {0}")]
    Malformed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("failed to start downloader: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("downloader exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("downloader reported success but {0} is missing")]
    MissingOutput(PathBuf),
}

/// Failure to turn a media handle into something publishable.
///
/// Callers fall back to a text-only post.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("file lookup failed: {0}")]
    Lookup(String),

    #[error("file lookup returned no file_path")]
    MissingPath,

    #[error("video download failed: {0}")]
    Download(#[from] DownloadError),
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("destination returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
