use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::TelegramConfig;
use crate::error::{FetchError, ResolveError};
use crate::platform::{FileLocator, MediaKind, MediaRef, RelayMessage, SourceUpdate, UpdateSource};

/// Update kinds the relay asks for; everything else is filtered server-side
const ALLOWED_UPDATES: &str = r#"["message","channel_post"]"#;

/// Headroom on top of the long-poll timeout before the HTTP client gives up
const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn rejection(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| "ok=false without description".to_string())
    }
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    chat: Option<RawChat>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    /// Same photo at increasing resolutions
    #[serde(default)]
    photo: Vec<RawFileRef>,
    #[serde(default)]
    video: Option<RawFileRef>,
}

#[derive(Debug, Deserialize)]
struct RawChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct RawFileRef {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    #[serde(default)]
    file_path: Option<String>,
}

impl RawMessage {
    fn text(&self) -> String {
        self.text
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(self.caption.as_deref())
            .unwrap_or_default()
            .to_string()
    }

    fn media(&self) -> Option<MediaRef> {
        if let Some(largest) = self.photo.last() {
            return Some(MediaRef {
                kind: MediaKind::Photo,
                file_id: largest.file_id.clone(),
            });
        }
        self.video.as_ref().map(|video| MediaRef {
            kind: MediaKind::Video,
            file_id: video.file_id.clone(),
        })
    }

    fn into_relay_message(self) -> (Option<i64>, RelayMessage) {
        let message = RelayMessage {
            text: self.text(),
            media: self.media(),
        };
        (self.chat.map(|c| c.id), message)
    }
}

/// Normalize one raw update. Anything past `update_id` that fails to parse
/// still yields an update so the cursor can move past it.
fn parse_update(value: serde_json::Value) -> Option<SourceUpdate> {
    let update_id = match value.get("update_id").and_then(|v| v.as_i64()) {
        Some(id) => id,
        None => {
            warn!("Skipping update without update_id");
            return None;
        }
    };

    let raw = value.get("message").or_else(|| value.get("channel_post"));
    let (chat_id, message) = match raw {
        Some(raw) => match RawMessage::deserialize(raw) {
            Ok(msg) => {
                let (chat_id, message) = msg.into_relay_message();
                (chat_id, Some(message))
            }
            Err(e) => {
                warn!("Update {} has an unreadable message: {}", update_id, e);
                (None, None)
            }
        },
        None => (None, None),
    };

    Some(SourceUpdate {
        update_id,
        chat_id,
        message,
    })
}

/// Parse a `getUpdates` response body
pub fn parse_updates(body: &str) -> Result<Vec<SourceUpdate>, FetchError> {
    let envelope: ApiResponse<Vec<serde_json::Value>> =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;

    if !envelope.ok {
        return Err(FetchError::Api(envelope.rejection()));
    }

    let raw = envelope
        .result
        .ok_or_else(|| FetchError::Malformed("response has no result".to_string()))?;

    Ok(raw.into_iter().filter_map(parse_update).collect())
}

/// Parse a `getFile` response body into the relative file path
fn parse_file_path(body: &str) -> Result<String, ResolveError> {
    let envelope: ApiResponse<RawFile> =
        serde_json::from_str(body).map_err(|e| ResolveError::Lookup(e.to_string()))?;

    if !envelope.ok {
        return Err(ResolveError::Lookup(envelope.rejection()));
    }

    envelope
        .result
        .and_then(|f| f.file_path)
        .filter(|p| !p.is_empty())
        .ok_or(ResolveError::MissingPath)
}

/// Telegram Bot API client used as the relay's update source
pub struct TelegramClient {
    client: reqwest::Client,
    api_url: String,
    token: String,
    poll_timeout_secs: u64,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs) + REQUEST_TIMEOUT_MARGIN)
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.bot_token.clone(),
            poll_timeout_secs: config.poll_timeout_secs,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_url, self.token, file_path)
    }

    /// Drop any webhook so long polling is the only delivery mode.
    /// Best-effort: failures are logged and ignored.
    async fn clear_webhook(&self) {
        let result = self
            .client
            .get(self.method_url("deleteWebhook"))
            .send()
            .await
            .map_err(|e| e.without_url());

        match result {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => debug!("deleteWebhook returned {}", resp.status()),
            Err(e) => warn!("deleteWebhook failed: {}", e),
        }
    }

    async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<SourceUpdate>, FetchError> {
        let mut query = vec![
            ("timeout", self.poll_timeout_secs.to_string()),
            ("allowed_updates", ALLOWED_UPDATES.to_string()),
        ];
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }

        // Telegram reports API errors as JSON bodies with ok=false, so the
        // body is parsed whatever the status code.
        let body = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&query)
            .send()
            .await
            .map_err(|e| e.without_url())?
            .text()
            .await
            .map_err(|e| e.without_url())?;

        parse_updates(&body)
    }
}

#[async_trait]
impl UpdateSource for TelegramClient {
    async fn fetch(&self, offset: Option<i64>) -> Result<Vec<SourceUpdate>, FetchError> {
        self.clear_webhook().await;
        let updates = self.get_updates(offset).await?;
        debug!("Fetched {} update(s) at offset {:?}", updates.len(), offset);
        Ok(updates)
    }
}

#[async_trait]
impl FileLocator for TelegramClient {
    async fn download_url(&self, file_id: &str) -> Result<String, ResolveError> {
        let body = self
            .client
            .get(self.method_url("getFile"))
            .query(&[("file_id", file_id)])
            .send()
            .await
            .map_err(|e| ResolveError::Lookup(e.without_url().to_string()))?
            .text()
            .await
            .map_err(|e| ResolveError::Lookup(e.without_url().to_string()))?;

        let path = parse_file_path(&body)?;
        Ok(self.file_url(&path))
    }
}
