use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::DiscordConfig;
use crate::error::PublishError;
use crate::platform::{ChannelHandle, Destination, Embed};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest rate-limit pause we are willing to sit through before giving up
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct CurrentUser {
    username: String,
}

#[derive(Debug, Deserialize)]
struct RawChannel {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RateLimited {
    retry_after: f64,
}

/// How long a 429 body asks us to wait, if it is a sane value
fn parse_retry_after(body: &str) -> Option<Duration> {
    let limited: RateLimited = serde_json::from_str(body).ok()?;
    let secs = limited.retry_after;
    if !(0.0..=MAX_RETRY_AFTER.as_secs_f64()).contains(&secs) {
        return None;
    }
    Some(Duration::from_secs_f64(secs))
}

fn embed_payload(embed: &Embed) -> serde_json::Value {
    json!({ "embeds": [embed] })
}

fn attachment_payload(file_name: &str) -> serde_json::Value {
    json!({ "attachments": [{ "id": 0, "filename": file_name }] })
}

/// Discord REST client bound to the single destination channel
pub struct DiscordClient {
    client: reqwest::Client,
    api_url: String,
    token: String,
    channel_id: u64,
}

impl DiscordClient {
    pub fn new(config: &DiscordConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.bot_token.clone(),
            channel_id: config.channel_id,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.token)
    }

    /// Send the request built by `build`, retrying once when rate limited.
    async fn execute<F>(&self, build: F) -> Result<Response, PublishError>
    where
        F: Fn() -> Result<RequestBuilder, PublishError>,
    {
        let response = build()?
            .header("Authorization", self.authorization())
            .send()
            .await?;

        if response.status() != StatusCode::TOO_MANY_REQUESTS {
            return check_status(response).await;
        }

        let body = response.text().await.unwrap_or_default();
        let wait = match parse_retry_after(&body) {
            Some(wait) => wait,
            None => {
                return Err(PublishError::Status {
                    status: StatusCode::TOO_MANY_REQUESTS,
                    body,
                })
            }
        };

        warn!("Discord rate limited, retrying in {:?}", wait);
        tokio::time::sleep(wait).await;

        let response = build()?
            .header("Authorization", self.authorization())
            .send()
            .await?;
        check_status(response).await
    }
}

async fn check_status(response: Response) -> Result<Response, PublishError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(PublishError::Status { status, body })
}

#[async_trait]
impl Destination for DiscordClient {
    async fn ready(&self) -> Result<String, PublishError> {
        let url = self.url("/users/@me");
        let user: CurrentUser = self
            .execute(|| Ok(self.client.get(&url)))
            .await?
            .json()
            .await?;
        Ok(user.username)
    }

    async fn resolve_channel(&self) -> Result<ChannelHandle, PublishError> {
        let url = self.url(&format!("/channels/{}", self.channel_id));
        let channel: RawChannel = self
            .execute(|| Ok(self.client.get(&url)))
            .await?
            .json()
            .await?;
        Ok(ChannelHandle {
            id: self.channel_id,
            name: channel.name,
        })
    }

    async fn send_embed(&self, channel: &ChannelHandle, embed: &Embed) -> Result<(), PublishError> {
        let url = self.url(&format!("/channels/{}/messages", channel.id));
        let payload = embed_payload(embed);
        self.execute(|| Ok(self.client.post(&url).json(&payload)))
            .await?;
        debug!("Sent embed to {}", channel);
        Ok(())
    }

    async fn send_file(&self, channel: &ChannelHandle, path: &Path) -> Result<(), PublishError> {
        let url = self.url(&format!("/channels/{}/messages", channel.id));
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video.mp4".to_string());
        let payload = serde_json::to_string(&attachment_payload(&file_name))?;

        self.execute(|| {
            let part = Part::bytes(bytes.clone())
                .file_name(file_name.clone())
                .mime_str("video/mp4")?;
            let form = Form::new()
                .text("payload_json", payload.clone())
                .part("files[0]", part);
            Ok(self.client.post(&url).multipart(form))
        })
        .await?;

        debug!("Sent {} ({} bytes) to {}", file_name, bytes.len(), channel);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::EmbedImage;

    #[test]
    fn test_embed_payload_without_image() {
        let embed = Embed {
            title: "Nuevo mensaje".to_string(),
            description: "¡Gol!".to_string(),
            color: 0x3498db,
            image: None,
        };
        let payload = embed_payload(&embed);
        assert_eq!(payload["embeds"][0]["title"], "Nuevo mensaje");
        assert_eq!(payload["embeds"][0]["description"], "¡Gol!");
        assert_eq!(payload["embeds"][0]["color"], 0x3498db);
        assert!(payload["embeds"][0].get("image").is_none());
    }

    #[test]
    fn test_embed_payload_with_image() {
        let embed = Embed {
            title: "t".to_string(),
            description: String::new(),
            color: 1,
            image: Some(EmbedImage {
                url: "https://example.com/a.jpg".to_string(),
            }),
        };
        let payload = embed_payload(&embed);
        assert_eq!(payload["embeds"][0]["image"]["url"], "https://example.com/a.jpg");
    }

    #[test]
    fn test_attachment_payload() {
        let payload = attachment_payload("relay-1.mp4");
        assert_eq!(payload["attachments"][0]["id"], 0);
        assert_eq!(payload["attachments"][0]["filename"], "relay-1.mp4");
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(
            parse_retry_after(r#"{"message": "You are being rate limited.", "retry_after": 1.5, "global": false}"#),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(parse_retry_after(r#"{"retry_after": 3600}"#), None);
        assert_eq!(parse_retry_after(r#"{"retry_after": -1}"#), None);
        assert_eq!(parse_retry_after("not json"), None);
    }

    #[test]
    fn test_urls() {
        let client = DiscordClient::new(&DiscordConfig {
            bot_token: "tok".to_string(),
            api_url: "https://discord.com/api/v10/".to_string(),
            channel_id: 99,
            embed_title: "t".to_string(),
            embed_color: 0,
            max_upload_bytes: 1,
        })
        .unwrap();
        assert_eq!(client.url("/channels/99"), "https://discord.com/api/v10/channels/99");
        assert_eq!(client.authorization(), "Bot tok");
    }
}
