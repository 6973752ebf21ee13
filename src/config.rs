use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationProvider {
    #[default]
    Google,
    None,
}

impl std::fmt::Display for TranslationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranslationProvider::Google => write!(f, "google"),
            TranslationProvider::None => write!(f, "none"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_telegram_config")]
    pub telegram: TelegramConfig,
    #[serde(default = "default_discord_config")]
    pub discord: DiscordConfig,
    #[serde(default = "default_translation_config")]
    pub translation: TranslationConfig,
    #[serde(default = "default_media_config")]
    pub media: MediaConfig,
    #[serde(default = "default_relay_config")]
    pub relay: RelayConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    /// Usually supplied through TELEGRAM_BOT_TOKEN instead of the file
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_telegram_api_url")]
    pub api_url: String,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    /// Only relay posts from this chat when set (e.g. -1002462623914)
    #[serde(default)]
    pub source_chat_id: Option<i64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscordConfig {
    /// Usually supplied through DISCORD_BOT_TOKEN instead of the file
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_discord_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub channel_id: u64,
    #[serde(default = "default_embed_title")]
    pub embed_title: String,
    #[serde(default = "default_embed_color")]
    pub embed_color: u32,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TranslationConfig {
    #[serde(default)]
    pub provider: TranslationProvider,
    #[serde(default = "default_source_language")]
    pub source: String,
    #[serde(default = "default_target_language")]
    pub target: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MediaConfig {
    /// Path or name of the yt-dlp executable
    #[serde(default = "default_downloader")]
    pub downloader: PathBuf,
    #[serde(default = "default_video_format")]
    pub format: String,
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelayConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_send_delay_ms")]
    pub send_delay_ms: u64,
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,
}

impl RelayConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout_secs() -> u64 {
    10
}

fn default_discord_api_url() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_embed_title() -> String {
    "Nuevo mensaje de OFFSIDES ⚽".to_string()
}

fn default_embed_color() -> u32 {
    0x3498db
}

fn default_max_upload_bytes() -> u64 {
    25 * 1024 * 1024
}

fn default_source_language() -> String {
    "auto".to_string()
}

fn default_target_language() -> String {
    "es".to_string()
}

fn default_downloader() -> PathBuf {
    PathBuf::from("yt-dlp")
}

fn default_video_format() -> String {
    "best[height<=720][ext=mp4]/best[height<=720]/best".to_string()
}

fn default_download_dir() -> PathBuf {
    std::env::temp_dir().join("relaybot")
}

fn default_interval_secs() -> u64 {
    30
}

fn default_send_delay_ms() -> u64 {
    1000
}

fn default_error_backoff_secs() -> u64 {
    5
}

fn default_telegram_config() -> TelegramConfig {
    TelegramConfig {
        bot_token: String::new(),
        api_url: default_telegram_api_url(),
        poll_timeout_secs: default_poll_timeout_secs(),
        source_chat_id: None,
    }
}

fn default_discord_config() -> DiscordConfig {
    DiscordConfig {
        bot_token: String::new(),
        api_url: default_discord_api_url(),
        channel_id: 0,
        embed_title: default_embed_title(),
        embed_color: default_embed_color(),
        max_upload_bytes: default_max_upload_bytes(),
    }
}

fn default_translation_config() -> TranslationConfig {
    TranslationConfig {
        provider: TranslationProvider::default(),
        source: default_source_language(),
        target: default_target_language(),
    }
}

fn default_media_config() -> MediaConfig {
    MediaConfig {
        downloader: default_downloader(),
        format: default_video_format(),
        download_dir: default_download_dir(),
    }
}

fn default_relay_config() -> RelayConfig {
    RelayConfig {
        interval_secs: default_interval_secs(),
        send_delay_ms: default_send_delay_ms(),
        error_backoff_secs: default_error_backoff_secs(),
    }
}

impl Config {
    /// Load the TOML file at `path` (all defaults when it does not exist),
    /// then apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let content = if path.exists() {
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?
        } else {
            String::new()
        };

        let config = Self::from_toml_str(&content, |key| std::env::var(key).ok())?;

        if !config.media.download_dir.exists() {
            std::fs::create_dir_all(&config.media.download_dir).with_context(|| {
                format!(
                    "Failed to create download directory: {}",
                    config.media.download_dir.display()
                )
            })?;
        }

        Ok(config)
    }

    /// Parse, overlay values from `env`, and validate.
    pub fn from_toml_str<F>(content: &str, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Config =
            toml::from_str(content).context("Failed to parse config file")?;
        config.apply_env(env)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env<F>(&mut self, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(token) = non_empty("DISCORD_BOT_TOKEN") {
            self.discord.bot_token = token;
        }
        if let Some(id) = non_empty("DISCORD_CHANNEL_ID") {
            self.discord.channel_id = id
                .trim()
                .parse()
                .with_context(|| format!("DISCORD_CHANNEL_ID is not a valid id: {}", id))?;
        }
        if let Some(id) = non_empty("TELEGRAM_CHAT_ID") {
            self.telegram.source_chat_id = Some(
                id.trim()
                    .parse()
                    .with_context(|| format!("TELEGRAM_CHAT_ID is not a valid id: {}", id))?,
            );
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            anyhow::bail!("Telegram bot token missing: set TELEGRAM_BOT_TOKEN or [telegram] bot_token");
        }
        if self.discord.bot_token.trim().is_empty() {
            anyhow::bail!("Discord bot token missing: set DISCORD_BOT_TOKEN or [discord] bot_token");
        }
        if self.discord.channel_id == 0 {
            anyhow::bail!("Discord channel id missing: set DISCORD_CHANNEL_ID or [discord] channel_id");
        }
        if self.relay.interval_secs == 0 {
            anyhow::bail!("[relay] interval_secs must be greater than zero");
        }
        Ok(())
    }
}
