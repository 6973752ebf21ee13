mod config;
mod error;
mod media;
mod platform;
mod publisher;
mod relay;
#[cfg(test)]
mod testing;
mod translate;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::media::{MediaResolver, YtDlp};
use crate::platform::discord::DiscordClient;
use crate::platform::telegram::TelegramClient;
use crate::platform::Destination;
use crate::publisher::Publisher;
use crate::relay::{RelayLoop, RelaySettings};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,relaybot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    if config_path.exists() {
        info!("Loading configuration from: {}", config_path.display());
    } else {
        warn!(
            "{} not found, using defaults and environment",
            config_path.display()
        );
    }
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Discord channel: {}", config.discord.channel_id);
    info!("  Source chat filter: {:?}", config.telegram.source_chat_id);
    info!(
        "  Translation: {} ({} -> {})",
        config.translation.provider, config.translation.source, config.translation.target
    );
    info!("  Downloads: {}", config.media.download_dir.display());
    info!("  Interval: {}s", config.relay.interval_secs);

    // Build clients
    let telegram = Arc::new(
        TelegramClient::new(&config.telegram).context("Failed to build Telegram client")?,
    );
    let discord =
        Arc::new(DiscordClient::new(&config.discord).context("Failed to build Discord client")?);
    let translator =
        translate::from_config(&config.translation).context("Failed to build translator")?;

    // The loop starts only once the destination accepts our credentials
    let bot_name = discord
        .ready()
        .await
        .context("Discord rejected the bot token")?;
    info!("Discord bot connected as {}", bot_name);

    let resolver = MediaResolver::new(
        telegram.clone(),
        Arc::new(YtDlp::new(&config.media)),
        config.media.download_dir.clone(),
    );
    let publisher = Publisher::new(discord, &config.discord);
    let relay = RelayLoop::new(
        telegram,
        translator,
        resolver,
        publisher,
        RelaySettings::from_config(&config),
    );

    tokio::select! {
        _ = relay.run() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutdown requested, stopping relay");
        }
    }

    Ok(())
}
