pub mod cursor;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::PublishError;
use crate::media::MediaResolver;
use crate::platform::{ChannelHandle, RelayMessage, SourceUpdate, UpdateSource};
use crate::publisher::Publisher;
use crate::translate::{translate_or_passthrough, Translate};

pub use cursor::UpdateCursor;

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub interval: Duration,
    /// Pause between consecutive sends within a tick
    pub send_delay: Duration,
    /// Pause after a tick that hit an error
    pub error_backoff: Duration,
    pub source_chat_id: Option<i64>,
}

impl RelaySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.relay.interval(),
            send_delay: config.relay.send_delay(),
            error_backoff: config.relay.error_backoff(),
            source_chat_id: config.telegram.source_chat_id,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    pub updates: usize,
    pub relayed: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Completed(TickStats),
    /// Destination channel could not be looked up; nothing was fetched
    ChannelUnavailable,
    /// Source fetch failed; the cursor did not move
    FetchFailed,
}

impl TickOutcome {
    /// True when the tick failed outright or every send in it failed
    pub fn needs_backoff(&self) -> bool {
        match self {
            TickOutcome::Completed(stats) => stats.failed > 0 && stats.relayed == 0,
            TickOutcome::ChannelUnavailable | TickOutcome::FetchFailed => true,
        }
    }
}

/// Owns the cursor and every component; the only writer of relay state.
pub struct RelayLoop {
    source: Arc<dyn UpdateSource>,
    translator: Box<dyn Translate>,
    resolver: MediaResolver,
    publisher: Publisher,
    cursor: UpdateCursor,
    settings: RelaySettings,
}

impl RelayLoop {
    pub fn new(
        source: Arc<dyn UpdateSource>,
        translator: Box<dyn Translate>,
        resolver: MediaResolver,
        publisher: Publisher,
        settings: RelaySettings,
    ) -> Self {
        Self {
            source,
            translator,
            resolver,
            publisher,
            cursor: UpdateCursor::new(),
            settings,
        }
    }

    pub fn cursor(&self) -> UpdateCursor {
        self.cursor
    }

    /// Tick forever. Ticks run back to back in this task, so one never
    /// starts before the previous one finished.
    pub async fn run(mut self) {
        info!(
            "Relay loop started: every {:?}, {:?} between sends",
            self.settings.interval, self.settings.send_delay
        );

        let mut interval = tokio::time::interval(self.settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let outcome = self.tick().await;
            if let TickOutcome::Completed(stats) = outcome {
                if stats.updates > 0 {
                    info!(
                        "Tick done: {} update(s), {} relayed, {} failed, {} skipped (cursor {:?})",
                        stats.updates,
                        stats.relayed,
                        stats.failed,
                        stats.skipped,
                        self.cursor().last_seen_id()
                    );
                }
            }

            if outcome.needs_backoff() {
                debug!("Backing off for {:?}", self.settings.error_backoff);
                sleep(self.settings.error_backoff).await;
            }
        }
    }

    /// One fetch-translate-resolve-publish cycle.
    pub async fn tick(&mut self) -> TickOutcome {
        let channel = match self.publisher.resolve_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                error!("Destination channel unavailable, skipping tick: {}", e);
                return TickOutcome::ChannelUnavailable;
            }
        };

        let updates = match self.source.fetch(self.cursor.next_offset()).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!("Failed to fetch updates: {}", e);
                return TickOutcome::FetchFailed;
            }
        };

        let mut stats = TickStats {
            updates: updates.len(),
            ..Default::default()
        };
        let mut attempted = false;

        for update in updates {
            // Acknowledge before processing so a bad message is never redelivered
            self.cursor.advance(update.update_id);

            let update_id = update.update_id;
            let message = match self.accept(update) {
                Some(message) => message,
                None => {
                    stats.skipped += 1;
                    continue;
                }
            };

            if attempted && !self.settings.send_delay.is_zero() {
                sleep(self.settings.send_delay).await;
            }
            attempted = true;

            match self.relay_message(&channel, &message).await {
                Ok(()) => stats.relayed += 1,
                Err(e) => {
                    stats.failed += 1;
                    error!("Failed to relay update {}: {}", update_id, e);
                }
            }
        }

        TickOutcome::Completed(stats)
    }

    /// The message to relay for `update`, or None when it should be skipped
    fn accept(&self, update: SourceUpdate) -> Option<RelayMessage> {
        let message = match update.message {
            Some(message) => message,
            None => {
                debug!("Update {} carries no message", update.update_id);
                return None;
            }
        };

        if let Some(expected) = self.settings.source_chat_id {
            if update.chat_id != Some(expected) {
                debug!(
                    "Update {} is from chat {:?}, not {}",
                    update.update_id, update.chat_id, expected
                );
                return None;
            }
        }

        Some(message)
    }

    async fn relay_message(
        &self,
        channel: &ChannelHandle,
        message: &RelayMessage,
    ) -> Result<(), PublishError> {
        info!(
            "Relaying message ({} chars, media: {})",
            message.text.chars().count(),
            message
                .media
                .as_ref()
                .map(|m| m.kind.to_string())
                .unwrap_or_else(|| "none".to_string())
        );

        let text = translate_or_passthrough(self.translator.as_ref(), &message.text).await;

        let media = match &message.media {
            Some(media) => match self.resolver.resolve(media).await {
                Ok(resolved) => Some(resolved),
                Err(e) => {
                    warn!("Could not resolve {}, sending text only: {}", media.kind, e);
                    None
                }
            },
            None => None,
        };

        self.publisher.send(channel, &text, media).await
    }
}
