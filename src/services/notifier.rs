// src/services/notifier.rs

//! Outgoing notifications for newly seen listings.
//!
//! The transport itself lives behind [`Notifier`]; [`Dispatcher`] owns the
//! pacing between sends and the cancellation checkpoints.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{NotifyConfig, Record};
use crate::utils::retry::Pause;

/// A messaging channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one listing with its rendered caption.
    async fn send_record(&self, destination: &str, record: &Record, caption: &str) -> Result<()>;

    /// Deliver a plain text message.
    async fn send_text(&self, destination: &str, text: &str) -> Result<()>;
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_record(&self, destination: &str, record: &Record, caption: &str) -> Result<()> {
        if record.has_image() {
            log::info!("[Notify] → {} [{}]\n{}", destination, record.image, caption);
        } else {
            log::info!("[Notify] → {}\n{}", destination, caption);
        }
        Ok(())
    }

    async fn send_text(&self, destination: &str, text: &str) -> Result<()> {
        log::info!("[Notify] → {}: {}", destination, text);
        Ok(())
    }
}

/// What a dispatch run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub sent: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Sends listings one by one with a pause in between.
pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    pause: Arc<dyn Pause>,
    config: NotifyConfig,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, pause: Arc<dyn Pause>, config: NotifyConfig) -> Self {
        Self {
            notifier,
            pause,
            config,
        }
    }

    /// Send every record, then a closing count.
    ///
    /// The token is checked before each record; a record already being sent
    /// is always finished. Failed sends are logged and skipped. No count is
    /// sent after a cancellation.
    pub async fn dispatch(
        &self,
        destination: &str,
        records: &[Record],
        cancel: &CancellationToken,
    ) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        for (i, record) in records.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }

            let caption = record.format(&self.config.caption);
            match self.notifier.send_record(destination, record, &caption).await {
                Ok(()) => outcome.sent += 1,
                Err(e) => {
                    outcome.failed += 1;
                    log::warn!(
                        "[Notify] Failed to send listing {} to {}: {}",
                        record.identity,
                        destination,
                        e
                    );
                }
            }

            if i + 1 < records.len() {
                self.pause.pause(self.config.pace()).await;
            }
        }

        if cancel.is_cancelled() {
            outcome.cancelled = true;
            log::info!(
                "[Notify] Cancelled for {} after {} of {} listings",
                destination,
                outcome.sent + outcome.failed,
                records.len()
            );
            self.send_text(destination, "Sending cancelled.").await;
        } else if self.config.summary {
            let text = if records.is_empty() {
                "No new listings found.".to_string()
            } else {
                format!("New listings: {}", records.len())
            };
            self.send_text(destination, &text).await;
        }

        outcome
    }

    /// Tell `destination` that a check failed. Best effort: a failed send
    /// is only logged.
    pub async fn report_failure(&self, destination: &str, error: &AppError) {
        self.send_text(destination, &format!("Check failed: {}", error)).await;
    }

    async fn send_text(&self, destination: &str, text: &str) {
        if let Err(e) = self.notifier.send_text(destination, text).await {
            log::warn!("[Notify] Failed to send message to {}: {}", destination, e);
        }
    }
}
