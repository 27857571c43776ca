//! Throttled channel name/topic updater.
//!
//! Discord allows only a couple of channel renames per ten minutes, so
//! refresh requests are coalesced into a single pending slot and the worker
//! sleeps for a fixed interval after every update cycle.

use std::sync::Arc;
use std::time::Duration;

use serenity::model::id::ChannelId;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bridge::pool::ChannelResource;
use crate::bridge::status::ChannelStatusProvider;
use crate::common::error::DiscordError;
use crate::common::types::ServerId;
use crate::discord::transport::ChatTransport;
use crate::game::ServerLookup;

/// Why an update cycle did not complete.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The edit request ran past its deadline. Retried after the next throttle window.
    #[error("channel update timed out after {0:?}")]
    Timeout(Duration),

    /// Discord rejected or failed the request. Not retried.
    #[error("channel update failed: {0}")]
    Transport(#[from] DiscordError),
}

/// Everything an updater needs to run its cycles.
#[derive(Clone)]
pub struct UpdaterSettings {
    pub lookup: Arc<dyn ServerLookup>,
    pub transport: Arc<dyn ChatTransport>,
    pub provider: Arc<ChannelStatusProvider>,
    pub throttle: Duration,
    pub request_timeout: Duration,
}

/// Handle to the status updater of one server-mapped channel.
pub struct ChannelStatusUpdater {
    channel_id: ChannelId,
    signal: mpsc::Sender<()>,
    closed: CancellationToken,
}

impl ChannelStatusUpdater {
    /// Create the updater and spawn its worker task.
    pub fn spawn(server_id: ServerId, channel_id: ChannelId, settings: UpdaterSettings) -> Self {
        let (signal, signals) = mpsc::channel(1);
        let closed = CancellationToken::new();

        let worker = Worker {
            server_id,
            channel_id,
            settings,
            signal: signal.clone(),
            signals,
            closed: closed.clone(),
        };
        tokio::spawn(worker.run());
        debug!(channel_id = %channel_id, "Channel status updater started");

        Self {
            channel_id,
            signal,
            closed,
        }
    }

    /// Request a refresh. Never blocks; coalesces with a pending request.
    pub fn schedule_update(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        match self.signal.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Closed(())) => {
                debug!(channel_id = %self.channel_id, "Updater already stopped");
            }
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl ChannelResource for ChannelStatusUpdater {
    fn dispose(&self) {
        if !self.closed.is_cancelled() {
            self.closed.cancel();
            debug!(channel_id = %self.channel_id, "Channel status updater disposed");
        }
    }
}

struct Worker {
    server_id: ServerId,
    channel_id: ChannelId,
    settings: UpdaterSettings,
    /// Used to re-arm the slot after a timeout.
    signal: mpsc::Sender<()>,
    signals: mpsc::Receiver<()>,
    closed: CancellationToken,
}

impl Worker {
    async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.closed.cancelled() => break,
                signal = self.signals.recv() => {
                    if signal.is_none() {
                        break;
                    }
                }
            }

            // Requests that arrived meanwhile are served by this cycle
            while self.signals.try_recv().is_ok() {}

            match self.update().await {
                Ok(()) => {}
                Err(UpdateError::Timeout(limit)) => {
                    warn!(
                        channel_id = %self.channel_id,
                        server_id = %self.server_id,
                        "Channel update timed out after {:?}, retrying after throttle",
                        limit
                    );
                    let _ = self.signal.try_send(());
                }
                Err(e @ UpdateError::Transport(_)) => {
                    error!(
                        channel_id = %self.channel_id,
                        server_id = %self.server_id,
                        "{}",
                        e
                    );
                }
            }

            tokio::select! {
                _ = self.closed.cancelled() => break,
                _ = tokio::time::sleep(self.settings.throttle) => {}
            }
        }

        debug!(channel_id = %self.channel_id, "Channel status updater exited");
    }

    /// One update cycle: snapshot, compute, edit.
    async fn update(&self) -> Result<(), UpdateError> {
        let Some(snapshot) = self.settings.lookup.snapshot(&self.server_id).await else {
            debug!(server_id = %self.server_id, "No live state for server, skipping update");
            return Ok(());
        };

        let status = self.settings.provider.status(&snapshot);
        if status.is_empty() {
            return Ok(());
        }

        let limit = self.settings.request_timeout;
        match tokio::time::timeout(
            limit,
            self.settings.transport.edit_channel(self.channel_id, &status),
        )
        .await
        {
            Ok(result) => {
                result?;
                info!(
                    channel_id = %self.channel_id,
                    name = ?status.name,
                    "Updated channel name and topic"
                );
                Ok(())
            }
            Err(_) => Err(UpdateError::Timeout(limit)),
        }
    }
}
