use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info};

use crate::client::PlaybackClient;
use crate::error::SessionError;

/// Decides which physical device is authoritative and routes remote
/// playback to the bot's own virtual output device.
///
/// Device lists are fetched fresh for every decision; nothing here is
/// cached across calls.
pub struct DeviceReconciler {
    client: Arc<PlaybackClient>,
    device_name: String,
    poll_interval: Duration,
    poll_attempts: u32,
}

impl DeviceReconciler {
    pub fn new(
        client: Arc<PlaybackClient>,
        device_name: &str,
        poll_interval: Duration,
        poll_attempts: u32,
    ) -> Self {
        Self {
            client,
            device_name: device_name.to_string(),
            poll_interval,
            poll_attempts,
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Id of the device registered under the bot's configured name, or
    /// `None` when the decoder has not registered itself yet. Absence is
    /// an expected state, not an error.
    pub async fn bot_device_id(&self) -> Result<Option<String>, SessionError> {
        let devices = self.client.devices().await?;
        let id = devices
            .into_iter()
            .find(|d| d.name == self.device_name)
            .map(|d| d.id);
        if let Some(ref id) = id {
            debug!(%id, "Found bot device");
        }
        Ok(id)
    }

    /// Make the bot device the active playback target.
    ///
    /// Checks first and no-ops when the bot is already active: a redundant
    /// transfer interrupts audio. The check-then-act is racy against
    /// concurrent external changes, accepted under the single-writer
    /// assumption of one controller per account session.
    pub async fn switch_to_device(&self) -> Result<(), SessionError> {
        let devices = self.client.devices().await?;
        let bot = devices
            .into_iter()
            .find(|d| d.name == self.device_name)
            .ok_or_else(|| SessionError::DeviceNotRegistered(self.device_name.clone()))?;

        if bot.is_active {
            debug!("Bot is already the active device, skipping transfer");
            return Ok(());
        }

        self.client.transfer_playback(&bot.id).await
    }

    /// Poll for the decoder's device registration in fixed steps up to a
    /// bounded ceiling. Never loops forever: after the last attempt the
    /// caller gets `DecoderTimeout` and must explicitly restart.
    pub async fn wait_for_registration(&self) -> Result<String, SessionError> {
        for attempt in 0..self.poll_attempts {
            if let Some(id) = self.bot_device_id().await? {
                info!(%id, attempt, "Decoder registered as a playback device");
                return Ok(id);
            }
            // No sleep after the last attempt; the timeout is reported as
            // soon as it is known.
            if attempt + 1 < self.poll_attempts {
                sleep(self.poll_interval).await;
            }
        }
        Err(SessionError::DecoderTimeout)
    }
}
