use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use tokio::io;
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{watch, Mutex};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::auth::AuthClient;
use crate::error::SessionError;

/// Lifecycle of the decoder subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Stopped,
    Starting,
    Running,
}

/// Spawn parameters for the decoder binary.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub binary: String,
    /// Display name the process registers under with the provider; the
    /// reconciler matches devices on it.
    pub device_name: String,
    pub bitrate: u32,
    pub initial_volume: u8,
    pub volume_normalisation: bool,
}

/// Supervises the external decoder subprocess (librespot with the pipe
/// backend): at most one instance exists at a time, started with a fresh
/// access token and terminated on stop or credential rotation.
///
/// The audio contract is deliberately thin: stdout is a byte stream safe
/// to pipe into a PCM-expecting consumer; sample rate and channel count
/// are agreed out-of-band with the voice-output side.
#[derive(Clone)]
pub struct PlayerSupervisor {
    config: Arc<PlayerConfig>,
    child: Arc<Mutex<Option<Child>>>,
    state_tx: Arc<watch::Sender<PlayerState>>,
    state_rx: watch::Receiver<PlayerState>,
}

impl PlayerSupervisor {
    pub fn new(config: PlayerConfig) -> Self {
        let (state_tx, state_rx) = watch::channel(PlayerState::Stopped);
        Self {
            config: Arc::new(config),
            child: Arc::new(Mutex::new(None)),
            state_tx: Arc::new(state_tx),
            state_rx,
        }
    }

    pub fn state(&self) -> PlayerState {
        *self.state_rx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == PlayerState::Running
    }

    /// Spawn the decoder with the given access token. A second call while
    /// a process handle exists is a no-op; the process is handed its token
    /// at spawn time and cannot rotate it afterwards.
    ///
    /// Readiness (the process registering itself as a playback device) is
    /// observed externally via the reconciler's poll, not here.
    pub async fn start(&self, access_token: &str) -> Result<(), SessionError> {
        let mut guard = self.child.lock().await;
        if guard.is_some() {
            debug!("Decoder already running, start is a no-op");
            return Ok(());
        }

        let _ = self.state_tx.send(PlayerState::Starting);

        let mut cmd = Command::new(&self.config.binary);
        cmd.arg("--name")
            .arg(&self.config.device_name)
            .arg("--backend")
            .arg("pipe")
            .arg("--bitrate")
            .arg(self.config.bitrate.to_string())
            .arg("--access-token")
            .arg(access_token)
            .arg("--initial-volume")
            .arg(self.config.initial_volume.to_string());
        if self.config.volume_normalisation {
            cmd.arg("--enable-volume-normalisation");
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(error = %e, binary = %self.config.binary, "Failed to spawn decoder");
                let _ = self.state_tx.send(PlayerState::Stopped);
                return Err(e.into());
            }
        };

        info!(pid = ?child.id(), name = %self.config.device_name, "Decoder process spawned");
        *guard = Some(child);
        let _ = self.state_tx.send(PlayerState::Running);
        Ok(())
    }

    /// Terminate the decoder if present. Safe from any state, including
    /// while a readiness poll on the device list is still in flight: the
    /// published `Stopped` state unblocks anything waiting on it.
    pub async fn stop(&self) {
        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            info!(pid = ?child.id(), "Terminating decoder process");
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Decoder did not terminate cleanly");
            }
        }
        let _ = self.state_tx.send(PlayerState::Stopped);
    }

    /// Take the raw stdout handle for piping into the voice collaborator.
    /// Can only be taken once per spawned process.
    pub async fn take_stdout(&self) -> Option<ChildStdout> {
        let mut guard = self.child.lock().await;
        guard.as_mut().and_then(|child| child.stdout.take())
    }

    /// The decoder's output as a byte stream.
    pub async fn audio_stream(
        &self,
    ) -> Option<impl Stream<Item = io::Result<Bytes>> + Send + Unpin> {
        self.take_stdout()
            .await
            .map(tokio_util::io::ReaderStream::new)
    }

    /// Completes when the supervisor reaches `Stopped`. Used to cancel
    /// work that only makes sense while the decoder lives.
    pub async fn wait_stopped(&self) {
        let mut rx = self.state_rx.clone();
        let _ = rx.wait_for(|state| *state == PlayerState::Stopped).await;
    }

    /// Background rotation loop: the decoder holds its token for the spawn
    /// lifetime, so just under the provider's token lifetime the process is
    /// stopped and restarted with a fresh one. The restart audibly
    /// interrupts playback; that is an accepted tradeoff of handing the
    /// token over at spawn time.
    pub async fn credential_rotation(self, auth: Arc<AuthClient>, interval: Duration) {
        info!(?interval, "Credential rotation task started");
        loop {
            // The shutdown signal is the supervisor's own published state:
            // level-triggered, so a stop that predates this task (or one
            // consumed by a crashed predecessor) can never strand it.
            tokio::select! {
                biased;
                _ = self.wait_stopped() => {
                    info!("Rotation task stopping, decoder was shut down");
                    break;
                }
                _ = sleep(interval) => {}
            }

            if !self.is_running() {
                break;
            }

            info!("Rotating decoder credential (restart interrupts playback briefly)");
            self.stop().await;
            match auth.current_credential().await {
                Ok(cred) => {
                    if let Err(e) = self.start(&cred.access_token).await {
                        error!(error = %e, "Failed to restart decoder after rotation");
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to obtain a fresh token for rotation");
                    break;
                }
            }
        }
        info!("Credential rotation task finished");
    }
}

impl std::fmt::Debug for PlayerSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerSupervisor")
            .field("binary", &self.config.binary)
            .field("device_name", &self.config.device_name)
            .field("state", &self.state())
            .finish()
    }
}
