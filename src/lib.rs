//! A Rust client for driving a premium Spotify account from a chat bot.
//!
//! The crate wires four collaborators into one session facade:
//!
//! - [`AuthClient`]: fetches the stored token pair from a small auth
//!   backend, probes it against the provider and refreshes it lazily.
//! - [`PlaybackClient`]: stateless calls against the provider's player
//!   API (search, queue, skip, volume, devices).
//! - [`PlayerSupervisor`]: spawns and supervises the librespot decoder
//!   subprocess whose stdout carries the raw audio bytes.
//! - [`DeviceReconciler`]: waits for the decoder to register itself as a
//!   playback device and routes playback to it.
//!
//! ## Basic usage
//!
//! ```rust,no_run
//! use spotify_remote_rs::{SpotifySession, SessionError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SessionError> {
//!     // Settings come from the environment (see Settings::from_env).
//!     let session = SpotifySession::from_env();
//!
//!     // Spawn the decoder, wait for it to register, route playback to it.
//!     session.prepare_for_playback().await?;
//!
//!     // Search-or-link enqueue; returns what was queued.
//!     let queued = session.enqueue_and_play("bohemian rhapsody").await?;
//!     println!("now playing: {}", queued.display_str());
//!
//!     // Raw audio bytes for the voice side.
//!     let _audio = session.audio_stream().await;
//!
//!     session.stop_playback().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Logging
//!
//! The crate logs through [`tracing`]; install a subscriber to see it:
//!
//! ```rust
//! tracing_subscriber::fmt()
//!     .with_env_filter("spotify_remote_rs=debug")
//!     .init();
//! ```

pub mod auth;
pub mod client;
pub mod device;
pub mod error;
pub mod models;
pub mod player;
pub mod settings;
pub mod utils;

pub use auth::AuthClient;
pub use client::{PlaybackClient, SearchResults, SearchType, SkipDirection, DEFAULT_API_BASE};
pub use device::DeviceReconciler;
pub use error::SessionError;
pub use models::{
    Artist, ArtistKind, Collection, CollectionKind, Credential, Device, MediaKind, Queueable,
};
pub use player::{PlayerConfig, PlayerState, PlayerSupervisor};
pub use settings::{Settings, SETTINGS};
pub use utils::{format_duration, parse_play_uri};

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Scopes requested when a user authorizes the bot against their account.
const AUTHORIZE_SCOPE: &str =
    "streaming user-read-email user-read-private user-read-playback-state";

/// The session facade: one logged-in account, one decoder process, one
/// active playback device.
///
/// All chat-facing operations go through here; the collaborators stay
/// accessible for callers that need lower-level control.
pub struct SpotifySession {
    settings: Settings,
    auth: Arc<AuthClient>,
    client: Arc<PlaybackClient>,
    reconciler: DeviceReconciler,
    player: PlayerSupervisor,
    rotation_task: RwLock<Option<JoinHandle<()>>>,
}

impl SpotifySession {
    /// Create a session from explicit settings. Pass an existing HTTP
    /// client to share a connection pool; otherwise one is built with
    /// long-lived keepalive suited to a chat bot's bursty traffic.
    pub fn new(settings: Settings, http: Option<Arc<Client>>) -> Self {
        let http = http.unwrap_or_else(|| {
            Arc::new(
                Client::builder()
                    .pool_idle_timeout(Duration::from_secs(600))
                    .pool_max_idle_per_host(4)
                    .timeout(settings.request_timeout)
                    .build()
                    .unwrap_or_default(),
            )
        });

        let auth = Arc::new(AuthClient::new(
            Arc::clone(&http),
            &settings.auth_base_url,
            &settings.auth_state,
            &settings.api_base,
        ));
        let client = Arc::new(PlaybackClient::new(
            Arc::clone(&http),
            &settings.api_base,
            Arc::clone(&auth),
            settings.collection_page_size,
        ));
        let reconciler = DeviceReconciler::new(
            Arc::clone(&client),
            &settings.device_name,
            settings.device_poll_interval,
            settings.device_poll_attempts,
        );
        let player = PlayerSupervisor::new(PlayerConfig {
            binary: settings.librespot_binary.clone(),
            device_name: settings.device_name.clone(),
            bitrate: settings.bitrate,
            initial_volume: settings.initial_volume,
            volume_normalisation: settings.volume_normalisation,
        });

        Self {
            settings,
            auth,
            client,
            reconciler,
            player,
            rotation_task: RwLock::new(None),
        }
    }

    /// Create a session from environment settings.
    pub fn from_env() -> Self {
        Self::new(Settings::from_env(), None)
    }

    /// Spawn the decoder with a fresh token, wait for it to register as a
    /// playback device and route playback to it. Idempotent: a decoder
    /// that is already running and registered is left alone.
    ///
    /// The registration wait is raced against the supervisor's state so a
    /// concurrent [`stop_playback`](Self::stop_playback) unblocks it with
    /// `DecoderTimeout` instead of letting it poll into the void.
    pub async fn prepare_for_playback(&self) -> Result<(), SessionError> {
        let cred = self.auth.current_credential().await?;
        self.player.start(&cred.access_token).await?;
        self.spawn_rotation_task().await;

        let registered = tokio::select! {
            result = self.reconciler.wait_for_registration() => result,
            _ = self.player.wait_stopped() => Err(SessionError::DecoderTimeout),
        };
        let device_id = registered?;
        debug!(%device_id, "Decoder ready, routing playback");

        self.client
            .with_reauth(|| self.reconciler.switch_to_device())
            .await
    }

    /// Resolve a query to one playable item, append it to the queue, make
    /// sure the bot device is active and resume if nothing is playing.
    /// Direct track/episode links (`spotify:` URIs or `open.spotify.com`
    /// URLs) are looked up verbatim; anything else is a catalog search
    /// whose first track-then-episode hit wins.
    pub async fn enqueue_and_play(&self, query: &str) -> Result<Queueable, SessionError> {
        let item = match parse_play_uri(query) {
            Some(uri) => self.client.with_reauth(|| self.client.lookup(&uri)).await?,
            None => {
                let results = self
                    .client
                    .with_reauth(|| self.client.search(query, &["track", "episode"], 5))
                    .await?;
                results
                    .first_queueable()
                    .cloned()
                    .ok_or_else(|| SessionError::NoMatches(query.to_string()))?
            }
        };

        info!(uri = %item.uri, "Queueing {}", item.kind.as_str());
        self.client
            .with_reauth(|| self.client.add_to_queue(&item.uri))
            .await?;
        self.client
            .with_reauth(|| self.reconciler.switch_to_device())
            .await?;
        if !self.client.with_reauth(|| self.client.is_playing()).await? {
            self.client.with_reauth(|| self.client.play()).await?;
        }
        Ok(item)
    }

    /// Search the catalog for the given entity classes.
    pub async fn search(
        &self,
        query: &str,
        types: &[&str],
        limit: u8,
    ) -> Result<SearchResults, SessionError> {
        self.client
            .with_reauth(|| self.client.search(query, types, limit))
            .await
    }

    /// The item the account is playing right now.
    ///
    /// Fails with `NothingPlaying` when there is no active item, and with
    /// `UnrecognizedMediaShape` when the provider reports a type this
    /// controller cannot represent (ads, unknown future kinds).
    pub async fn currently_playing(&self) -> Result<Queueable, SessionError> {
        let payload = self
            .client
            .with_reauth(|| self.client.currently_playing_payload())
            .await?
            .ok_or(SessionError::NothingPlaying)?;

        match payload.get("currently_playing_type").and_then(Value::as_str) {
            Some("track") | Some("episode") | None => {}
            Some(other) => {
                warn!(kind = %other, "Active item is not a playable media object");
                return Err(SessionError::UnrecognizedMediaShape(other.to_string()));
            }
        }

        let item = match payload.get("item") {
            Some(item) if !item.is_null() => item,
            _ => return Err(SessionError::NothingPlaying),
        };
        Queueable::from_value(item)
    }

    /// A bounded snapshot of what plays next, at most
    /// `queue_preview_count` items. Empty when nothing is queued.
    pub async fn upcoming_queue(&self) -> Result<Vec<Queueable>, SessionError> {
        let payload = self
            .client
            .with_reauth(|| self.client.queue_payload())
            .await?;
        let items = payload
            .get("queue")
            .and_then(Value::as_array)
            .ok_or_else(|| SessionError::missing("queue", "player queue"))?;

        items
            .iter()
            .filter(|v| !v.is_null())
            .take(self.settings.queue_preview_count)
            .map(Queueable::from_value)
            .collect()
    }

    /// Drain the upcoming queue by skipping once per queued item. The
    /// currently playing item keeps playing. Returns how many items were
    /// cleared.
    pub async fn clear_queue(&self) -> Result<usize, SessionError> {
        let payload = self
            .client
            .with_reauth(|| self.client.queue_payload())
            .await?;
        let count = payload
            .get("queue")
            .and_then(Value::as_array)
            .map(|q| q.iter().filter(|v| !v.is_null()).count())
            .unwrap_or(0);

        info!(count, "Clearing queue");
        for _ in 0..count {
            self.client
                .with_reauth(|| self.client.skip(SkipDirection::Next.as_str()))
                .await?;
        }
        Ok(count)
    }

    /// Pause playback on the active device.
    pub async fn pause(&self) -> Result<(), SessionError> {
        self.client.with_reauth(|| self.client.pause()).await
    }

    /// Resume playback on the active device.
    pub async fn resume(&self) -> Result<(), SessionError> {
        self.client.with_reauth(|| self.client.play()).await
    }

    /// Skip forward (`"next"`) or back (`"previous"`).
    pub async fn skip(&self, direction: &str) -> Result<(), SessionError> {
        self.client
            .with_reauth(|| self.client.skip(direction))
            .await
    }

    /// Set playback volume, 0..=100.
    pub async fn set_volume(&self, percent: u8) -> Result<(), SessionError> {
        self.client
            .with_reauth(|| self.client.set_volume(percent))
            .await
    }

    /// Whether the account reports active playback.
    pub async fn is_playing(&self) -> Result<bool, SessionError> {
        self.client.with_reauth(|| self.client.is_playing()).await
    }

    /// The provider authorize URL a user visits to log the bot in. The
    /// auth backend's callback endpoint completes the exchange and stores
    /// the token pair.
    pub fn login_url(&self) -> Result<String, SessionError> {
        let redirect_uri = format!("{}/callback", self.settings.auth_base_url);
        let query = serde_urlencoded::to_string([
            ("response_type", "code"),
            ("client_id", self.settings.client_id.as_str()),
            ("scope", AUTHORIZE_SCOPE),
            ("redirect_uri", redirect_uri.as_str()),
            ("state", self.settings.auth_state.as_str()),
        ])?;
        Ok(format!("https://accounts.spotify.com/authorize/?{}", query))
    }

    /// Stop the decoder, drop local credential material and revoke the
    /// backend's stored copy. Returns whether anything was revoked.
    pub async fn logout(&self) -> Result<bool, SessionError> {
        self.stop_playback().await;
        self.auth.logout().await
    }

    /// Terminate the decoder and the rotation task. Safe to call at any
    /// time, including while `prepare_for_playback` is mid-poll.
    pub async fn stop_playback(&self) {
        self.player.stop().await;
        let mut guard = self.rotation_task.write().await;
        if let Some(handle) = guard.take() {
            handle.abort();
        }
    }

    /// The decoder's stdout as a byte stream, for the voice collaborator.
    /// `None` until the decoder runs, or once the stream was taken.
    pub async fn audio_stream(
        &self,
    ) -> Option<impl futures::Stream<Item = tokio::io::Result<bytes::Bytes>> + Send + Unpin> {
        self.player.audio_stream().await
    }

    pub fn player(&self) -> &PlayerSupervisor {
        &self.player
    }

    pub fn auth(&self) -> &Arc<AuthClient> {
        &self.auth
    }

    pub fn playback(&self) -> &Arc<PlaybackClient> {
        &self.client
    }

    pub fn reconciler(&self) -> &DeviceReconciler {
        &self.reconciler
    }

    /// Keep exactly one rotation task alive per running decoder.
    async fn spawn_rotation_task(&self) {
        let mut guard = self.rotation_task.write().await;
        if let Some(handle) = guard.as_ref() {
            if !handle.is_finished() {
                return;
            }
        }
        let task = tokio::spawn(self.player.clone().credential_rotation(
            Arc::clone(&self.auth),
            self.settings.token_rotation_interval,
        ));
        *guard = Some(task);
    }
}

impl std::fmt::Debug for SpotifySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpotifySession")
            .field("device_name", &self.settings.device_name)
            .field("player", &self.player)
            .finish()
    }
}
