use once_cell::sync::Lazy;
use std::{env, time::Duration};

use crate::client::DEFAULT_API_BASE;

/// Holds all tunables and identity values, read-once from ENV with fallbacks.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the auth backend that stores the token pair.
    pub auth_base_url: String,
    /// Shared-secret `state` value identifying this bot to the auth backend.
    pub auth_state: String,
    /// Spotify application client id (used for the authorize URL).
    pub client_id: String,
    /// Spotify Web API prefix.
    pub api_base: String,
    /// Display name the decoder registers under; the reconciler matches on it.
    pub device_name: String,
    /// Decoder binary to spawn.
    pub librespot_binary: String,
    pub bitrate: u32,
    pub initial_volume: u8,
    pub volume_normalisation: bool,
    /// How long to let a spawned decoder keep its token before the
    /// stop/start rotation; just under the provider's one-hour lifetime.
    pub token_rotation_interval: Duration,
    pub device_poll_interval: Duration,
    pub device_poll_attempts: u32,
    /// Upper bound on queue snapshot length for display.
    pub queue_preview_count: usize,
    /// Single page size used when hydrating collection tracks.
    pub collection_page_size: u8,
    pub request_timeout: Duration,
}

impl Settings {
    pub fn from_env() -> Self {
        // optionally load .env
        let _ = dotenvy::dotenv();

        fn parse_string(var: &str, default: &str) -> String {
            env::var(var).unwrap_or_else(|_| default.to_string())
        }

        fn parse_u32(var: &str, default: u32) -> u32 {
            env::var(var)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        fn parse_secs(var: &str, default_secs: u64) -> Duration {
            env::var(var)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or_else(|| Duration::from_secs(default_secs))
        }

        // Out-of-range values fall back to the default; never truncate.
        fn parse_u8(var: &str, default: u8) -> u8 {
            env::var(var)
                .ok()
                .and_then(|v| v.parse::<u8>().ok())
                .unwrap_or(default)
        }

        fn parse_percent(var: &str, default: u8) -> u8 {
            env::var(var)
                .ok()
                .and_then(|v| v.parse::<u8>().ok())
                .filter(|v| *v <= 100)
                .unwrap_or(default)
        }

        Settings {
            auth_base_url: parse_string("AUTH_SERVER", "http://localhost:8888"),
            auth_state: parse_string("AUTH_SERVER_SECURITY", ""),
            client_id: parse_string("SPOTIFY_CLIENT_ID", ""),
            api_base: parse_string("SPOTIFY_API_PREFIX", DEFAULT_API_BASE),
            device_name: parse_string("BOT_NAME", "spotify-remote"),
            librespot_binary: parse_string("LIBRESPOT_BINARY", "librespot"),
            bitrate: parse_u32("LIBRESPOT_BITRATE", 320),
            initial_volume: parse_percent("LIBRESPOT_INITIAL_VOLUME", 100),
            volume_normalisation: env::var("LIBRESPOT_VOLUME_NORMALISATION")
                .map(|v| v != "false")
                .unwrap_or(true),
            token_rotation_interval: parse_secs("TOKEN_ROTATION_SECS", 3590),
            device_poll_interval: parse_secs("DEVICE_POLL_INTERVAL_SECS", 1),
            device_poll_attempts: parse_u32("DEVICE_POLL_ATTEMPTS", 10),
            queue_preview_count: parse_u32("QUEUE_PREVIEW_COUNT", 4) as usize,
            collection_page_size: parse_u8("COLLECTION_PAGE_SIZE", 50),
            request_timeout: parse_secs("REQUEST_TIMEOUT_SECS", 10),
        }
    }
}

/// Global settings instance
pub static SETTINGS: Lazy<Settings> = Lazy::new(Settings::from_env);
