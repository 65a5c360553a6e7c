use thiserror::Error;

/// Errors surfaced by the session controller.
///
/// Domain variants carry the diagnostic fields callers need for
/// user-facing reporting; infrastructure failures convert via `#[from]`.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no credential available, a fresh login is required")]
    NotLoggedIn,

    #[error("token refresh rejected by the auth backend: {status}: {body}")]
    RefreshFailed { status: u16, body: String },

    #[error("provider rejected the access token (HTTP 401)")]
    SessionExpired,

    #[error("provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("media payload of shape '{shape}' is missing required field '{field}'")]
    MalformedMediaObject { field: String, shape: &'static str },

    #[error("unrecognized media shape tag: '{0}'")]
    UnrecognizedMediaShape(String),

    #[error("skip direction must be 'next' or 'previous', got '{0}'")]
    InvalidDirection(String),

    #[error("invalid search type set: {0}")]
    InvalidSearchTypes(String),

    #[error("volume percent must be within 0..=100, got {0}")]
    InvalidVolume(u8),

    #[error("nothing is playing on the account right now")]
    NothingPlaying,

    #[error("no results matched query '{0}'")]
    NoMatches(String),

    #[error("no playback device named '{0}' is registered with the provider")]
    DeviceNotRegistered(String),

    #[error("decoder process never registered as a playback device within the readiness window")]
    DecoderTimeout,

    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    ParseFailed(#[from] serde_json::Error),

    #[error("URL encoding failed: {0}")]
    UrlEncodingFailed(#[from] serde_urlencoded::ser::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task panicked or cancelled")]
    TaskJoinError(#[from] tokio::task::JoinError),
}

impl SessionError {
    /// True when the failure means the stored access token is stale and a
    /// single refresh-and-retry is worth attempting.
    pub fn is_expired_token(&self) -> bool {
        matches!(self, SessionError::SessionExpired)
    }

    /// Constructor for the missing-field case; keeps parser call sites short.
    pub(crate) fn missing(field: impl Into<String>, shape: &'static str) -> Self {
        SessionError::MalformedMediaObject {
            field: field.into(),
            shape,
        }
    }
}
