use serde::Deserialize;
use serde_json::Value;

use crate::error::SessionError;
use crate::utils::format_duration;

/// The token pair held by the auth backend. `refresh_token` can be absent
/// when the account was provisioned without offline access; refreshing then
/// fails with `NotLoggedIn` instead of guessing.
#[derive(Debug, Clone, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<u64>,
}

/// A playback device as reported by `/me/player/devices`. Fetched on
/// demand, never cached beyond one reconciliation pass.
#[derive(Debug, Clone, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct DevicesResponse {
    pub devices: Vec<Device>,
}

// --- field extraction ---
//
// Media payloads are duck-typed JSON dispatched on a `type` tag, so they
// are parsed by hand from `Value` rather than derived: a missing required
// field must fail with the exact path that was absent, never default.

fn get_path<'a>(value: &'a Value, path: &str, shape: &'static str) -> Result<&'a Value, SessionError> {
    let mut current = value;
    for segment in path.split('.') {
        current = match current.get(segment) {
            Some(v) if !v.is_null() => v,
            _ => return Err(SessionError::missing(path, shape)),
        };
    }
    Ok(current)
}

fn get_str(value: &Value, path: &str, shape: &'static str) -> Result<String, SessionError> {
    get_path(value, path, shape)?
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| SessionError::missing(path, shape))
}

fn get_u64(value: &Value, path: &str, shape: &'static str) -> Result<u64, SessionError> {
    get_path(value, path, shape)?
        .as_u64()
        .ok_or_else(|| SessionError::missing(path, shape))
}

/// Optional `external_urls.spotify`; some shapes legitimately omit it.
fn opt_url(value: &Value) -> Option<String> {
    value
        .get("external_urls")
        .and_then(|u| u.get("spotify"))
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

/// First image url of an `images` array, tolerated absent.
fn first_image(value: &Value) -> Option<String> {
    value
        .get("images")
        .and_then(Value::as_array)
        .and_then(|imgs| imgs.first())
        .and_then(|img| img.get("url"))
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

// --- artists ---

/// Which source shape an attribution came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtistKind {
    /// A plain `artist` object on a track or album.
    Person,
    /// The parent show of an episode.
    Show,
    /// A playlist owner.
    User,
    /// An audiobook author; never carries a url.
    Author,
}

/// Unified attribution entity. `url` is present for most shapes but the
/// provider omits `external_urls` often enough that display logic must
/// tolerate it missing for every kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Artist {
    pub kind: ArtistKind,
    pub name: String,
    pub url: Option<String>,
}

impl Artist {
    /// Parse from a raw payload, discriminated by its `type` tag.
    pub fn from_value(value: &Value) -> Result<Self, SessionError> {
        match value.get("type").and_then(Value::as_str) {
            Some("artist") => Self::person(value),
            Some("show") => Self::show(value),
            Some("user") => Self::user(value),
            Some("author") => Self::author(value),
            Some(other) => Err(SessionError::UnrecognizedMediaShape(other.to_string())),
            None => Err(SessionError::UnrecognizedMediaShape("<missing type tag>".to_string())),
        }
    }

    pub(crate) fn person(value: &Value) -> Result<Self, SessionError> {
        Ok(Artist {
            kind: ArtistKind::Person,
            name: get_str(value, "name", "artist")?,
            url: opt_url(value),
        })
    }

    pub(crate) fn show(value: &Value) -> Result<Self, SessionError> {
        Ok(Artist {
            kind: ArtistKind::Show,
            name: get_str(value, "name", "show")?,
            url: opt_url(value),
        })
    }

    pub(crate) fn user(value: &Value) -> Result<Self, SessionError> {
        Ok(Artist {
            kind: ArtistKind::User,
            name: get_str(value, "display_name", "user")?,
            url: opt_url(value),
        })
    }

    pub(crate) fn author(value: &Value) -> Result<Self, SessionError> {
        Ok(Artist {
            kind: ArtistKind::Author,
            name: get_str(value, "name", "author")?,
            url: None,
        })
    }

    /// Markdown label: a link when the provider gave us one, bare name
    /// otherwise.
    pub fn display_str(&self) -> String {
        match &self.url {
            Some(url) => format!("[{}]({})", self.name, url),
            None => self.name.clone(),
        }
    }
}

// --- queueables ---

/// Discriminant of the unified playable unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Track,
    Episode,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Track => "track",
            MediaKind::Episode => "episode",
        }
    }
}

/// The unified playable entity used throughout the controller.
///
/// Invariants upheld at construction: `artists` is non-empty with the
/// primary artist first, and `duration_ms` came from the payload verbatim.
/// `image` is the only tolerated absence.
#[derive(Debug, Clone, PartialEq)]
pub struct Queueable {
    pub kind: MediaKind,
    pub name: String,
    pub url: String,
    pub duration_ms: u64,
    pub artists: Vec<Artist>,
    pub image: Option<String>,
    pub uri: String,
}

impl Queueable {
    /// Parse a raw track or episode payload, discriminated by its `type`
    /// tag. Unknown or missing tags fail rather than fall through.
    pub fn from_value(value: &Value) -> Result<Self, SessionError> {
        match value.get("type").and_then(Value::as_str) {
            Some("track") => Self::from_track(value),
            Some("episode") => Self::from_episode(value),
            Some(other) => Err(SessionError::UnrecognizedMediaShape(other.to_string())),
            None => Err(SessionError::UnrecognizedMediaShape("<missing type tag>".to_string())),
        }
    }

    fn from_track(value: &Value) -> Result<Self, SessionError> {
        const SHAPE: &str = "track";
        let raw_artists = get_path(value, "artists", SHAPE)?
            .as_array()
            .ok_or_else(|| SessionError::missing("artists", SHAPE))?;
        if raw_artists.is_empty() {
            return Err(SessionError::missing("artists", SHAPE));
        }
        let artists = raw_artists
            .iter()
            .map(Artist::person)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Queueable {
            kind: MediaKind::Track,
            name: get_str(value, "name", SHAPE)?,
            url: get_str(value, "external_urls.spotify", SHAPE)?,
            duration_ms: get_u64(value, "duration_ms", SHAPE)?,
            artists,
            image: value.get("album").map(first_image).unwrap_or(None),
            uri: get_str(value, "uri", SHAPE)?,
        })
    }

    fn from_episode(value: &Value) -> Result<Self, SessionError> {
        const SHAPE: &str = "episode";
        // Episodes have no artist list; the parent show stands in.
        let show = Artist::show(get_path(value, "show", SHAPE)?)?;

        Ok(Queueable {
            kind: MediaKind::Episode,
            name: get_str(value, "name", SHAPE)?,
            url: get_str(value, "external_urls.spotify", SHAPE)?,
            duration_ms: get_u64(value, "duration_ms", SHAPE)?,
            artists: vec![show],
            image: first_image(value),
            uri: get_str(value, "uri", SHAPE)?,
        })
    }

    /// The primary artist used for short display.
    pub fn primary_artist(&self) -> &Artist {
        // non-empty by construction
        &self.artists[0]
    }

    /// Normalized lowercase `"{name} {primary artist}"` for fuzzy matching.
    /// Pure and deterministic.
    pub fn search_str(&self) -> String {
        format!("{} {}", self.name, self.primary_artist().name).to_lowercase()
    }

    /// Single-line user-facing label: `**name** [duration] by artist`.
    pub fn display_str(&self) -> String {
        format!(
            "**{}** [{}] by {}",
            self.name,
            format_duration(self.duration_ms),
            self.primary_artist().display_str()
        )
    }
}

// --- collections ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Album,
    Playlist,
}

impl CollectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKind::Album => "album",
            CollectionKind::Playlist => "playlist",
        }
    }
}

/// An album or playlist: attribution plus an ordered run of queueables.
///
/// `tracks` is filled by the playback client with a single fixed-size page
/// at construction time; collections longer than one page are only
/// partially represented, by design.
#[derive(Debug, Clone)]
pub struct Collection {
    pub kind: CollectionKind,
    pub name: String,
    pub id: String,
    pub artists: Vec<Artist>,
    pub tracks: Vec<Queueable>,
}

impl Collection {
    /// Parse the collection header (everything except `tracks`),
    /// discriminated by its `type` tag.
    pub fn from_value(value: &Value) -> Result<Self, SessionError> {
        match value.get("type").and_then(Value::as_str) {
            Some("album") => Self::from_album(value),
            Some("playlist") => Self::from_playlist(value),
            Some(other) => Err(SessionError::UnrecognizedMediaShape(other.to_string())),
            None => Err(SessionError::UnrecognizedMediaShape("<missing type tag>".to_string())),
        }
    }

    fn from_album(value: &Value) -> Result<Self, SessionError> {
        const SHAPE: &str = "album";
        let artists = get_path(value, "artists", SHAPE)?
            .as_array()
            .ok_or_else(|| SessionError::missing("artists", SHAPE))?
            .iter()
            .map(Artist::person)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Collection {
            kind: CollectionKind::Album,
            name: get_str(value, "name", SHAPE)?,
            id: get_str(value, "id", SHAPE)?,
            artists,
            tracks: Vec::new(),
        })
    }

    fn from_playlist(value: &Value) -> Result<Self, SessionError> {
        const SHAPE: &str = "playlist";
        // Playlist attribution is its single owner.
        let owner = Artist::user(get_path(value, "owner", SHAPE)?)?;

        Ok(Collection {
            kind: CollectionKind::Playlist,
            name: get_str(value, "name", SHAPE)?,
            id: get_str(value, "id", SHAPE)?,
            artists: vec![owner],
            tracks: Vec::new(),
        })
    }

    pub fn search_str(&self) -> String {
        match self.artists.first() {
            Some(primary) => format!("{} {}", self.name, primary.name).to_lowercase(),
            None => self.name.to_lowercase(),
        }
    }

    pub fn display_str(&self) -> String {
        let attribution = self
            .artists
            .first()
            .map(Artist::display_str)
            .unwrap_or_else(|| "unknown".to_string());
        format!(
            "**{}** ({} {}s) by {}",
            self.name,
            self.tracks.len(),
            MediaKind::Track.as_str(),
            attribution
        )
    }
}
