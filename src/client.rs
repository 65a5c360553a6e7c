use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::auth::AuthClient;
use crate::error::SessionError;
use crate::models::{Collection, CollectionKind, Device, DevicesResponse, Queueable};

/// Default Spotify Web API prefix.
pub const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";

/// Skip direction accepted by the player endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipDirection {
    Next,
    Previous,
}

impl SkipDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipDirection::Next => "next",
            SkipDirection::Previous => "previous",
        }
    }
}

impl FromStr for SkipDirection {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "next" => Ok(SkipDirection::Next),
            "previous" => Ok(SkipDirection::Previous),
            other => Err(SessionError::InvalidDirection(other.to_string())),
        }
    }
}

/// Entity classes the search endpoint can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchType {
    Album,
    Playlist,
    Track,
    Episode,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::Album => "album",
            SearchType::Playlist => "playlist",
            SearchType::Track => "track",
            SearchType::Episode => "episode",
        }
    }

    /// The plural key the search response nests each class under.
    fn items_key(&self) -> &'static str {
        match self {
            SearchType::Album => "albums",
            SearchType::Playlist => "playlists",
            SearchType::Track => "tracks",
            SearchType::Episode => "episodes",
        }
    }
}

impl FromStr for SearchType {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "album" => Ok(SearchType::Album),
            "playlist" => Ok(SearchType::Playlist),
            "track" => Ok(SearchType::Track),
            "episode" => Ok(SearchType::Episode),
            other => Err(SessionError::InvalidSearchTypes(other.to_string())),
        }
    }
}

/// Typed search results, one bucket per requested class.
#[derive(Debug, Default)]
pub struct SearchResults {
    pub tracks: Vec<Queueable>,
    pub episodes: Vec<Queueable>,
    pub albums: Vec<Collection>,
    pub playlists: Vec<Collection>,
}

impl SearchResults {
    /// First directly playable hit, tracks before episodes.
    pub fn first_queueable(&self) -> Option<&Queueable> {
        self.tracks.first().or_else(|| self.episodes.first())
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
            && self.episodes.is_empty()
            && self.albums.is_empty()
            && self.playlists.is_empty()
    }
}

/// Stateless request functions against the provider's player API.
///
/// Every call attaches the current bearer token from the [`AuthClient`]
/// and classifies the response into exactly one of: success, expired
/// session (401) or [`SessionError::Provider`]. Input validation happens
/// before any network round trip.
pub struct PlaybackClient {
    http: Arc<Client>,
    api_base: String,
    auth: Arc<AuthClient>,
    collection_page_size: u8,
}

impl PlaybackClient {
    pub fn new(
        http: Arc<Client>,
        api_base: &str,
        auth: Arc<AuthClient>,
        collection_page_size: u8,
    ) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            auth,
            collection_page_size,
        }
    }

    /// Run `op` and, if the provider reports an expired token, refresh the
    /// credential and retry exactly once. This is the only retry policy in
    /// the controller; every other error is surfaced unchanged.
    pub async fn with_reauth<T, F, Fut>(&self, op: F) -> Result<T, SessionError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, SessionError>>,
    {
        match op().await {
            Err(SessionError::SessionExpired) => {
                info!("Provider rejected the access token, refreshing once and retrying");
                self.auth.refresh_current().await?;
                op().await
            }
            other => other,
        }
    }

    /// Search the catalog. `types` must be a non-empty set drawn from
    /// album/playlist/track/episode; anything else fails fast without a
    /// network call. Collections in the results are hydrated with one page
    /// of tracks each.
    pub async fn search(
        &self,
        query: &str,
        types: &[&str],
        limit: u8,
    ) -> Result<SearchResults, SessionError> {
        if types.is_empty() {
            return Err(SessionError::InvalidSearchTypes("<empty>".to_string()));
        }
        let types = types
            .iter()
            .map(|t| t.parse::<SearchType>())
            .collect::<Result<Vec<_>, _>>()?;

        let type_param = types
            .iter()
            .map(SearchType::as_str)
            .collect::<Vec<_>>()
            .join(",");
        debug!(%query, types = %type_param, limit, "Searching catalog");

        let limit = limit.to_string();
        let response = self
            .http
            .get(format!("{}/search", self.api_base))
            .bearer_auth(self.auth.bearer().await?)
            .query(&[
                ("q", query),
                ("type", type_param.as_str()),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;
        let body: Value = Self::classify(response).await?.json().await?;

        let mut results = SearchResults::default();
        for search_type in types {
            let items = body
                .get(search_type.items_key())
                .and_then(|bucket| bucket.get("items"))
                .and_then(Value::as_array);
            let items = match items {
                Some(items) => items,
                None => continue,
            };
            // The catalog occasionally pads result pages with nulls.
            let items = items.iter().filter(|v| !v.is_null());
            match search_type {
                SearchType::Track => {
                    for item in items {
                        results.tracks.push(Queueable::from_value(item)?);
                    }
                }
                SearchType::Episode => {
                    for item in items {
                        results.episodes.push(Queueable::from_value(item)?);
                    }
                }
                SearchType::Album => {
                    for item in items {
                        let mut collection = Collection::from_value(item)?;
                        self.hydrate_collection(&mut collection).await?;
                        results.albums.push(collection);
                    }
                }
                SearchType::Playlist => {
                    for item in items {
                        let mut collection = Collection::from_value(item)?;
                        self.hydrate_collection(&mut collection).await?;
                        results.playlists.push(collection);
                    }
                }
            }
        }
        Ok(results)
    }

    /// Fill a collection's track list with a single fixed-size page.
    /// Collections larger than one page stay partial; callers display what
    /// they get.
    pub async fn hydrate_collection(
        &self,
        collection: &mut Collection,
    ) -> Result<(), SessionError> {
        let url = match collection.kind {
            CollectionKind::Album => {
                format!("{}/albums/{}/tracks", self.api_base, collection.id)
            }
            CollectionKind::Playlist => {
                format!("{}/playlists/{}/tracks", self.api_base, collection.id)
            }
        };

        let response = self
            .http
            .get(url)
            .bearer_auth(self.auth.bearer().await?)
            .query(&[("limit", self.collection_page_size.to_string())])
            .send()
            .await?;
        let body: Value = Self::classify(response).await?.json().await?;

        let items = body
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| SessionError::missing("items", "collection page"))?;

        for item in items {
            // Playlist pages wrap each entry; album pages do not. Removed
            // or region-blocked entries come back as null and are skipped.
            let entry = match collection.kind {
                CollectionKind::Playlist => match item.get("track") {
                    Some(track) if !track.is_null() => track,
                    _ => continue,
                },
                CollectionKind::Album => item,
            };
            collection.tracks.push(Queueable::from_value(entry)?);
        }
        Ok(())
    }

    /// Fetch a single track or episode by its canonical URI
    /// (`spotify:track:{id}` or `spotify:episode:{id}`).
    pub async fn lookup(&self, uri: &str) -> Result<Queueable, SessionError> {
        let (kind, id) = match uri.strip_prefix("spotify:").and_then(|r| r.split_once(':')) {
            Some(("track", id)) => ("tracks", id),
            Some(("episode", id)) => ("episodes", id),
            _ => return Err(SessionError::UnrecognizedMediaShape(uri.to_string())),
        };
        debug!(%uri, "Looking up media item");
        let response = self
            .http
            .get(format!("{}/{}/{}", self.api_base, kind, id))
            .bearer_auth(self.auth.bearer().await?)
            .send()
            .await?;
        let body: Value = Self::classify(response).await?.json().await?;
        Queueable::from_value(&body)
    }

    /// Skip forward or back. Any direction outside next/previous fails
    /// with `InvalidDirection` before any network call.
    pub async fn skip(&self, direction: &str) -> Result<(), SessionError> {
        let direction = direction.parse::<SkipDirection>()?;
        debug!(direction = direction.as_str(), "Skipping");
        let response = self
            .http
            .post(format!("{}/me/player/{}", self.api_base, direction.as_str()))
            .bearer_auth(self.auth.bearer().await?)
            .send()
            .await?;
        Self::classify(response).await.map(drop)
    }

    /// Append a playable URI to the account's queue.
    pub async fn add_to_queue(&self, uri: &str) -> Result<(), SessionError> {
        debug!(%uri, "Adding to queue");
        let response = self
            .http
            .post(format!("{}/me/player/queue", self.api_base))
            .bearer_auth(self.auth.bearer().await?)
            .query(&[("uri", uri)])
            .send()
            .await?;
        Self::classify(response).await.map(drop)
    }

    /// Resume playback on the active device.
    pub async fn play(&self) -> Result<(), SessionError> {
        let response = self
            .http
            .put(format!("{}/me/player/play", self.api_base))
            .bearer_auth(self.auth.bearer().await?)
            .send()
            .await?;
        Self::classify(response).await.map(drop)
    }

    /// Pause playback on the active device.
    pub async fn pause(&self) -> Result<(), SessionError> {
        let response = self
            .http
            .put(format!("{}/me/player/pause", self.api_base))
            .bearer_auth(self.auth.bearer().await?)
            .send()
            .await?;
        Self::classify(response).await.map(drop)
    }

    /// Set playback volume. Percent outside 0..=100 fails with
    /// `InvalidVolume` before any network call.
    pub async fn set_volume(&self, percent: u8) -> Result<(), SessionError> {
        if percent > 100 {
            return Err(SessionError::InvalidVolume(percent));
        }
        let response = self
            .http
            .put(format!("{}/me/player/volume", self.api_base))
            .bearer_auth(self.auth.bearer().await?)
            .query(&[("volume_percent", percent.to_string())])
            .send()
            .await?;
        Self::classify(response).await.map(drop)
    }

    /// Whether the account currently reports active playback. A 204 means
    /// no active playback session at all.
    pub async fn is_playing(&self) -> Result<bool, SessionError> {
        let response = self
            .http
            .get(format!("{}/me/player", self.api_base))
            .bearer_auth(self.auth.bearer().await?)
            .send()
            .await?;
        let response = Self::classify(response).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(false);
        }
        let body: Value = response.json().await?;
        Ok(body
            .get("is_playing")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    /// Raw currently-playing payload; `None` when the provider reports no
    /// active item (204 or an empty body).
    pub async fn currently_playing_payload(&self) -> Result<Option<Value>, SessionError> {
        let response = self
            .http
            .get(format!("{}/me/player/currently-playing", self.api_base))
            .bearer_auth(self.auth.bearer().await?)
            .send()
            .await?;
        let response = Self::classify(response).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let text = response.text().await?;
        if text.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Raw upcoming-queue payload.
    pub async fn queue_payload(&self) -> Result<Value, SessionError> {
        let response = self
            .http
            .get(format!("{}/me/player/queue", self.api_base))
            .bearer_auth(self.auth.bearer().await?)
            .send()
            .await?;
        Ok(Self::classify(response).await?.json().await?)
    }

    /// List the account's playback devices. Ephemeral: callers must not
    /// cache this beyond a single reconciliation pass.
    pub async fn devices(&self) -> Result<Vec<Device>, SessionError> {
        let response = self
            .http
            .get(format!("{}/me/player/devices", self.api_base))
            .bearer_auth(self.auth.bearer().await?)
            .send()
            .await?;
        let body: DevicesResponse = Self::classify(response).await?.json().await?;
        Ok(body.devices)
    }

    /// Transfer playback to the named device and resume immediately.
    pub async fn transfer_playback(&self, device_id: &str) -> Result<(), SessionError> {
        info!(%device_id, "Transferring playback");
        let response = self
            .http
            .put(format!("{}/me/player", self.api_base))
            .bearer_auth(self.auth.bearer().await?)
            .json(&json!({ "device_ids": [device_id], "play": true }))
            .send()
            .await?;
        Self::classify(response).await.map(drop)
    }

    /// Classify a provider response: success passes through, 401 becomes
    /// `SessionExpired`, everything else becomes `Provider` with the body
    /// preserved for reporting.
    async fn classify(response: Response) -> Result<Response, SessionError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            warn!("Provider returned 401, session expired");
            return Err(SessionError::SessionExpired);
        }
        let body = response.text().await.unwrap_or_default();
        warn!(%status, %body, "Provider request failed");
        Err(SessionError::Provider {
            status: status.as_u16(),
            body,
        })
    }
}

impl std::fmt::Debug for PlaybackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackClient")
            .field("api_base", &self.api_base)
            .finish()
    }
}
