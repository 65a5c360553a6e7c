use std::sync::Arc;

use reqwest::Client;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::models::Credential;

/// Track probed to decide whether an access token is still accepted.
/// Any cheap authenticated read works; this one is stable.
const PROBE_TRACK_ID: &str = "2TpxZ7JUBn3uw46aR7qd6V";

/// Owns the access/refresh token pair against the auth backend.
///
/// The backend stores the canonical pair (populated by its login
/// callback); this client fetches it, probes it against the provider and
/// refreshes it lazily: the first caller to discover a stale token pays
/// for exactly one refresh, nothing runs on a timer.
pub struct AuthClient {
    http: Arc<Client>,
    base_url: String,
    state: String,
    api_base: String,
    /// Last credential known good; concurrent overwrites are tolerated
    /// because provider-side rotation is idempotent per refresh token.
    current: RwLock<Option<Credential>>,
}

impl AuthClient {
    pub fn new(http: Arc<Client>, base_url: &str, state: &str, api_base: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            state: state.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            current: RwLock::new(None),
        }
    }

    /// Fetch the stored credential, probe it, and refresh once if the
    /// probe says it expired. Fails with `NotLoggedIn` when neither a
    /// stored credential nor a refresh token exists.
    pub async fn current_credential(&self) -> Result<Credential, SessionError> {
        let cred = match self.fetch_stored().await {
            Ok(cred) => cred,
            Err(SessionError::NotLoggedIn) => {
                debug!("No stored credential, attempting refresh with cached refresh token");
                self.refresh_current().await?
            }
            Err(e) => return Err(e),
        };

        if self.is_valid(&cred.access_token).await? {
            self.store(cred.clone()).await;
            return Ok(cred);
        }

        // Stale token detected: exactly one refresh per detection.
        info!("Stored access token rejected by provider, refreshing once");
        let refresh_token = cred.refresh_token.ok_or(SessionError::NotLoggedIn)?;
        self.refresh(&refresh_token).await
    }

    /// Probe the provider with a cheap authenticated read.
    /// 2xx means valid, 401 means expired; anything else is surfaced as a
    /// provider error rather than coerced into a boolean.
    pub async fn is_valid(&self, access_token: &str) -> Result<bool, SessionError> {
        let response = self
            .http
            .get(format!("{}/tracks/{}", self.api_base, PROBE_TRACK_ID))
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }
        if status.as_u16() == 401 {
            debug!("Token probe returned 401, token is expired");
            return Ok(false);
        }
        let body = response.text().await.unwrap_or_default();
        warn!(%status, "Token probe returned unexpected status");
        Err(SessionError::Provider {
            status: status.as_u16(),
            body,
        })
    }

    /// Exchange a refresh token at the auth backend for a fresh pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Credential, SessionError> {
        let response = self
            .http
            .post(format!("{}/refresh-token", self.base_url))
            .query(&[("state", self.state.as_str()), ("refresh_token", refresh_token)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "Token refresh rejected by auth backend");
            return Err(SessionError::RefreshFailed {
                status: status.as_u16(),
                body,
            });
        }

        let mut cred = response.json::<Credential>().await?;
        // Some backends rotate without echoing the refresh token back.
        if cred.refresh_token.is_none() {
            cred.refresh_token = Some(refresh_token.to_string());
        }
        info!("Access token refreshed");
        self.store(cred.clone()).await;
        Ok(cred)
    }

    /// Refresh using whatever refresh token is currently known, for the
    /// retry path after a provider 401.
    pub async fn refresh_current(&self) -> Result<Credential, SessionError> {
        let cached = {
            let guard = self.current.read().await;
            guard.as_ref().and_then(|c| c.refresh_token.clone())
        };
        let refresh_token = match cached {
            Some(token) => token,
            None => self
                .fetch_stored()
                .await
                .ok()
                .and_then(|c| c.refresh_token)
                .ok_or(SessionError::NotLoggedIn)?,
        };
        self.refresh(&refresh_token).await
    }

    /// Bearer token for outbound provider calls. Serves the cached
    /// credential when warm; cold callers pay the full fetch-and-probe.
    pub async fn bearer(&self) -> Result<String, SessionError> {
        {
            let guard = self.current.read().await;
            if let Some(cred) = guard.as_ref() {
                return Ok(cred.access_token.clone());
            }
        }
        Ok(self.current_credential().await?.access_token)
    }

    /// Clear local credential material and revoke the backend's copy.
    /// Returns whether the backend actually had something to revoke, so a
    /// second call yields `false` rather than an error.
    pub async fn logout(&self) -> Result<bool, SessionError> {
        {
            let mut guard = self.current.write().await;
            *guard = None;
        }

        let response = self
            .http
            .delete(format!("{}/access-token/{}", self.base_url, self.state))
            .send()
            .await?;

        if response.status().is_success() {
            info!("Logged out, auth backend revoked the credential");
            Ok(true)
        } else {
            debug!(status = %response.status(), "Logout found nothing to revoke");
            Ok(false)
        }
    }

    async fn fetch_stored(&self) -> Result<Credential, SessionError> {
        let response = self
            .http
            .get(format!("{}/access-token/{}", self.base_url, self.state))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response.json::<Credential>().await?)
        } else {
            debug!(status = %response.status(), "Auth backend has no stored credential");
            Err(SessionError::NotLoggedIn)
        }
    }

    async fn store(&self, cred: Credential) {
        let mut guard = self.current.write().await;
        *guard = Some(cred);
    }
}

impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("base_url", &self.base_url)
            .field("api_base", &self.api_base)
            .finish()
    }
}
