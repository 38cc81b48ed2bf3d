//! Access token caching and the refresh policy around it.

use crate::oauth::{AuthError, CredentialBundle, FreshToken, OAuthClientConfig, TokenSource};
use crate::youtube_api::TransportError;
use jiff::{SignedDuration, Timestamp};
use oauth2::{AccessToken, RefreshToken};
use std::ops::AsyncFnMut;
use std::sync::Arc;

/// A token this close to its expiry is treated as already expired.
const EXPIRY_MARGIN: SignedDuration = SignedDuration::from_secs(300);

/// Lifetime assumed when the token endpoint doesn't report one.
const DEFAULT_LIFETIME: SignedDuration = SignedDuration::from_secs(3300);

/// The cached access token.
#[derive(Debug, Clone)]
pub enum TokenState {
    /// No token, or one whose validity is unknown or over.
    Stale,
    Valid {
        access_token: AccessToken,
        expires_at: Timestamp,
    },
}

impl TokenState {
    /// Builds the initial state from a credential bundle.
    ///
    /// The bundled token is only trusted if the bundle also says when it expires.
    pub fn from_bundle(bundle: &CredentialBundle) -> Self {
        match (&bundle.access_token, bundle.expiry()) {
            (Some(access_token), Some(expires_at)) => TokenState::Valid {
                access_token: access_token.clone(),
                expires_at,
            },
            _ => TokenState::Stale,
        }
    }

    /// Computes the state that follows a successful refresh at `now`.
    pub fn refreshed(token: &FreshToken, now: Timestamp) -> Self {
        let lifetime = token
            .expires_in
            .and_then(|d| SignedDuration::try_from(d).ok())
            .unwrap_or(DEFAULT_LIFETIME);
        TokenState::Valid {
            access_token: token.access_token.clone(),
            expires_at: now.checked_add(lifetime).unwrap_or(Timestamp::MAX),
        }
    }

    /// Returns the token if it can still be used at `now`.
    pub fn usable_at(&self, now: Timestamp) -> Option<&AccessToken> {
        match self {
            TokenState::Stale => None,
            TokenState::Valid {
                access_token,
                expires_at,
            } => {
                let deadline = expires_at.checked_sub(EXPIRY_MARGIN).ok()?;
                (now < deadline).then_some(access_token)
            }
        }
    }
}

/// Hands out valid bearer tokens for one invocation, refreshing as needed.
pub struct TokenManager {
    client: OAuthClientConfig,
    refresh_token: RefreshToken,
    state: TokenState,
    source: Arc<dyn TokenSource>,
    refreshes: u32,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("client_id", &self.client.client_id.as_str())
            .field("valid", &self.state.usable_at(Timestamp::now()).is_some())
            .field("refreshes", &self.refreshes)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    pub fn new(bundle: &CredentialBundle, source: Arc<dyn TokenSource>) -> Self {
        Self {
            client: bundle.client(),
            refresh_token: bundle.refresh_token.clone(),
            state: TokenState::from_bundle(bundle),
            source,
            refreshes: 0,
        }
    }

    /// Number of refresh exchanges performed so far.
    pub fn refresh_count(&self) -> u32 {
        self.refreshes
    }

    /// Returns a bearer token that is valid right now, refreshing first if the cached one is
    /// missing or (nearly) expired.
    pub async fn get_valid_token(&mut self) -> Result<String, AuthError> {
        if let Some(token) = self.state.usable_at(Timestamp::now()) {
            return Ok(token.secret().clone());
        }
        tracing::debug!("access token missing or expired, refreshing");
        self.refresh().await
    }

    /// Refreshes unconditionally.
    ///
    /// For when the platform rejected a token the cache still considered valid.
    pub async fn force_refresh(&mut self) -> Result<String, AuthError> {
        tracing::debug!("forcing access token refresh");
        self.refresh().await
    }

    async fn refresh(&mut self) -> Result<String, AuthError> {
        self.state = TokenState::Stale;
        self.refreshes += 1;
        let fresh = self
            .source
            .refresh(&self.client, &self.refresh_token)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "access token refresh failed"))?;

        if let Some(rotated) = &fresh.refresh_token {
            tracing::debug!("token endpoint rotated the refresh token");
            self.refresh_token = rotated.clone();
        }
        self.state = TokenState::refreshed(&fresh, Timestamp::now());
        Ok(fresh.access_token.secret().clone())
    }

    /// Runs one logical platform operation with a valid token.
    ///
    /// If the platform answers 401, the token is force-refreshed once and `op` runs once more.
    /// A second 401 is [`AuthError::RejectedAfterRefresh`]. Other platform errors are handed
    /// back untouched in the inner `Result`.
    pub async fn authorized<T, F>(&mut self, op: F) -> Result<Result<T, TransportError>, AuthError>
    where
        F: AsyncFnMut(String) -> Result<T, TransportError>,
    {
        let mut refreshed = false;
        self.authorized_within(&mut refreshed, op).await
    }

    /// Like [`authorized`](Self::authorized), but the single forced refresh is shared by every
    /// call that passes the same `refreshed` flag.
    ///
    /// Once the flag is set, a 401 is [`AuthError::RejectedAfterRefresh`] straight away.
    pub async fn authorized_within<T, F>(
        &mut self,
        refreshed: &mut bool,
        mut op: F,
    ) -> Result<Result<T, TransportError>, AuthError>
    where
        F: AsyncFnMut(String) -> Result<T, TransportError>,
    {
        let token = self.get_valid_token().await?;
        match op(token).await {
            Err(TransportError::Unauthorized) if *refreshed => {
                return Err(AuthError::RejectedAfterRefresh);
            }
            Err(TransportError::Unauthorized) => {
                tracing::warn!("platform rejected the access token, refreshing once");
            }
            other => return Ok(other),
        }

        *refreshed = true;
        let token = self.force_refresh().await?;
        match op(token).await {
            Err(TransportError::Unauthorized) => Err(AuthError::RejectedAfterRefresh),
            other => Ok(other),
        }
    }
}
