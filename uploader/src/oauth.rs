//! OAuth 2.0 refresh-token handling for YouTube API authentication.
//!
//! The pipeline never runs an interactive authorization flow. It starts from a credential
//! bundle that already holds a refresh token and exchanges that refresh token for access
//! tokens at the bundle's token endpoint whenever [`TokenManager`](crate::token::TokenManager)
//! asks for one.

use async_trait::async_trait;
use jiff::Timestamp;
use oauth2::basic::BasicClient;
use oauth2::{AccessToken, ClientId, ClientSecret, RefreshToken, TokenResponse, TokenUrl};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Timeout for a single token endpoint round-trip.
const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The token endpoint refused the refresh token (revoked, expired or for another client).
    #[error("refresh token was rejected by the token endpoint: {0}")]
    InvalidGrant(String),

    #[error("token endpoint exchange failed: {0}")]
    Exchange(String),

    /// The platform kept rejecting the access token even after a forced refresh.
    #[error("access token was rejected again after a forced refresh")]
    RejectedAfterRefresh,
}

/// The OAuth artifacts needed to mint access tokens for the video platform.
///
/// Deserialized from the credential secret, whose keys follow the upper-cased
/// `google.oauth2.credentials.Credentials` JSON export:
///
/// ```json
/// { "TOKEN": "...", "REFRESH_TOKEN": "...", "TOKEN_URI": "https://oauth2.googleapis.com/token",
///   "CLIENT_ID": "...", "CLIENT_SECRET": "...", "EXPIRY": "2024-05-01T12:00:00Z" }
/// ```
///
/// `TOKEN` may be null or empty, and `EXPIRY` may be missing. Secret values are redacted from
/// `Debug` output by the `oauth2` newtypes.
#[derive(Clone, Deserialize)]
pub struct CredentialBundle {
    #[serde(rename = "TOKEN", default)]
    pub access_token: Option<AccessToken>,
    #[serde(rename = "REFRESH_TOKEN")]
    pub refresh_token: RefreshToken,
    #[serde(rename = "TOKEN_URI")]
    pub token_uri: TokenUrl,
    #[serde(rename = "CLIENT_ID")]
    pub client_id: ClientId,
    #[serde(rename = "CLIENT_SECRET")]
    pub client_secret: ClientSecret,
    #[serde(rename = "EXPIRY", default)]
    expiry: Option<String>,
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("has_access_token", &self.access_token.is_some())
            .field("token_uri", &self.token_uri.as_str())
            .field("client_id", &self.client_id.as_str())
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

impl CredentialBundle {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut bundle: Self = serde_json::from_str(json)?;
        if bundle
            .access_token
            .as_ref()
            .is_some_and(|t| t.secret().is_empty())
        {
            bundle.access_token = None;
        }
        Ok(bundle)
    }

    /// When the bundled access token stops being valid, if the bundle says.
    ///
    /// An unparseable expiry is treated as unknown.
    pub fn expiry(&self) -> Option<Timestamp> {
        let raw = self.expiry.as_deref()?;
        match raw.parse::<Timestamp>() {
            Ok(ts) => Some(ts),
            Err(e) => {
                tracing::warn!(expiry = raw, error = %e, "ignoring unparseable token expiry");
                None
            }
        }
    }

    /// The client configuration used for refresh exchanges.
    pub fn client(&self) -> OAuthClientConfig {
        OAuthClientConfig {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            token_uri: self.token_uri.clone(),
        }
    }
}

/// Identifies the OAuth client and the endpoint it exchanges tokens at.
#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: ClientId,
    pub client_secret: ClientSecret,
    pub token_uri: TokenUrl,
}

/// A freshly minted access token.
#[derive(Debug, Clone)]
pub struct FreshToken {
    pub access_token: AccessToken,
    /// Lifetime reported by the token endpoint, if it reported one.
    pub expires_in: Option<Duration>,
    /// A rotated refresh token, if the endpoint issued one.
    pub refresh_token: Option<RefreshToken>,
}

/// Something that can exchange a refresh token for an access token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn refresh(
        &self,
        client: &OAuthClientConfig,
        refresh_token: &RefreshToken,
    ) -> Result<FreshToken, AuthError>;
}

/// Performs refresh-token grants against an OAuth 2.0 token endpoint.
#[derive(Debug, Clone)]
pub struct OAuthManager {
    http_client: oauth2::reqwest::Client,
}

impl OAuthManager {
    pub fn new() -> Result<Self, AuthError> {
        let http_client = oauth2::reqwest::ClientBuilder::new()
            // SSRF no thank you.
            .redirect(oauth2::reqwest::redirect::Policy::none())
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Exchange(format!("build HTTP client: {e}")))?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl TokenSource for OAuthManager {
    /// Exchanges `refresh_token` for a new access token.
    ///
    /// An `invalid_grant` answer means the refresh token itself is no longer any good and is
    /// reported as [`AuthError::InvalidGrant`]; retrying will not help.
    #[tracing::instrument(skip_all, fields(token_uri = %client.token_uri.as_str()))]
    async fn refresh(
        &self,
        client: &OAuthClientConfig,
        refresh_token: &RefreshToken,
    ) -> Result<FreshToken, AuthError> {
        tracing::debug!("attempting to refresh OAuth token");

        let oauth_client = BasicClient::new(client.client_id.clone())
            .set_client_secret(client.client_secret.clone())
            .set_token_uri(client.token_uri.clone());

        match oauth_client
            .exchange_refresh_token(refresh_token)
            .request_async(&self.http_client)
            .await
        {
            Ok(token) => {
                tracing::debug!(
                    expires_in = ?token.expires_in(),
                    rotated = token.refresh_token().is_some(),
                    "successfully refreshed OAuth token"
                );
                Ok(FreshToken {
                    access_token: token.access_token().clone(),
                    expires_in: token.expires_in(),
                    refresh_token: token.refresh_token().cloned(),
                })
            }
            Err(ref e @ oauth2::RequestTokenError::ServerResponse(ref sr))
                if matches!(
                    sr.error(),
                    oauth2::basic::BasicErrorResponseType::InvalidGrant
                ) =>
            {
                tracing::warn!("OAuth refresh token considered invalid grant: {}", e);
                Err(AuthError::InvalidGrant(
                    sr.error_description()
                        .cloned()
                        .unwrap_or_else(|| e.to_string()),
                ))
            }
            Err(e) => Err(AuthError::Exchange(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUNDLE: &str = r#"{
        "TOKEN": "ya29.cached",
        "REFRESH_TOKEN": "1//refresh",
        "TOKEN_URI": "https://oauth2.googleapis.com/token",
        "CLIENT_ID": "client.apps.googleusercontent.com",
        "CLIENT_SECRET": "shh",
        "SCOPES": ["https://www.googleapis.com/auth/youtube.upload"],
        "EXPIRY": "2030-01-01T00:00:00.000000Z"
    }"#;

    #[test]
    fn parses_full_bundle() {
        let bundle = CredentialBundle::from_json(BUNDLE).unwrap();
        assert_eq!(bundle.access_token.unwrap().secret(), "ya29.cached");
        assert_eq!(bundle.refresh_token.secret(), "1//refresh");
        assert_eq!(
            bundle.token_uri.as_str(),
            "https://oauth2.googleapis.com/token"
        );
        assert_eq!(
            bundle.expiry,
            Some("2030-01-01T00:00:00.000000Z".to_string())
        );
    }

    #[test]
    fn null_or_empty_token_is_absent() {
        let bundle = CredentialBundle::from_json(
            r#"{"TOKEN": null, "REFRESH_TOKEN": "r", "TOKEN_URI": "https://example.com/token",
                "CLIENT_ID": "c", "CLIENT_SECRET": "s"}"#,
        )
        .unwrap();
        assert!(bundle.access_token.is_none());
        assert!(bundle.expiry().is_none());

        let bundle = CredentialBundle::from_json(
            r#"{"TOKEN": "", "REFRESH_TOKEN": "r", "TOKEN_URI": "https://example.com/token",
                "CLIENT_ID": "c", "CLIENT_SECRET": "s", "EXPIRY": "yesterday"}"#,
        )
        .unwrap();
        assert!(bundle.access_token.is_none());
        assert!(bundle.expiry().is_none());
    }

    #[test]
    fn missing_refresh_token_is_an_error() {
        assert!(
            CredentialBundle::from_json(
                r#"{"TOKEN": "t", "TOKEN_URI": "https://example.com/token",
                    "CLIENT_ID": "c", "CLIENT_SECRET": "s"}"#
            )
            .is_err()
        );
    }

    #[test]
    fn debug_output_hides_secrets() {
        let bundle = CredentialBundle::from_json(BUNDLE).unwrap();
        let debug = format!("{bundle:?}");
        assert!(!debug.contains("ya29.cached"));
        assert!(!debug.contains("1//refresh"));
        assert!(!debug.contains("shh"));
    }
}
