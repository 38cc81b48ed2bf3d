use oauth2::{ClientId, ClientSecret, RefreshToken, TokenUrl};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use youtube_s3_uploader::oauth::{AuthError, OAuthClientConfig, OAuthManager, TokenSource};

fn client_config(server: &MockServer) -> OAuthClientConfig {
    OAuthClientConfig {
        client_id: ClientId::new("client.apps.googleusercontent.com".into()),
        client_secret: ClientSecret::new("shh".into()),
        token_uri: TokenUrl::new(format!("{}/token", server.uri())).unwrap(),
    }
}

#[tokio::test]
async fn refresh_exchanges_refresh_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=1%2F%2Frefresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.fresh",
            "expires_in": 3599,
            "scope": "https://www.googleapis.com/auth/youtube.upload",
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let fresh = OAuthManager::new()
        .unwrap()
        .refresh(&client_config(&server), &RefreshToken::new("1//refresh".into()))
        .await
        .unwrap();
    assert_eq!(fresh.access_token.secret(), "ya29.fresh");
    assert_eq!(fresh.expires_in, Some(Duration::from_secs(3599)));
    assert!(fresh.refresh_token.is_none());
}

#[tokio::test]
async fn revoked_refresh_token_is_invalid_grant() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Token has been expired or revoked."
        })))
        .mount(&server)
        .await;

    let err = OAuthManager::new()
        .unwrap()
        .refresh(&client_config(&server), &RefreshToken::new("revoked".into()))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        AuthError::InvalidGrant("Token has been expired or revoked.".into())
    );
}

#[tokio::test]
async fn token_endpoint_outage_is_an_exchange_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let err = OAuthManager::new()
        .unwrap()
        .refresh(&client_config(&server), &RefreshToken::new("r".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Exchange(_)), "{err:?}");
}
