use pretty_assertions::assert_eq;
use reqwest::Url;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use youtube_s3_uploader::model::{UploadResult, WebhookDeliveryOutcome};
use youtube_s3_uploader::webhook::{SIGNATURE_HEADER, WebhookNotifier, WebhookPayload, sign};

fn payload() -> WebhookPayload {
    WebhookPayload::succeeded(&UploadResult::new("abc123".into(), None))
}

fn hook_url(server: &MockServer) -> Url {
    Url::parse(&format!("{}/hook", server.uri())).unwrap()
}

#[tokio::test]
async fn signed_delivery() {
    let server = MockServer::start().await;
    let body = serde_json::to_vec(&payload()).unwrap();
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header("content-type", "application/json"))
        .and(header(SIGNATURE_HEADER, sign("s3cret", &body).unwrap().as_str()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = WebhookNotifier::new()
        .unwrap()
        .notify(&hook_url(&server), &payload(), Some("s3cret"))
        .await;
    assert_eq!(
        outcome,
        WebhookDeliveryOutcome {
            attempted: true,
            succeeded: true,
            status_code: Some(200),
        }
    );

    let requests = server.received_requests().await.unwrap();
    let received: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(
        received,
        json!({
            "status": "succeeded",
            "youtube_video_id": "abc123",
            "url": "https://youtu.be/abc123",
        })
    );
}

#[tokio::test]
async fn unsigned_delivery_has_no_signature() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let outcome = WebhookNotifier::new()
        .unwrap()
        .notify(&hook_url(&server), &payload(), None)
        .await;
    assert!(outcome.succeeded);

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get(SIGNATURE_HEADER).is_none());
}

#[tokio::test]
async fn error_status_is_attempted_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = WebhookNotifier::new()
        .unwrap()
        .notify(&hook_url(&server), &payload(), None)
        .await;
    assert_eq!(
        outcome,
        WebhookDeliveryOutcome {
            attempted: true,
            succeeded: false,
            status_code: Some(500),
        }
    );
}

#[tokio::test]
async fn redirects_are_not_followed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "http://169.254.169.254/"))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = WebhookNotifier::new()
        .unwrap()
        .notify(&hook_url(&server), &payload(), None)
        .await;
    assert_eq!(outcome.status_code, Some(302));
    assert!(!outcome.succeeded);
}

#[tokio::test]
async fn slow_endpoint_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let outcome = WebhookNotifier::with_timeout(Duration::from_millis(100))
        .unwrap()
        .notify(&hook_url(&server), &payload(), None)
        .await;
    assert_eq!(
        outcome,
        WebhookDeliveryOutcome {
            attempted: true,
            succeeded: false,
            status_code: None,
        }
    );
}

#[tokio::test]
async fn unreachable_endpoint_is_reported_not_raised() {
    // nothing listens on the discard port
    let url = Url::parse("http://127.0.0.1:9/hook").unwrap();
    let outcome = WebhookNotifier::with_timeout(Duration::from_secs(1))
        .unwrap()
        .notify(&url, &payload(), Some("s3cret"))
        .await;
    assert!(outcome.attempted);
    assert!(!outcome.succeeded);
    assert_eq!(outcome.status_code, None);
}
