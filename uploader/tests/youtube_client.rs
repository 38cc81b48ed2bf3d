use bytes::Bytes;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use youtube_s3_uploader::youtube_api::{
    ChunkAck, PlatformTransport, PrivacyStatus, SessionHandle, TransportError, VideoInsertRequest,
    YouTubeClient,
};

fn client(server: &MockServer) -> YouTubeClient {
    YouTubeClient::with_upload_base_url(format!("{}/upload/youtube/v3", server.uri())).unwrap()
}

fn session(server: &MockServer) -> SessionHandle {
    SessionHandle::new(format!("{}/session/xyz", server.uri()))
}

#[tokio::test]
async fn initiate_returns_location_as_session() {
    let server = MockServer::start().await;
    let location = format!("{}/session/xyz", server.uri());
    Mock::given(method("POST"))
        .and(path("/upload/youtube/v3/videos"))
        .and(query_param("uploadType", "resumable"))
        .and(query_param("part", "snippet,status"))
        .and(header("authorization", "Bearer tok"))
        .and(header("x-upload-content-length", "1000"))
        .and(header("x-upload-content-type", "video/mp4"))
        .and(body_json(json!({
            "snippet": { "title": "Tennis Match Highlights", "description": "Finals" },
            "status": { "privacyStatus": "unlisted" },
        })))
        .respond_with(ResponseTemplate::new(200).insert_header("Location", location.as_str()))
        .expect(1)
        .mount(&server)
        .await;

    let video =
        VideoInsertRequest::new("Tennis Match Highlights", "Finals", PrivacyStatus::Unlisted);
    let handle = client(&server)
        .initiate_upload("tok", &video, 1000, "video/mp4")
        .await
        .unwrap();
    assert_eq!(handle.as_str(), location);
}

#[tokio::test]
async fn initiate_without_location_is_a_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let video = VideoInsertRequest::new("t", "", PrivacyStatus::Private);
    let err = client(&server)
        .initiate_upload("tok", &video, 10, "video/mp4")
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Protocol(_)), "{err:?}");
}

#[tokio::test]
async fn initiate_quota_error_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {
                "code": 403,
                "message": "The request cannot be completed because you have exceeded your quota.",
                "errors": [{ "reason": "quotaExceeded", "message": "quota" }]
            }
        })))
        .mount(&server)
        .await;

    let video = VideoInsertRequest::new("t", "", PrivacyStatus::Private);
    let err = client(&server)
        .initiate_upload("tok", &video, 10, "video/mp4")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        TransportError::Rejected {
            status: 403,
            message: "The request cannot be completed because you have exceeded your quota. (quotaExceeded)"
                .into(),
        }
    );
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn resume_incomplete_reports_persisted_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/session/xyz"))
        .and(header("authorization", "Bearer tok"))
        .and(header("content-range", "bytes 0-9/20"))
        .respond_with(ResponseTemplate::new(308).insert_header("Range", "bytes=0-9"))
        .expect(1)
        .mount(&server)
        .await;

    let ack = client(&server)
        .upload_chunk("tok", &session(&server), 0, 20, Bytes::from_static(b"0123456789"))
        .await
        .unwrap();
    assert_eq!(ack, ChunkAck::Incomplete { received: 10 });
}

#[tokio::test]
async fn resume_incomplete_without_range_persisted_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(308))
        .mount(&server)
        .await;

    let ack = client(&server)
        .upload_chunk("tok", &session(&server), 0, 20, Bytes::from_static(b"0123456789"))
        .await
        .unwrap();
    assert_eq!(ack, ChunkAck::Incomplete { received: 0 });
}

#[tokio::test]
async fn final_chunk_returns_video() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/session/xyz"))
        .and(header("content-range", "bytes 10-19/20"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "kind": "youtube#video",
            "id": "abc123",
            "status": { "uploadStatus": "uploaded", "privacyStatus": "unlisted" }
        })))
        .mount(&server)
        .await;

    let ack = client(&server)
        .upload_chunk("tok", &session(&server), 10, 20, Bytes::from_static(b"0123456789"))
        .await
        .unwrap();
    let ChunkAck::Complete(video) = ack else {
        panic!("expected completion, got {ack:?}");
    };
    assert_eq!(video.id, "abc123");
    assert_eq!(video.upload_status(), Some("uploaded"));
}

#[tokio::test]
async fn chunk_errors_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/unauthorized"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/unavailable"))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend error"))
        .mount(&server)
        .await;
    let client = client(&server);
    let chunk = Bytes::from_static(b"0123456789");

    let err = client
        .upload_chunk(
            "tok",
            &SessionHandle::new(format!("{}/unauthorized", server.uri())),
            0,
            10,
            chunk.clone(),
        )
        .await
        .unwrap_err();
    assert_eq!(err, TransportError::Unauthorized);

    let err = client
        .upload_chunk(
            "tok",
            &SessionHandle::new(format!("{}/unavailable", server.uri())),
            0,
            10,
            chunk,
        )
        .await
        .unwrap_err();
    assert_eq!(
        err,
        TransportError::Server {
            status: 503,
            message: "backend error".into(),
        }
    );
    assert!(err.is_retryable());
}

#[tokio::test]
async fn set_thumbnail_posts_image() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/youtube/v3/thumbnails/set"))
        .and(query_param("videoId", "abc123"))
        .and(header("authorization", "Bearer tok"))
        .and(header("content-type", "image/jpeg"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "youtube#thumbnailSetResponse",
            "items": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .set_thumbnail("tok", "abc123", Bytes::from_static(b"jpeg"), "image/jpeg")
        .await
        .unwrap();
}
