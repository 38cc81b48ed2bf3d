//! `reqwest`-backed implementation of the upload calls.

use crate::youtube_api::types::{content_range, persisted_bytes};
use crate::youtube_api::{
    ChunkAck, PlatformTransport, SessionHandle, TransportError, UploadedVideo, VideoInsertRequest,
};
use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, StatusCode, header};
use std::time::Duration;
use tracing::instrument;

/// Base URL of the media upload endpoints.
pub const UPLOAD_BASE_URL: &str = "https://www.googleapis.com/upload/youtube/v3";

/// Per-request timeout. Generous because a single chunk can be many megabytes.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the YouTube Data API v3 upload endpoints.
///
/// The client holds no credentials; every call is given the bearer token to use.
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    client: reqwest::Client,
    upload_base_url: String,
}

impl YouTubeClient {
    /// Creates a client talking to the production API.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_upload_base_url(UPLOAD_BASE_URL)
    }

    /// Creates a client whose upload endpoints live under `upload_base_url`.
    pub fn with_upload_base_url(upload_base_url: impl Into<String>) -> Result<Self, TransportError> {
        let client = reqwest::ClientBuilder::new()
            // SSRF no thank you. Also keeps reqwest from treating `308 Resume Incomplete`
            // as a redirect.
            .redirect(reqwest::redirect::Policy::none())
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Network(format!("build HTTP client: {e}")))?;
        Ok(Self {
            client,
            upload_base_url: upload_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Sends an authenticated request and turns any non-success status into a
    /// [`TransportError`].
    ///
    /// `308` is passed through as a success since the resumable protocol uses it for
    /// "keep going".
    #[instrument(skip(self, access_token, build), level = tracing::Level::TRACE)]
    async fn send_authenticated(
        &self,
        method: Method,
        url: &str,
        access_token: &str,
        build: impl FnOnce(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, TransportError> {
        let request = self
            .client
            .request(method.clone(), url)
            .bearer_auth(access_token);

        let response = build(request).send().await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::PERMANENT_REDIRECT {
            return Ok(response);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        tracing::debug!(%method, %status, body = %error_text, "YouTube API request failed");
        Err(TransportError::from_status(status.as_u16(), &error_text))
    }
}

#[async_trait]
impl PlatformTransport for YouTubeClient {
    /// Opens a resumable upload session.
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/v3/guides/using_resumable_upload_protocol#Start_Resumable_Session>
    #[instrument(skip(self, access_token, video), fields(title = %video.snippet.title))]
    async fn initiate_upload(
        &self,
        access_token: &str,
        video: &VideoInsertRequest,
        content_length: u64,
        content_type: &str,
    ) -> Result<SessionHandle, TransportError> {
        let url = format!(
            "{}/videos?uploadType=resumable&part=snippet,status",
            self.upload_base_url
        );

        let response = self
            .send_authenticated(Method::POST, &url, access_token, |req| {
                req.header("X-Upload-Content-Length", content_length)
                    .header("X-Upload-Content-Type", content_type)
                    .json(video)
            })
            .await?;

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                TransportError::Protocol("upload session response has no Location header".into())
            })?;

        tracing::debug!(session = %location, "opened resumable upload session");
        Ok(SessionHandle::new(location))
    }

    /// Uploads one chunk of the video.
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/v3/guides/using_resumable_upload_protocol#Upload_Video_Chunks>
    #[instrument(skip(self, access_token, session, chunk), fields(len = chunk.len()))]
    async fn upload_chunk(
        &self,
        access_token: &str,
        session: &SessionHandle,
        offset: u64,
        total_length: u64,
        chunk: Bytes,
    ) -> Result<ChunkAck, TransportError> {
        let range = content_range(offset, chunk.len() as u64, total_length);

        let response = self
            .send_authenticated(Method::PUT, session.as_str(), access_token, |req| {
                req.header(header::CONTENT_LENGTH, chunk.len())
                    .header(header::CONTENT_RANGE, range)
                    .body(chunk)
            })
            .await?;

        if response.status() == StatusCode::PERMANENT_REDIRECT {
            let range = response
                .headers()
                .get(header::RANGE)
                .map(|v| v.to_str())
                .transpose()
                .map_err(|_| TransportError::Protocol("Range header is not ASCII".into()))?;
            let received = persisted_bytes(range).map_err(TransportError::Protocol)?;
            tracing::trace!(received, "chunk acknowledged");
            return Ok(ChunkAck::Incomplete { received });
        }

        let video: UploadedVideo = response.json().await?;
        tracing::debug!(video_id = %video.id, "upload completed");
        Ok(ChunkAck::Complete(video))
    }

    /// Sets a custom thumbnail on an uploaded video.
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/v3/docs/thumbnails/set>
    #[instrument(skip(self, access_token, image), fields(len = image.len()))]
    async fn set_thumbnail(
        &self,
        access_token: &str,
        video_id: &str,
        image: Bytes,
        content_type: &str,
    ) -> Result<(), TransportError> {
        let url = format!("{}/thumbnails/set", self.upload_base_url);
        self.send_authenticated(Method::POST, &url, access_token, |req| {
            req.query(&[("videoId", video_id)])
                .header(header::CONTENT_TYPE, content_type)
                .body(image)
        })
        .await?;
        tracing::debug!(video_id, "thumbnail set");
        Ok(())
    }
}
