//! YouTube Data API v3 upload surface.
//!
//! The upload engine never talks HTTP directly. It drives a [`PlatformTransport`], which
//! [`YouTubeClient`] implements on top of `reqwest`, and which tests replace with an
//! in-memory fake.
//!
//! # The resumable upload protocol
//!
//! 1. `POST /upload/youtube/v3/videos?uploadType=resumable` with the video metadata. The
//!    `Location` response header is the session URI.
//! 2. `PUT <session URI>` one chunk at a time with a `Content-Range` header. While the upload
//!    is incomplete YouTube answers `308 Resume Incomplete` with a `Range` header naming the
//!    bytes it has persisted so far.
//! 3. The chunk that completes the upload is answered with `200`/`201` and the new `video`
//!    resource.
//!
//! <https://developers.google.com/youtube/v3/guides/using_resumable_upload_protocol>

use async_trait::async_trait;
use bytes::Bytes;

pub mod client;
pub mod types;
pub mod videos;

pub use client::YouTubeClient;
pub use types::{ApiErrorResponse, SessionHandle};
pub use videos::{PrivacyStatus, UploadedVideo, VideoInsertRequest, VideoSnippet, VideoStatus};

/// What the platform said about a chunk it accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkAck {
    /// The upload is not finished; `received` bytes (counted from zero) are persisted.
    Incomplete { received: u64 },
    /// The upload is finished and the video resource has been created.
    Complete(UploadedVideo),
}

/// A failed platform call, classified by how the caller should react to it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// HTTP 401: the access token was not accepted.
    #[error("access token was rejected")]
    Unauthorized,

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Network(String),

    /// HTTP 5xx.
    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// HTTP 4xx other than 401.
    #[error("rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The platform answered, but not in a way the protocol allows.
    #[error("unexpected response: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Whether repeating the same request unchanged may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Timeout(_) | TransportError::Network(_) | TransportError::Server { .. }
        )
    }

    /// Classifies a non-success HTTP status.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = ApiErrorResponse::message_from_body(body);
        match status {
            401 => TransportError::Unauthorized,
            500..=599 => TransportError::Server { status, message },
            _ => TransportError::Rejected { status, message },
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_decode() {
            TransportError::Protocol(e.to_string())
        } else {
            TransportError::Network(e.to_string())
        }
    }
}

/// The calls the upload pipeline makes against the video platform.
///
/// Every method takes the bearer token explicitly so that token refresh stays the
/// responsibility of [`TokenManager`](crate::token::TokenManager).
#[async_trait]
pub trait PlatformTransport: Send + Sync {
    /// Opens a resumable upload session for a video of `content_length` bytes.
    async fn initiate_upload(
        &self,
        access_token: &str,
        video: &VideoInsertRequest,
        content_length: u64,
        content_type: &str,
    ) -> Result<SessionHandle, TransportError>;

    /// Sends `chunk`, which starts at byte `offset` of a `total_length`-byte upload.
    async fn upload_chunk(
        &self,
        access_token: &str,
        session: &SessionHandle,
        offset: u64,
        total_length: u64,
        chunk: Bytes,
    ) -> Result<ChunkAck, TransportError>;

    /// Sets the custom thumbnail of an uploaded video.
    async fn set_thumbnail(
        &self,
        access_token: &str,
        video_id: &str,
        image: Bytes,
        content_type: &str,
    ) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(TransportError::from_status(401, ""), TransportError::Unauthorized);
        assert!(TransportError::from_status(503, "").is_retryable());
        assert!(!TransportError::from_status(403, "").is_retryable());
        assert!(!TransportError::from_status(429, "").is_retryable());
        assert!(!TransportError::Unauthorized.is_retryable());
        assert!(TransportError::Timeout("slow".into()).is_retryable());
    }

    #[test]
    fn rejection_carries_api_message() {
        let body = r#"{"error":{"code":403,"message":"The request cannot be completed because you have exceeded your quota.","errors":[{"reason":"quotaExceeded"}]}}"#;
        assert_eq!(
            TransportError::from_status(403, body),
            TransportError::Rejected {
                status: 403,
                message: "The request cannot be completed because you have exceeded your quota. (quotaExceeded)".into(),
            }
        );
    }
}
