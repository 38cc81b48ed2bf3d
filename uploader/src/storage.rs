//! Bucket-store access for video and thumbnail objects.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use std::fmt;
use std::pin::Pin;
use tokio::io::AsyncRead;
use tracing::instrument;

/// A sequential, read-once stream of object bytes.
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object s3://{bucket}/{key} does not exist")]
    NotFound { bucket: String, key: String },

    #[error("object s3://{bucket}/{key} is empty")]
    Empty { bucket: String, key: String },

    #[error("object stream ended after {read} of {expected} bytes")]
    Truncated { read: u64, expected: u64 },

    #[error("reading object failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("S3 error: {0}")]
    Backend(String),
}

/// An object opened for reading.
pub struct StoredObject {
    pub body: ByteStream,
    /// Length the store declared for the object.
    pub content_length: u64,
    pub content_type: Option<String>,
}

impl fmt::Debug for StoredObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredObject")
            .field("content_length", &self.content_length)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Opens objects in a bucket store for streaming reads.
#[async_trait]
pub trait ObjectFetcher: Send + Sync {
    /// Opens `bucket/key`, failing with [`StorageError::NotFound`] if it doesn't exist.
    ///
    /// The returned body is not buffered: bytes are pulled from the store as it is read.
    async fn fetch(&self, bucket: &str, key: &str) -> Result<StoredObject, StorageError>;
}

/// Derives the thumbnail key for a video key by swapping its extension for `.jpg`.
///
/// `videos/match.mp4` becomes `videos/match.jpg`; a key without an extension gets one
/// appended.
pub fn thumbnail_key(video_key: &str) -> String {
    let (dir, file) = match video_key.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, video_key),
    };
    let stem = match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file,
    };
    match dir {
        Some(dir) => format!("{dir}/{stem}.jpg"),
        None => format!("{stem}.jpg"),
    }
}

/// [`ObjectFetcher`] backed by Amazon S3.
#[derive(Debug, Clone)]
pub struct S3ObjectFetcher {
    client: Client,
}

impl S3ObjectFetcher {
    /// Creates a fetcher using the default AWS configuration chain.
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self::new(Client::new(&config))
    }

    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectFetcher for S3ObjectFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, bucket: &str, key: &str) -> Result<StoredObject, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if let aws_sdk_s3::error::SdkError::ServiceError(ref service_err) = err {
                    if service_err.err().is_no_such_key() || service_err.raw().status().as_u16() == 404
                    {
                        return StorageError::NotFound {
                            bucket: bucket.to_string(),
                            key: key.to_string(),
                        };
                    }
                }
                StorageError::Backend(aws_sdk_s3::error::DisplayErrorContext(&err).to_string())
            })?;

        let content_length = output
            .content_length()
            .and_then(|len| u64::try_from(len).ok())
            .ok_or_else(|| StorageError::Backend("object has no content length".to_string()))?;
        if content_length == 0 {
            return Err(StorageError::Empty {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        let content_type = output.content_type().map(str::to_string);

        tracing::debug!(content_length, ?content_type, "opened object");
        Ok(StoredObject {
            body: Box::pin(output.body.into_async_read()),
            content_length,
            content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thumbnail_keys() {
        assert_eq!(thumbnail_key("videos/match.mp4"), "videos/match.jpg");
        assert_eq!(thumbnail_key("match.mov"), "match.jpg");
        assert_eq!(thumbnail_key("a/b/c.final.mp4"), "a/b/c.final.jpg");
        assert_eq!(thumbnail_key("videos/raw"), "videos/raw.jpg");
        assert_eq!(thumbnail_key("videos/.hidden"), "videos/.hidden.jpg");
    }
}
