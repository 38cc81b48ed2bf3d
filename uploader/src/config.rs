//! Process configuration, read once from the environment at start-up.

use eyre::Context;
use std::time::Duration;

/// YouTube requires every chunk except the last to be a multiple of this many bytes.
pub const CHUNK_GRANULARITY: usize = 256 * 1024;

pub const DEFAULT_CHUNK_SIZE: usize = 32 * CHUNK_GRANULARITY;

pub const DEFAULT_MAX_CHUNK_RETRIES: u32 = 5;

/// Tunables of the resumable upload engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    /// Bytes per chunk; a positive multiple of [`CHUNK_GRANULARITY`].
    pub chunk_size: usize,
    /// How many times a chunk is retried after a retryable failure before giving up.
    pub max_chunk_retries: u32,
    /// Delay before the first retry; doubled for every further retry.
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_chunk_retries: DEFAULT_MAX_CHUNK_RETRIES,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl UploadConfig {
    /// Delay before retry number `retry` (starting at 1).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    pub fn validate(&self) -> eyre::Result<()> {
        if self.chunk_size == 0 || self.chunk_size % CHUNK_GRANULARITY != 0 {
            eyre::bail!(
                "chunk size {} is not a positive multiple of {CHUNK_GRANULARITY} bytes",
                self.chunk_size
            );
        }
        Ok(())
    }
}

/// Everything the pipeline needs to know about its deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Bucket holding the videos named by `s3_key`.
    pub source_bucket: String,
    /// Bucket holding companion thumbnails; thumbnails are skipped when unset.
    pub thumbnail_bucket: Option<String>,
    /// Secrets Manager identifier of the YouTube credential bundle.
    pub credentials_secret_id: String,
    /// Secrets Manager identifier of the webhook signing secret; webhooks go unsigned when unset.
    pub webhook_secret_id: Option<String>,
    /// Region of the secret store; the SDK's default region chain applies when unset.
    pub secrets_region: Option<String>,
    pub upload: UploadConfig,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> eyre::Result<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required =
            |name: &str| get(name).ok_or_else(|| eyre::eyre!("{name} must be set"));

        let mut upload = UploadConfig::default();
        if let Some(size) = get("UPLOAD_CHUNK_SIZE_BYTES") {
            upload.chunk_size = size
                .trim()
                .parse()
                .with_context(|| format!("parse UPLOAD_CHUNK_SIZE_BYTES {size:?}"))?;
        }
        if let Some(retries) = get("UPLOAD_MAX_CHUNK_RETRIES") {
            upload.max_chunk_retries = retries
                .trim()
                .parse()
                .with_context(|| format!("parse UPLOAD_MAX_CHUNK_RETRIES {retries:?}"))?;
        }
        upload.validate().context("validate upload settings")?;

        Ok(Self {
            source_bucket: required("SOURCE_BUCKET")?,
            thumbnail_bucket: get("THUMBNAIL_BUCKET"),
            credentials_secret_id: required("YOUTUBE_CREDENTIALS_SECRET_ID")?,
            webhook_secret_id: get("WEBHOOK_SECRET_ID"),
            secrets_region: get("SECRETS_REGION"),
            upload,
        })
    }
}
