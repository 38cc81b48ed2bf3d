//! Error taxonomy for a pipeline invocation.
//!
//! Every fatal failure ends up as a [`PipelineError`], which maps onto a stable
//! [`ErrorKind`] string that callers can branch on. Webhook delivery problems are
//! deliberately absent here: they only ever show up in a
//! [`WebhookDeliveryOutcome`](crate::model::WebhookDeliveryOutcome).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable, machine-readable classification of a failed invocation.
///
/// The serialized form (the variant name) is part of the response contract and
/// must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidRequest,
    ObjectNotFound,
    StorageFailure,
    SecretUnavailable,
    AuthRefreshFailure,
    UploadChunkFailure,
    PlatformRejection,
    NetworkTimeout,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::ObjectNotFound => "ObjectNotFound",
            ErrorKind::StorageFailure => "StorageFailure",
            ErrorKind::SecretUnavailable => "SecretUnavailable",
            ErrorKind::AuthRefreshFailure => "AuthRefreshFailure",
            ErrorKind::UploadChunkFailure => "UploadChunkFailure",
            ErrorKind::PlatformRejection => "PlatformRejection",
            ErrorKind::NetworkTimeout => "NetworkTimeout",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fatal pipeline failure.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("object s3://{bucket}/{key} does not exist")]
    ObjectNotFound { bucket: String, key: String },

    #[error("bucket store failure: {0}")]
    StorageFailure(String),

    #[error("credentials unavailable: {0}")]
    SecretUnavailable(String),

    #[error("OAuth token refresh failed: {0}")]
    AuthRefreshFailure(String),

    #[error("chunk upload at offset {offset} failed after {attempts} attempt(s): {reason}")]
    UploadChunkFailure {
        offset: u64,
        attempts: u32,
        reason: String,
    },

    #[error("YouTube rejected the request: {0}")]
    PlatformRejection(String),

    #[error("network failure during {step}: {message}")]
    NetworkTimeout { step: &'static str, message: String },
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            PipelineError::ObjectNotFound { .. } => ErrorKind::ObjectNotFound,
            PipelineError::StorageFailure(_) => ErrorKind::StorageFailure,
            PipelineError::SecretUnavailable(_) => ErrorKind::SecretUnavailable,
            PipelineError::AuthRefreshFailure(_) => ErrorKind::AuthRefreshFailure,
            PipelineError::UploadChunkFailure { .. } => ErrorKind::UploadChunkFailure,
            PipelineError::PlatformRejection(_) => ErrorKind::PlatformRejection,
            PipelineError::NetworkTimeout { .. } => ErrorKind::NetworkTimeout,
        }
    }
}

impl From<crate::oauth::AuthError> for PipelineError {
    fn from(e: crate::oauth::AuthError) -> Self {
        PipelineError::AuthRefreshFailure(e.to_string())
    }
}

impl From<crate::secrets::SecretError> for PipelineError {
    fn from(e: crate::secrets::SecretError) -> Self {
        PipelineError::SecretUnavailable(e.to_string())
    }
}

impl From<crate::storage::StorageError> for PipelineError {
    fn from(e: crate::storage::StorageError) -> Self {
        match e {
            crate::storage::StorageError::NotFound { bucket, key } => {
                PipelineError::ObjectNotFound { bucket, key }
            }
            other => PipelineError::StorageFailure(other.to_string()),
        }
    }
}
