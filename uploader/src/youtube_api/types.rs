//! Shared wire types for the YouTube API client.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The session URI returned when a resumable upload is initiated.
///
/// All chunks of the upload are `PUT` to this URI. It stays valid for about a week, but this
/// crate never reuses one across invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle(String);

impl SessionHandle {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error body returned by Google APIs.
///
/// See: <https://developers.google.com/youtube/v3/docs/errors>
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiError,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: u16,
    pub message: String,
    #[serde(default)]
    pub errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub reason: Option<String>,
    pub message: Option<String>,
}

impl ApiErrorResponse {
    /// Extracts a human-readable message from an error response body.
    ///
    /// Falls back to the raw body when it isn't a Google error document.
    pub fn message_from_body(body: &str) -> String {
        match serde_json::from_str::<ApiErrorResponse>(body) {
            Ok(parsed) => {
                let reason = parsed.error.errors.iter().find_map(|e| e.reason.as_deref());
                match reason {
                    Some(reason) => format!("{} ({reason})", parsed.error.message),
                    None => parsed.error.message,
                }
            }
            Err(_) if body.trim().is_empty() => "no response body".to_string(),
            Err(_) => body.trim().to_string(),
        }
    }
}

/// Parses the `Range` header of a `308 Resume Incomplete` response into the number of bytes
/// the server has persisted.
///
/// YouTube always reports a single range starting at zero (`bytes=0-524287`). A missing header
/// means nothing has been persisted yet.
pub fn persisted_bytes(range_header: Option<&str>) -> Result<u64, String> {
    let Some(range) = range_header else {
        return Ok(0);
    };
    let spec = range
        .trim()
        .strip_prefix("bytes=")
        .ok_or_else(|| format!("unsupported Range header {range:?}"))?;
    let (start, end) = spec
        .split_once('-')
        .ok_or_else(|| format!("malformed Range header {range:?}"))?;
    if start.trim() != "0" {
        return Err(format!("Range header {range:?} does not start at byte 0"));
    }
    let end: u64 = end
        .trim()
        .parse()
        .map_err(|_| format!("malformed Range header {range:?}"))?;
    Ok(end + 1)
}

/// Formats the `Content-Range` header for a chunk.
///
/// `len` must be non-zero.
pub fn content_range(offset: u64, len: u64, total: u64) -> String {
    format!("bytes {}-{}/{}", offset, offset + len - 1, total)
}
