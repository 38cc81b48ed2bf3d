//! Invocation input and output types.

use crate::error::{ErrorKind, PipelineError};
use crate::youtube_api::PrivacyStatus;
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// YouTube refuses titles longer than this many characters.
pub const MAX_TITLE_CHARS: usize = 100;

/// YouTube refuses descriptions longer than this many bytes.
pub const MAX_DESCRIPTION_BYTES: usize = 5000;

/// A request to publish one video object.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos#properties>
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    /// Key of the video object in the source bucket.
    pub s3_key: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub privacy_status: PrivacyStatus,
    /// Where to POST a notification once the invocation reaches a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

impl UploadRequest {
    /// Parses the callback URL, if one was given.
    ///
    /// Only absolute `http` and `https` URLs are accepted.
    pub fn callback_url(&self) -> Result<Option<Url>, PipelineError> {
        self.webhook_url.as_deref().map(parse_callback_url).transpose()
    }

    /// Checks the request against YouTube's metadata constraints.
    ///
    /// Runs before any network call is made.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: String| Err(PipelineError::InvalidRequest(msg));

        if self.s3_key.trim().is_empty() {
            return invalid("s3_key must not be empty".into());
        }
        if self.s3_key.starts_with('/') {
            return invalid(format!("s3_key {:?} must not start with '/'", self.s3_key));
        }

        if self.title.trim().is_empty() {
            return invalid("title must not be empty".into());
        }
        let title_chars = self.title.chars().count();
        if title_chars > MAX_TITLE_CHARS {
            return invalid(format!(
                "title is {title_chars} characters long, at most {MAX_TITLE_CHARS} are allowed"
            ));
        }
        if self.title.contains(['<', '>']) {
            return invalid("title must not contain '<' or '>'".into());
        }

        if self.description.len() > MAX_DESCRIPTION_BYTES {
            return invalid(format!(
                "description is {} bytes long, at most {MAX_DESCRIPTION_BYTES} are allowed",
                self.description.len()
            ));
        }
        if self.description.contains(['<', '>']) {
            return invalid("description must not contain '<' or '>'".into());
        }

        self.callback_url()?;
        Ok(())
    }
}

/// The outcome of a completed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub video_id: String,
    pub url: String,
    /// `uploadStatus` as reported by YouTube in the final acknowledgement, if any.
    pub upload_status: Option<String>,
}

impl UploadResult {
    pub fn new(video_id: String, upload_status: Option<String>) -> Self {
        Self {
            url: canonical_url(&video_id),
            video_id,
            upload_status,
        }
    }
}

/// Short link for a YouTube video.
/// Parses a webhook URL, accepting only absolute `http` and `https` URLs.
pub fn parse_callback_url(raw: &str) -> Result<Url, PipelineError> {
    let url = Url::parse(raw).map_err(|e| {
        PipelineError::InvalidRequest(format!("webhook_url {raw:?} is not a valid URL: {e}"))
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(PipelineError::InvalidRequest(format!(
            "webhook_url must use http or https, not {other}"
        ))),
    }
}

pub fn canonical_url(video_id: &str) -> String {
    format!("https://youtu.be/{video_id}")
}

/// Result of the (single) webhook delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct WebhookDeliveryOutcome {
    pub attempted: bool,
    pub succeeded: bool,
    pub status_code: Option<u16>,
}

/// The JSON document returned by an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InvocationResponse {
    Success {
        youtube_video_id: String,
        url: String,
    },
    Failure {
        error: String,
        error_kind: ErrorKind,
    },
}

impl InvocationResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, InvocationResponse::Success { .. })
    }
}

impl From<&UploadResult> for InvocationResponse {
    fn from(result: &UploadResult) -> Self {
        InvocationResponse::Success {
            youtube_video_id: result.video_id.clone(),
            url: result.url.clone(),
        }
    }
}

impl From<&PipelineError> for InvocationResponse {
    fn from(error: &PipelineError) -> Self {
        InvocationResponse::Failure {
            error: error.to_string(),
            error_kind: error.kind(),
        }
    }
}

/// Everything an invocation produced.
///
/// Only `response` is returned to the caller; `webhook` is kept for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationReport {
    pub response: InvocationResponse,
    pub webhook: Option<WebhookDeliveryOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn request() -> UploadRequest {
        UploadRequest {
            s3_key: "videos/match.mp4".into(),
            title: "Tennis Match Highlights".into(),
            description: String::new(),
            privacy_status: PrivacyStatus::Unlisted,
            webhook_url: None,
        }
    }

    #[test]
    fn parses_minimal_request() {
        let parsed: UploadRequest = serde_json::from_value(json!({
            "s3_key": "videos/match.mp4",
            "title": "Tennis Match Highlights",
            "privacy_status": "unlisted"
        }))
        .unwrap();
        assert_eq!(parsed, request());
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn rejects_unknown_privacy_status() {
        let parsed = serde_json::from_value::<UploadRequest>(json!({
            "s3_key": "videos/match.mp4",
            "title": "t",
            "privacy_status": "secret"
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn validation_rules() {
        let mut r = request();
        r.s3_key = "  ".into();
        assert_eq!(r.validate().unwrap_err().kind(), ErrorKind::InvalidRequest);

        let mut r = request();
        r.s3_key = "/videos/match.mp4".into();
        assert!(r.validate().is_err());

        let mut r = request();
        r.title = "x".repeat(MAX_TITLE_CHARS);
        assert!(r.validate().is_ok());
        r.title.push('x');
        assert!(r.validate().is_err());

        let mut r = request();
        r.title = "<script>".into();
        assert!(r.validate().is_err());

        let mut r = request();
        r.description = "é".repeat(MAX_DESCRIPTION_BYTES / 2 + 1);
        assert!(r.validate().is_err());

        let mut r = request();
        r.webhook_url = Some("ftp://example.com/hook".into());
        assert!(r.validate().is_err());

        let mut r = request();
        r.webhook_url = Some("not a url".into());
        assert!(r.callback_url().is_err());

        let mut r = request();
        r.webhook_url = Some("https://example.com/hook".into());
        assert_eq!(
            r.callback_url().unwrap().map(|u| u.to_string()),
            Some("https://example.com/hook".to_string())
        );
    }

    #[test]
    fn response_shapes() {
        let ok = InvocationResponse::from(&UploadResult::new("abc123".into(), None));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"youtube_video_id": "abc123", "url": "https://youtu.be/abc123"})
        );

        let err = InvocationResponse::from(&PipelineError::ObjectNotFound {
            bucket: "b".into(),
            key: "k".into(),
        });
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"error": "object s3://b/k does not exist", "error_kind": "ObjectNotFound"})
        );
    }
}
