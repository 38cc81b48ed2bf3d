//! YouTube Videos API types.

use serde::{Deserialize, Serialize};

/// Privacy status of an uploaded video.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos#status.privacyStatus>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyStatus {
    Public,
    Unlisted,
    Private,
}

/// Request body for the `videos.insert` call that opens a resumable upload.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos/insert>
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoInsertRequest {
    pub snippet: VideoSnippet,
    pub status: VideoStatus,
}

/// Basic details about a video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSnippet {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoStatus {
    #[serde(rename = "privacyStatus")]
    pub privacy_status: PrivacyStatus,
}

impl VideoInsertRequest {
    pub fn new(title: &str, description: &str, privacy_status: PrivacyStatus) -> Self {
        Self {
            snippet: VideoSnippet {
                title: title.to_string(),
                description: description.to_string(),
            },
            status: VideoStatus { privacy_status },
        }
    }
}

/// The `video` resource returned once an upload completes.
///
/// Only the fields this crate reads are modelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedVideo {
    /// The ID that YouTube uses to uniquely identify the video.
    pub id: String,
    #[serde(default)]
    pub status: Option<UploadedVideoStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedVideoStatus {
    /// `uploaded`, `processed`, `failed`, `rejected` or `deleted`.
    #[serde(rename = "uploadStatus")]
    pub upload_status: Option<String>,
}

impl UploadedVideo {
    pub fn upload_status(&self) -> Option<&str> {
        self.status.as_ref()?.upload_status.as_deref()
    }
}
