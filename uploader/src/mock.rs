//! In-memory stand-ins for the external systems the pipeline talks to.
//!
//! Each fake records what was asked of it so tests can assert on the exact sequence of calls.

use crate::oauth::{AuthError, CredentialBundle, FreshToken, OAuthClientConfig, TokenSource};
use crate::secrets::{SecretError, SecretProvider};
use crate::storage::{ObjectFetcher, StorageError, StoredObject};
use crate::youtube_api::{
    ChunkAck, PlatformTransport, SessionHandle, TransportError, UploadedVideo, VideoInsertRequest,
};
use async_trait::async_trait;
use bytes::Bytes;
use oauth2::{AccessToken, RefreshToken};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// A credential bundle for `client-id` whose refresh token is `refresh-0`.
///
/// `token` is an optional `(access token, RFC 3339 expiry)` pair.
pub fn bundle_with_token(token: Option<(&str, &str)>) -> CredentialBundle {
    let mut json = serde_json::json!({
        "REFRESH_TOKEN": "refresh-0",
        "TOKEN_URI": "https://oauth2.example/token",
        "CLIENT_ID": "client-id",
        "CLIENT_SECRET": "client-secret",
    });
    if let Some((access_token, expiry)) = token {
        json["TOKEN"] = access_token.into();
        json["EXPIRY"] = expiry.into();
    }
    CredentialBundle::from_json(&json.to_string()).expect("test bundle is well-formed")
}

/// Opens `data` as if it had been fetched from a store.
pub fn stored_object(data: &[u8]) -> StoredObject {
    StoredObject {
        body: Box::pin(std::io::Cursor::new(data.to_vec())),
        content_length: data.len() as u64,
        content_type: Some("video/mp4".to_string()),
    }
}

#[derive(Debug, Clone, Copy)]
enum RefreshBehavior {
    Succeed,
    Fail,
    Rotate,
}

/// A token endpoint that mints `fresh-N` access tokens.
#[derive(Debug)]
pub struct FakeTokenSource {
    behavior: RefreshBehavior,
    calls: AtomicU32,
    seen: Mutex<Vec<String>>,
}

impl FakeTokenSource {
    fn new(behavior: RefreshBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(RefreshBehavior::Succeed)
    }

    /// Rejects every refresh token with `invalid_grant`.
    pub fn failing() -> Self {
        Self::new(RefreshBehavior::Fail)
    }

    /// Issues a new `rotated-N` refresh token with every access token.
    pub fn rotating() -> Self {
        Self::new(RefreshBehavior::Rotate)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// The refresh tokens presented so far, in order.
    pub fn refresh_tokens_seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenSource for FakeTokenSource {
    async fn refresh(
        &self,
        _client: &OAuthClientConfig,
        refresh_token: &RefreshToken,
    ) -> Result<FreshToken, AuthError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen
            .lock()
            .unwrap()
            .push(refresh_token.secret().clone());

        let refresh_token = match self.behavior {
            RefreshBehavior::Fail => {
                return Err(AuthError::InvalidGrant("Token has been expired or revoked.".into()));
            }
            RefreshBehavior::Succeed => None,
            RefreshBehavior::Rotate => Some(RefreshToken::new(format!("rotated-{n}"))),
        };
        Ok(FreshToken {
            access_token: AccessToken::new(format!("fresh-{n}")),
            expires_in: Some(Duration::from_secs(3599)),
            refresh_token,
        })
    }
}

/// A fixed set of secrets.
#[derive(Debug, Default)]
pub struct StaticSecrets {
    secrets: HashMap<String, String>,
    lookups: Mutex<Vec<String>>,
}

impl StaticSecrets {
    pub fn with(mut self, secret_id: &str, value: &str) -> Self {
        self.secrets.insert(secret_id.to_string(), value.to_string());
        self
    }

    /// The identifiers looked up so far, in order.
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl SecretProvider for StaticSecrets {
    async fn get_secret(&self, secret_id: &str) -> Result<String, SecretError> {
        self.lookups.lock().unwrap().push(secret_id.to_string());
        self.secrets
            .get(secret_id)
            .cloned()
            .ok_or_else(|| SecretError::NotFound(secret_id.to_string()))
    }
}

/// A bucket store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryObjects {
    objects: HashMap<(String, String), Vec<u8>>,
    declared_lengths: HashMap<(String, String), u64>,
    fetches: Mutex<Vec<String>>,
}

impl InMemoryObjects {
    pub fn with(mut self, bucket: &str, key: &str, data: &[u8]) -> Self {
        self.objects
            .insert((bucket.to_string(), key.to_string()), data.to_vec());
        self
    }

    /// Stores `data` but declares it `declared_length` bytes long, so its stream ends early.
    pub fn with_truncated(
        mut self,
        bucket: &str,
        key: &str,
        data: &[u8],
        declared_length: u64,
    ) -> Self {
        self.declared_lengths
            .insert((bucket.to_string(), key.to_string()), declared_length);
        self.with(bucket, key, data)
    }

    /// The `bucket/key` paths fetched so far, in order.
    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectFetcher for InMemoryObjects {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<StoredObject, StorageError> {
        self.fetches.lock().unwrap().push(format!("{bucket}/{key}"));
        let id = (bucket.to_string(), key.to_string());
        match self.objects.get(&id) {
            None => Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Some(data) if data.is_empty() => Err(StorageError::Empty {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Some(data) => {
                let mut object = stored_object(data);
                if let Some(&declared) = self.declared_lengths.get(&id) {
                    object.content_length = declared;
                }
                Ok(object)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Initiate {
        token: String,
        title: String,
        content_length: u64,
    },
    Chunk {
        token: String,
        offset: u64,
        len: usize,
    },
    Thumbnail {
        token: String,
        video_id: String,
        len: usize,
    },
}

#[derive(Debug, Default)]
struct TransportState {
    calls: Vec<TransportCall>,
    declared_length: Option<u64>,
    persisted: Vec<u8>,
    initiate_failure: Option<TransportError>,
    chunk_script: VecDeque<Option<TransportError>>,
    chunk_failure: Option<TransportError>,
    thumbnail_failure: Option<TransportError>,
    persist_cap: Option<usize>,
}

/// A scripted video platform.
///
/// Without a script it behaves like YouTube: it persists whatever it is sent, answers with the
/// persisted byte count, and creates the video once every declared byte has arrived.
#[derive(Debug)]
pub struct FakeTransport {
    video_id: String,
    state: Mutex<TransportState>,
}

impl FakeTransport {
    /// A platform that will assign `video_id` to the uploaded video.
    pub fn new(video_id: &str) -> Self {
        Self {
            video_id: video_id.to_string(),
            state: Mutex::new(TransportState::default()),
        }
    }

    /// Fails upload initiation with `error`.
    pub fn failing_initiation(self, error: TransportError) -> Self {
        self.state.lock().unwrap().initiate_failure = Some(error);
        self
    }

    /// Scripts the outcome of the first chunk calls: `Some(error)` fails that call, `None`
    /// lets it through.
    pub fn with_chunk_script(
        self,
        script: impl IntoIterator<Item = Option<TransportError>>,
    ) -> Self {
        self.state.lock().unwrap().chunk_script = script.into_iter().collect();
        self
    }

    /// Fails every chunk call (after the script runs out) with `error`.
    pub fn always_failing_chunks(self, error: TransportError) -> Self {
        self.state.lock().unwrap().chunk_failure = Some(error);
        self
    }

    /// Persists at most `cap` bytes of each chunk, like a platform under load.
    pub fn persisting_at_most(self, cap: usize) -> Self {
        self.state.lock().unwrap().persist_cap = Some(cap);
        self
    }

    pub fn failing_thumbnail(self, error: TransportError) -> Self {
        self.state.lock().unwrap().thumbnail_failure = Some(error);
        self
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// `(offset, len)` of every chunk call, in order.
    pub fn chunk_calls(&self) -> Vec<(u64, usize)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Chunk { offset, len, .. } => Some((offset, len)),
                _ => None,
            })
            .collect()
    }

    /// Bearer token of every chunk call, in order.
    pub fn chunk_tokens(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Chunk { token, .. } => Some(token),
                _ => None,
            })
            .collect()
    }

    /// Video ids thumbnails were set for.
    pub fn thumbnails(&self) -> Vec<(String, usize)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Thumbnail { video_id, len, .. } => Some((video_id, len)),
                _ => None,
            })
            .collect()
    }

    /// The bytes persisted so far.
    pub fn persisted(&self) -> Vec<u8> {
        self.state.lock().unwrap().persisted.clone()
    }

    /// The content length announced at initiation.
    pub fn declared_length(&self) -> Option<u64> {
        self.state.lock().unwrap().declared_length
    }
}

#[async_trait]
impl PlatformTransport for FakeTransport {
    async fn initiate_upload(
        &self,
        access_token: &str,
        video: &VideoInsertRequest,
        content_length: u64,
        _content_type: &str,
    ) -> Result<SessionHandle, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(TransportCall::Initiate {
            token: access_token.to_string(),
            title: video.snippet.title.clone(),
            content_length,
        });
        if let Some(error) = state.initiate_failure.clone() {
            return Err(error);
        }
        state.declared_length = Some(content_length);
        Ok(SessionHandle::new("https://upload.example/session/1"))
    }

    async fn upload_chunk(
        &self,
        access_token: &str,
        _session: &SessionHandle,
        offset: u64,
        total_length: u64,
        chunk: Bytes,
    ) -> Result<ChunkAck, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(TransportCall::Chunk {
            token: access_token.to_string(),
            offset,
            len: chunk.len(),
        });
        if let Some(Some(error)) = state.chunk_script.pop_front() {
            return Err(error);
        }
        if let Some(error) = state.chunk_failure.clone() {
            return Err(error);
        }

        let persisted = state.persisted.len() as u64;
        if offset != persisted {
            return Err(TransportError::Rejected {
                status: 400,
                message: format!("chunk starts at {offset} but {persisted} bytes are persisted"),
            });
        }
        let take = state.persist_cap.map_or(chunk.len(), |cap| cap.min(chunk.len()));
        state.persisted.extend_from_slice(&chunk[..take]);

        let received = state.persisted.len() as u64;
        if received == total_length {
            let video: UploadedVideo = serde_json::from_value(serde_json::json!({
                "id": self.video_id,
                "status": { "uploadStatus": "uploaded" },
            }))
            .expect("video resource is well-formed");
            Ok(ChunkAck::Complete(video))
        } else {
            Ok(ChunkAck::Incomplete { received })
        }
    }

    async fn set_thumbnail(
        &self,
        access_token: &str,
        video_id: &str,
        image: Bytes,
        _content_type: &str,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(TransportCall::Thumbnail {
            token: access_token.to_string(),
            video_id: video_id.to_string(),
            len: image.len(),
        });
        match state.thumbnail_failure.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
