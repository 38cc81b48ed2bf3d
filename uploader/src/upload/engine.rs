use super::session::UploadSession;
use crate::config::UploadConfig;
use crate::error::PipelineError;
use crate::model::UploadResult;
use crate::storage::{ByteStream, StorageError, StoredObject};
use crate::token::TokenManager;
use crate::youtube_api::{
    ChunkAck, PlatformTransport, SessionHandle, TransportError, VideoInsertRequest,
};
use bytes::{Bytes, BytesMut};
use tokio::io::AsyncReadExt;
use tracing::{Instrument, instrument};

/// Content type announced for objects the store has no type for.
pub const DEFAULT_CONTENT_TYPE: &str = "video/*";

/// Streams one object into a resumable upload session.
///
/// At most one chunk is held in memory at a time. Bytes the platform has not acknowledged are
/// carried over into the next chunk, so nothing is read from the store twice and nothing the
/// platform already persisted is sent again.
pub struct UploadEngine<'a> {
    transport: &'a dyn PlatformTransport,
    tokens: &'a mut TokenManager,
    config: &'a UploadConfig,
}

impl<'a> UploadEngine<'a> {
    pub fn new(
        transport: &'a dyn PlatformTransport,
        tokens: &'a mut TokenManager,
        config: &'a UploadConfig,
    ) -> Self {
        Self {
            transport,
            tokens,
            config,
        }
    }

    /// Uploads `object` as a new video described by `video`.
    #[instrument(skip_all, fields(total_length = object.content_length))]
    pub async fn upload(
        &mut self,
        video: &VideoInsertRequest,
        object: StoredObject,
    ) -> Result<UploadResult, PipelineError> {
        let StoredObject {
            body,
            content_length,
            content_type,
        } = object;
        let content_type = content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE);

        let handle = self.initiate(video, content_length, content_type).await?;
        let mut session = UploadSession::new(handle, content_length);
        tracing::info!(chunk_size = self.config.chunk_size, "upload session opened");

        match self.transfer(&mut session, body).await {
            Ok(result) => {
                tracing::info!(video_id = %result.video_id, "upload complete");
                Ok(result)
            }
            Err(e) => {
                // transfer only fails while the session is still open
                let _ = session.fail(e.to_string());
                tracing::error!(
                    error = %e,
                    acknowledged = session.acknowledged(),
                    "upload failed"
                );
                Err(e)
            }
        }
    }

    async fn initiate(
        &mut self,
        video: &VideoInsertRequest,
        content_length: u64,
        content_type: &str,
    ) -> Result<SessionHandle, PipelineError> {
        let transport = self.transport;
        let outcome = self
            .tokens
            .authorized(async |token: String| {
                transport
                    .initiate_upload(&token, video, content_length, content_type)
                    .await
            })
            .instrument(tracing::debug_span!("initiate"))
            .await?;

        outcome.map_err(|e| match e {
            e if e.is_retryable() => PipelineError::NetworkTimeout {
                step: "upload initiation",
                message: e.to_string(),
            },
            TransportError::Rejected { status, message } => {
                PipelineError::PlatformRejection(format!("HTTP {status}: {message}"))
            }
            other => PipelineError::PlatformRejection(other.to_string()),
        })
    }

    async fn transfer(
        &mut self,
        session: &mut UploadSession,
        mut body: ByteStream,
    ) -> Result<UploadResult, PipelineError> {
        let total = session.total_length();
        let mut carry = Bytes::new();

        loop {
            let offset = session.acknowledged();
            let len = usize::try_from(session.remaining())
                .unwrap_or(usize::MAX)
                .min(self.config.chunk_size);
            let chunk = read_chunk(&mut body, carry, len).await?;
            if chunk.len() < len {
                return Err(StorageError::Truncated {
                    read: offset + chunk.len() as u64,
                    expected: total,
                }
                .into());
            }

            let end = offset + chunk.len() as u64;
            match self.send_chunk(session.handle(), offset, total, &chunk).await? {
                ChunkAck::Complete(video) => {
                    if end != total {
                        return Err(PipelineError::UploadChunkFailure {
                            offset,
                            attempts: 1,
                            reason: format!(
                                "platform finished the upload after only {end} of {total} bytes"
                            ),
                        });
                    }
                    let upload_status = video.upload_status().map(str::to_string);
                    session
                        .complete(video.id.clone())
                        .map_err(|e| protocol_violation(offset, e))?;
                    return Ok(UploadResult::new(video.id, upload_status));
                }
                ChunkAck::Incomplete { received } => {
                    if received > end {
                        return Err(protocol_violation(
                            offset,
                            format!("platform acknowledged {received} bytes but only {end} were sent"),
                        ));
                    }
                    session
                        .acknowledge(received)
                        .map_err(|e| protocol_violation(offset, e))?;
                    if received == total {
                        return Err(protocol_violation(
                            offset,
                            "platform persisted every byte but returned no video",
                        ));
                    }
                    tracing::debug!(received, total, "chunk acknowledged");
                    // offset <= received <= end, so this is within the chunk
                    carry = chunk.slice((received - offset) as usize..);
                }
            }
        }
    }

    /// Sends one chunk, retrying retryable failures from the same offset with backoff.
    ///
    /// An acknowledgement that persists nothing of the chunk counts as a retryable failure.
    /// The chunk gets one forced token refresh across all of its attempts; a 401 after that is
    /// fatal.
    #[instrument(skip(self, session, chunk), fields(len = chunk.len()))]
    async fn send_chunk(
        &mut self,
        session: &SessionHandle,
        offset: u64,
        total: u64,
        chunk: &Bytes,
    ) -> Result<ChunkAck, PipelineError> {
        let transport = self.transport;
        let mut attempt = 0;
        let mut refreshed = false;
        loop {
            attempt += 1;
            let outcome = self
                .tokens
                .authorized_within(&mut refreshed, async |token: String| {
                    transport
                        .upload_chunk(&token, session, offset, total, chunk.clone())
                        .await
                })
                .await?;

            let reason = match outcome {
                Ok(ChunkAck::Incomplete { received }) if received == offset => {
                    "platform persisted none of the chunk".to_string()
                }
                Ok(ack) => return Ok(ack),
                Err(e) if e.is_retryable() => e.to_string(),
                Err(TransportError::Rejected { status, message }) => {
                    return Err(PipelineError::PlatformRejection(format!(
                        "HTTP {status}: {message}"
                    )));
                }
                Err(e) => {
                    return Err(PipelineError::UploadChunkFailure {
                        offset,
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                }
            };

            if attempt > self.config.max_chunk_retries {
                return Err(PipelineError::UploadChunkFailure {
                    offset,
                    attempts: attempt,
                    reason,
                });
            }
            let delay = self.config.backoff(attempt);
            tracing::warn!(attempt, ?delay, %reason, "chunk upload failed, retrying");
            tokio::time::sleep(delay).await;
        }
    }
}

fn protocol_violation(offset: u64, reason: impl ToString) -> PipelineError {
    PipelineError::UploadChunkFailure {
        offset,
        attempts: 1,
        reason: reason.to_string(),
    }
}

/// Builds a chunk of up to `len` bytes from `carry` followed by fresh bytes from `body`.
///
/// The result is shorter than `len` only if `body` ended early.
async fn read_chunk(body: &mut ByteStream, carry: Bytes, len: usize) -> Result<Bytes, StorageError> {
    if carry.len() >= len {
        return Ok(carry.slice(..len));
    }

    let mut buf = BytesMut::with_capacity(len);
    buf.extend_from_slice(&carry);
    let mut filled = buf.len();
    buf.resize(len, 0);
    while filled < len {
        let n = body.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf.freeze())
}
