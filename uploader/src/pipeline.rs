//! One invocation, end to end.
//!
//! validate → fetch object → load credentials → acquire token → upload → thumbnail →
//! webhook → response.
//!
//! The first fatal error short-circuits to the failure response. The thumbnail and the webhook
//! are best-effort: nothing that goes wrong with either changes the response.

use crate::config::Config;
use crate::error::PipelineError;
use crate::model::{self, InvocationReport, InvocationResponse, UploadRequest, UploadResult};
use crate::oauth::{OAuthManager, TokenSource};
use crate::secrets::{self, SecretProvider, SecretsManagerProvider};
use crate::storage::{self, ObjectFetcher, S3ObjectFetcher, StorageError};
use crate::token::TokenManager;
use crate::upload::UploadEngine;
use crate::webhook::{WebhookNotifier, WebhookPayload};
use crate::youtube_api::{PlatformTransport, VideoInsertRequest, YouTubeClient};
use bytes::Bytes;
use eyre::Context;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::instrument;

/// YouTube refuses custom thumbnails larger than this.
pub const MAX_THUMBNAIL_BYTES: u64 = 2 * 1024 * 1024;

const DEFAULT_THUMBNAIL_CONTENT_TYPE: &str = "image/jpeg";

/// The upload pipeline and the collaborators it drives.
pub struct Pipeline {
    config: Config,
    secrets: Arc<dyn SecretProvider>,
    objects: Arc<dyn ObjectFetcher>,
    transport: Arc<dyn PlatformTransport>,
    token_source: Arc<dyn TokenSource>,
    notifier: WebhookNotifier,
}

impl Pipeline {
    pub fn new(
        config: Config,
        secrets: Arc<dyn SecretProvider>,
        objects: Arc<dyn ObjectFetcher>,
        transport: Arc<dyn PlatformTransport>,
        token_source: Arc<dyn TokenSource>,
        notifier: WebhookNotifier,
    ) -> Self {
        Self {
            config,
            secrets,
            objects,
            transport,
            token_source,
            notifier,
        }
    }

    /// Wires the pipeline to AWS, YouTube and Google's token endpoint.
    pub async fn from_config(config: Config) -> eyre::Result<Self> {
        let secrets = SecretsManagerProvider::new(config.secrets_region.clone()).await;
        let objects = S3ObjectFetcher::from_env().await;
        let transport = YouTubeClient::new().wrap_err("create YouTube client")?;
        let token_source = OAuthManager::new().wrap_err("create OAuth client")?;
        let notifier = WebhookNotifier::new().wrap_err("create webhook client")?;
        Ok(Self::new(
            config,
            Arc::new(secrets),
            Arc::new(objects),
            Arc::new(transport),
            Arc::new(token_source),
            notifier,
        ))
    }

    /// Handles one invocation event.
    ///
    /// Never fails: every error is folded into the returned response.
    #[instrument(skip_all)]
    pub async fn handle(&self, event: Value) -> InvocationReport {
        let request = match UploadRequest::deserialize(&event) {
            Ok(request) => request,
            Err(e) => {
                let error = PipelineError::InvalidRequest(format!("malformed request: {e}"));
                tracing::error!(%error, "rejecting invocation");
                return self.reject_malformed(&event, error).await;
            }
        };
        let callback = match request.callback_url() {
            Ok(callback) => callback,
            Err(error) => {
                tracing::error!(%error, "rejecting invocation");
                return InvocationReport {
                    response: InvocationResponse::from(&error),
                    webhook: None,
                };
            }
        };

        tracing::info!(s3_key = %request.s3_key, title = %request.title, "handling upload request");
        let outcome = self.run(&request).await;
        let (response, payload) = match &outcome {
            Ok(result) => (
                InvocationResponse::from(result),
                WebhookPayload::succeeded(result),
            ),
            Err(error) => {
                tracing::error!(%error, kind = %error.kind(), "upload pipeline failed");
                (
                    InvocationResponse::from(error),
                    WebhookPayload::failed(&request.s3_key, error),
                )
            }
        };

        let webhook = match callback {
            Some(url) => Some(self.deliver(&url, &payload).await),
            None => None,
        };
        InvocationReport { response, webhook }
    }

    /// Answers an event that isn't a well-formed request.
    ///
    /// The caller still hears about it if the event carries a usable `webhook_url`.
    async fn reject_malformed(&self, event: &Value, error: PipelineError) -> InvocationReport {
        let callback = event
            .get("webhook_url")
            .and_then(Value::as_str)
            .and_then(|raw| model::parse_callback_url(raw).ok());
        let webhook = match callback {
            Some(url) => {
                let s3_key = event.get("s3_key").and_then(Value::as_str).unwrap_or_default();
                let payload = WebhookPayload::failed(s3_key, &error);
                Some(self.deliver(&url, &payload).await)
            }
            None => None,
        };
        InvocationReport {
            response: InvocationResponse::from(&error),
            webhook,
        }
    }

    async fn run(&self, request: &UploadRequest) -> Result<UploadResult, PipelineError> {
        request.validate()?;

        let object = self
            .objects
            .fetch(&self.config.source_bucket, &request.s3_key)
            .await?;
        tracing::info!(content_length = object.content_length, "opened source object");

        let bundle =
            secrets::load_credentials(self.secrets.as_ref(), &self.config.credentials_secret_id)
                .await?;
        let mut tokens = TokenManager::new(&bundle, self.token_source.clone());
        tokens.get_valid_token().await?;

        let video = VideoInsertRequest::new(
            &request.title,
            &request.description,
            request.privacy_status,
        );
        let result = UploadEngine::new(self.transport.as_ref(), &mut tokens, &self.config.upload)
            .upload(&video, object)
            .await?;

        if let Some(bucket) = &self.config.thumbnail_bucket {
            self.attach_thumbnail(bucket, &request.s3_key, &result.video_id, &mut tokens)
                .await;
        }
        Ok(result)
    }

    /// Sets the companion thumbnail of `video_key` on the uploaded video, if there is one.
    #[instrument(skip(self, tokens))]
    async fn attach_thumbnail(
        &self,
        bucket: &str,
        video_key: &str,
        video_id: &str,
        tokens: &mut TokenManager,
    ) {
        let key = storage::thumbnail_key(video_key);
        let object = match self.objects.fetch(bucket, &key).await {
            Ok(object) => object,
            Err(StorageError::NotFound { .. }) => {
                tracing::debug!(%key, "no thumbnail");
                return;
            }
            Err(e) => {
                tracing::warn!(%key, error = %e, "could not fetch thumbnail, skipping it");
                return;
            }
        };
        if object.content_length > MAX_THUMBNAIL_BYTES {
            tracing::warn!(
                %key,
                size = object.content_length,
                "thumbnail exceeds {MAX_THUMBNAIL_BYTES} bytes, skipping it"
            );
            return;
        }

        let content_type = object
            .content_type
            .clone()
            .unwrap_or_else(|| DEFAULT_THUMBNAIL_CONTENT_TYPE.to_string());
        let mut image = Vec::with_capacity(object.content_length as usize);
        let mut body = object.body.take(MAX_THUMBNAIL_BYTES);
        if let Err(e) = body.read_to_end(&mut image).await {
            tracing::warn!(%key, error = %e, "could not read thumbnail, skipping it");
            return;
        }
        if image.len() as u64 != object.content_length {
            tracing::warn!(
                %key,
                read = image.len(),
                expected = object.content_length,
                "thumbnail stream ended early, skipping it"
            );
            return;
        }
        let image = Bytes::from(image);

        let transport = self.transport.as_ref();
        let outcome = tokens
            .authorized(async |token: String| {
                transport
                    .set_thumbnail(&token, video_id, image.clone(), &content_type)
                    .await
            })
            .await;
        match outcome {
            Ok(Ok(())) => tracing::info!(%key, "thumbnail set"),
            Ok(Err(e)) => tracing::warn!(%key, error = %e, "could not set thumbnail"),
            Err(e) => tracing::warn!(%key, error = %e, "could not set thumbnail"),
        }
    }

    /// Sends the completion callback, signed if a webhook secret is configured and loadable.
    async fn deliver(
        &self,
        url: &Url,
        payload: &WebhookPayload,
    ) -> crate::model::WebhookDeliveryOutcome {
        let secret = match &self.config.webhook_secret_id {
            Some(secret_id) => {
                match secrets::load_webhook_secret(self.secrets.as_ref(), secret_id).await {
                    Ok(secret) => Some(secret),
                    Err(e) => {
                        tracing::warn!(error = %e, "webhook secret unavailable, sending unsigned");
                        None
                    }
                }
            }
            None => None,
        };
        self.notifier.notify(url, payload, secret.as_deref()).await
    }
}
