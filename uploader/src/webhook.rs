//! Best-effort completion callbacks.

use crate::error::{ErrorKind, PipelineError};
use crate::model::{UploadResult, WebhookDeliveryOutcome};
use hmac::{Hmac, Mac};
use reqwest::Url;
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::instrument;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature, formatted `sha256=<hex>`.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

/// Body of a completion callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WebhookPayload {
    Succeeded {
        youtube_video_id: String,
        url: String,
    },
    Failed {
        s3_key: String,
        error: String,
        error_kind: ErrorKind,
    },
}

impl WebhookPayload {
    pub fn succeeded(result: &UploadResult) -> Self {
        WebhookPayload::Succeeded {
            youtube_video_id: result.video_id.clone(),
            url: result.url.clone(),
        }
    }

    pub fn failed(s3_key: &str, error: &PipelineError) -> Self {
        WebhookPayload::Failed {
            s3_key: s3_key.to_string(),
            error: error.to_string(),
            error_kind: error.kind(),
        }
    }
}

/// Computes the `sha256=<hex>` signature of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Delivers completion callbacks.
///
/// Delivery is a single attempt and never fails the invocation: whatever happens is reported
/// in the returned [`WebhookDeliveryOutcome`].
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeout(WEBHOOK_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::ClientBuilder::new()
            // SSRF no thank you
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// POSTs `payload` to `url`, signing the body when a `secret` is given.
    #[instrument(skip(self, payload, secret), fields(%url, signed = secret.is_some()))]
    pub async fn notify(
        &self,
        url: &Url,
        payload: &WebhookPayload,
        secret: Option<&str>,
    ) -> WebhookDeliveryOutcome {
        let body = match serde_json::to_vec(payload) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "could not serialize webhook payload");
                return WebhookDeliveryOutcome::default();
            }
        };

        let mut request = self
            .client
            .post(url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = secret {
            match sign(secret, &body) {
                Some(signature) => request = request.header(SIGNATURE_HEADER, signature),
                None => tracing::warn!("could not sign webhook body, sending it unsigned"),
            }
        }

        match request.body(body).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    tracing::info!(%status, "webhook delivered");
                } else {
                    tracing::warn!(%status, "webhook endpoint answered with an error");
                }
                WebhookDeliveryOutcome {
                    attempted: true,
                    succeeded: status.is_success(),
                    status_code: Some(status.as_u16()),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "webhook delivery failed");
                WebhookDeliveryOutcome {
                    attempted: true,
                    succeeded: false,
                    status_code: None,
                }
            }
        }
    }
}
