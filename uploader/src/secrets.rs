//! Secret retrieval from AWS Secrets Manager.
//!
//! Secrets are fetched at most once per invocation and cached in memory for its remaining
//! lifetime. Nothing is written anywhere.

use crate::oauth::CredentialBundle;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_secretsmanager::Client as SecretsClient;
use aws_sdk_secretsmanager::config::Region;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecretError {
    #[error("secret {0} not found")]
    NotFound(String),

    #[error("access denied to secret {0}")]
    AccessDenied(String),

    #[error("secret {name} has an invalid format: {reason}")]
    InvalidFormat { name: String, reason: String },

    #[error("secret store error: {0}")]
    Backend(String),
}

/// Something that can look up secret strings by identifier.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn get_secret(&self, secret_id: &str) -> Result<String, SecretError>;
}

/// Fetches the credential bundle stored under `secret_id`.
pub async fn load_credentials(
    provider: &dyn SecretProvider,
    secret_id: &str,
) -> Result<CredentialBundle, SecretError> {
    let raw = provider.get_secret(secret_id).await?;
    CredentialBundle::from_json(&raw).map_err(|e| SecretError::InvalidFormat {
        name: secret_id.to_string(),
        reason: e.to_string(),
    })
}

#[derive(Deserialize)]
struct WebhookSecretDocument {
    #[serde(rename = "WEBHOOK_SECRET")]
    webhook_secret: String,
}

/// Fetches the webhook signing secret stored under `secret_id`.
///
/// The secret may be a JSON object with a `WEBHOOK_SECRET` key, or just the raw secret.
pub async fn load_webhook_secret(
    provider: &dyn SecretProvider,
    secret_id: &str,
) -> Result<String, SecretError> {
    let raw = provider.get_secret(secret_id).await?;
    let secret = match serde_json::from_str::<WebhookSecretDocument>(&raw) {
        Ok(doc) => doc.webhook_secret,
        Err(_) if raw.trim_start().starts_with('{') => {
            return Err(SecretError::InvalidFormat {
                name: secret_id.to_string(),
                reason: "JSON secret has no WEBHOOK_SECRET string".to_string(),
            });
        }
        Err(_) => raw.trim().to_string(),
    };
    if secret.is_empty() {
        return Err(SecretError::InvalidFormat {
            name: secret_id.to_string(),
            reason: "secret is empty".to_string(),
        });
    }
    Ok(secret)
}

/// AWS Secrets Manager client with an invocation-lifetime cache.
pub struct SecretsManagerProvider {
    client: SecretsClient,
    cache: Mutex<HashMap<String, String>>,
}

impl SecretsManagerProvider {
    /// Creates a provider using the default AWS credential chain.
    ///
    /// `region` overrides the region from the environment when given.
    pub async fn new(region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let config = loader.load().await;
        tracing::debug!(region = ?config.region(), "initialized Secrets Manager client");
        Self::from_client(SecretsClient::new(&config))
    }

    pub fn from_client(client: SecretsClient) -> Self {
        Self {
            client,
            cache: Mutex::new(HashMap::new()),
        }
    }

    async fn fetch(&self, secret_id: &str) -> Result<String, SecretError> {
        let response = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.as_service_error();
                if service_error.is_some_and(|se| se.is_resource_not_found_exception()) {
                    SecretError::NotFound(secret_id.to_string())
                } else if service_error.is_some_and(|se| se.is_decryption_failure()) {
                    SecretError::AccessDenied(secret_id.to_string())
                } else if e.to_string().contains("AccessDenied") {
                    SecretError::AccessDenied(secret_id.to_string())
                } else {
                    SecretError::Backend(aws_sdk_secretsmanager::error::DisplayErrorContext(&e).to_string())
                }
            })?;

        response
            .secret_string()
            .map(str::to_string)
            .ok_or_else(|| SecretError::InvalidFormat {
                name: secret_id.to_string(),
                reason: "secret is binary, not a string".to_string(),
            })
    }
}

#[async_trait]
impl SecretProvider for SecretsManagerProvider {
    #[tracing::instrument(skip(self))]
    async fn get_secret(&self, secret_id: &str) -> Result<String, SecretError> {
        let mut cache = self.cache.lock().await;
        if let Some(value) = cache.get(secret_id) {
            tracing::trace!("secret served from cache");
            return Ok(value.clone());
        }

        tracing::debug!("fetching secret from AWS Secrets Manager");
        let value = self.fetch(secret_id).await?;
        cache.insert(secret_id.to_string(), value.clone());
        Ok(value)
    }
}
