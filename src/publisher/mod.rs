//!
//! Downstream publisher for the ingestion API.
//!
//! Batches are posted as JSON. Transient HTTP failures inside one publish
//! attempt are retried with exponential backoff; a publish that still fails
//! propagates to the pipeline, which keeps its checkpoint where it was and
//! replays the batch on resubscription.

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Error types for downstream publishing
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("batch rejected with status {status}: {detail}")]
    Rejected { status: u16, detail: String },
}

/// Boundary trait for the downstream ingestion service.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish one batch. An `Ok` return means the batch is durably accepted
    /// downstream and the caller may advance its checkpoint.
    async fn publish(
        &self,
        resource_path: &str,
        batch: &[serde_json::Value],
    ) -> Result<(), PublishError>;

    /// Publish one batch and have the downstream persist `cursor` atomically
    /// with accepting it.
    async fn publish_with_checkpoint(
        &self,
        resource_path: &str,
        batch: &[serde_json::Value],
        cursor: &str,
    ) -> Result<(), PublishError>;
}

/// HTTP implementation of the downstream publisher
pub struct HttpPublisher {
    http_client: Client,
    base_url: String,
}

impl HttpPublisher {
    pub fn new(base_url: String) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// In-attempt retry policy: a short bounded window so a flapping
    /// downstream does not hold the pipeline's batch forever.
    fn retry_policy() -> ExponentialBackoff {
        ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(15)),
            ..ExponentialBackoff::default()
        }
    }

    async fn post_batch(
        &self,
        resource_path: &str,
        batch: &[serde_json::Value],
        checkpoint: Option<&str>,
    ) -> Result<(), PublishError> {
        let url = format!("{}/{}", self.base_url, resource_path);

        retry(Self::retry_policy(), || async {
            let mut request = self.http_client.post(&url).json(batch);
            if let Some(cursor) = checkpoint {
                request = request.query(&[("checkpoint", cursor)]);
            }

            let response = request.send().await.map_err(|e| {
                warn!("Publish send error for {}: {}", resource_path, e);
                backoff::Error::transient(PublishError::Http(e))
            })?;

            let status = response.status();
            if status.is_success() {
                debug!("Published {} rows to {}", batch.len(), resource_path);
                return Ok(());
            }

            let detail = response.text().await.unwrap_or_default();
            let rejected = PublishError::Rejected {
                status: status.as_u16(),
                detail,
            };
            if status.is_server_error() || status.as_u16() == 429 {
                warn!("Publish to {} failed with {}, retrying", resource_path, status);
                Err(backoff::Error::transient(rejected))
            } else {
                Err(backoff::Error::permanent(rejected))
            }
        })
        .await
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(
        &self,
        resource_path: &str,
        batch: &[serde_json::Value],
    ) -> Result<(), PublishError> {
        self.post_batch(resource_path, batch, None).await
    }

    async fn publish_with_checkpoint(
        &self,
        resource_path: &str,
        batch: &[serde_json::Value],
        cursor: &str,
    ) -> Result<(), PublishError> {
        self.post_batch(resource_path, batch, Some(cursor)).await
    }
}
