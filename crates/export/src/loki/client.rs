//! HTTP transport towards the Loki push endpoint.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors pushing one batch
#[derive(Debug, Error)]
pub enum PushError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Loki answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to encode push request: {0}")]
    Compress(#[from] snap::Error),
}

/// One push attempt; retries live in the batcher.
#[async_trait]
pub trait Pusher: Send + Sync {
    async fn push(&self, body: Vec<u8>) -> Result<(), PushError>;
}

/// reqwest-backed pusher
pub struct HttpPusher {
    client: reqwest::Client,
    url: String,
    tenant_id: String,
}

impl HttpPusher {
    pub fn new(url: String, tenant_id: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url,
            tenant_id,
        })
    }
}

#[async_trait]
impl Pusher for HttpPusher {
    async fn push(&self, body: Vec<u8>) -> Result<(), PushError> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/x-protobuf")
            .body(body);
        if !self.tenant_id.is_empty() {
            request = request.header("X-Scope-OrgID", &self.tenant_id);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(PushError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
