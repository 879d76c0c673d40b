//! Checkpoint uploads
//!
//! Artifacts are mirrored to an object store so a run's progress survives the
//! machine it ran on. Uploads are retried a few times with growing delays;
//! a checkpoint that still fails is logged and skipped, never fatal, because
//! the local artifact already holds the data.

use crate::retry::{run_with_retry, Backoff, RetryPolicy};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Upload transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Could not read artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upload of {key} rejected with status {status}")]
    Status { status: u16, key: String },
}

pub type UploadResult<T> = std::result::Result<T, UploadError>;

/// Destination for checkpoint artifacts
#[async_trait]
pub trait UploadClient: Send + Sync {
    /// Stores the file at `local` under the remote `key`
    async fn put(&self, local: &Path, key: &str) -> UploadResult<()>;
}

const UPLOAD_ATTEMPTS: u32 = 5;

/// HTTP object-store client: artifacts go up as `PUT {endpoint}/{key}`
pub struct HttpUploadClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpUploadClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            key.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl UploadClient for HttpUploadClient {
    async fn put(&self, local: &Path, key: &str) -> UploadResult<()> {
        let body = tokio::fs::read(local).await?;
        let url = self.object_url(key);
        let backoff = Backoff::exponential(Duration::from_secs(1), Duration::from_secs(60), 1.5);

        run_with_retry(
            RetryPolicy::Bounded {
                attempts: UPLOAD_ATTEMPTS,
            },
            backoff,
            "checkpoint upload",
            || async {
                let response = self
                    .client
                    .put(&url)
                    .body(body.clone())
                    .send()
                    .await
                    .map_err(UploadError::from)?;
                let status = response.status();
                if !status.is_success() {
                    return Err(UploadError::Status {
                        status: status.as_u16(),
                        key: key.to_string(),
                    });
                }
                Ok(())
            },
        )
        .await?;
        debug!("Uploaded {} as {key}", local.display());
        Ok(())
    }
}
