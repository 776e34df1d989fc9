//! Remote object store access.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} for {path}")]
    Status { status: u16, path: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One object in a remote listing.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteEntry {
    pub name: String,
    pub size: u64,
    pub checksum: String,
}

/// Listing and retrieval operations against the upload target that log files
/// are delivered to.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError>;

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<(), RemoteError>;
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    files: Vec<RemoteEntry>,
}

/// HTTP-fronted object store with account/key header authentication.
pub struct HttpRemoteStore {
    base_url: String,
    account: String,
    key: String,
    client: reqwest::Client,
}

impl HttpRemoteStore {
    pub fn new(base_url: &str, account: &str, key: &str) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            account: account.to_string(),
            key: key.to_string(),
            client,
        })
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        let response = self
            .client
            .get(self.url_for(path))
            .query(&[("action", "list")])
            .header("X-Storage-Account", &self.account)
            .header("X-Storage-Key", &self.key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }

        let listing: ListResponse = response.json().await?;
        Ok(listing.files)
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<(), RemoteError> {
        let response = self
            .client
            .get(self.url_for(remote_path))
            .header("X-Storage-Account", &self.account)
            .header("X-Storage-Key", &self.key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                path: remote_path.to_string(),
            });
        }

        let bytes = response.bytes().await?;
        tokio::fs::write(local_path, &bytes).await?;
        Ok(())
    }
}
