//! Authoritative DNS record snapshots.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum RecordsError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("records API returned status {status} for page {page}")]
    Status { status: u16, page: u32 },
}

/// One record set captured at snapshot time.
#[derive(Debug, Clone, PartialEq)]
pub struct DnsRecord {
    pub name: String,
    pub record_type: String,
    pub ttl: u32,
    pub rdata: Vec<String>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    metadata: PageMetadata,
    recordsets: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct PageMetadata {
    page: u32,
    #[serde(rename = "lastPage")]
    last_page: u32,
}

#[derive(Debug, Deserialize)]
struct RecordSet {
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    ttl: u32,
    rdata: Vec<String>,
}

/// Pages through the zone's record sets.
pub struct RecordsClient {
    base_url: String,
    zone: String,
    token: String,
    client: reqwest::Client,
}

impl RecordsClient {
    pub fn new(base_url: &str, zone: &str, token: &str) -> Result<Self, RecordsError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            zone: zone.to_string(),
            token: token.to_string(),
            client,
        })
    }

    /// Fetch every record set in the zone. Malformed entries are skipped
    /// with a warning. If a later page fails, the records gathered so far
    /// are returned alongside the error so a partial snapshot can still be
    /// delivered.
    pub async fn fetch_all(&self) -> (Vec<DnsRecord>, Option<RecordsError>) {
        let mut records = Vec::new();
        let mut page = 1u32;

        loop {
            let response = match self.fetch_page(page).await {
                Ok(response) => response,
                Err(e) => return (records, Some(e)),
            };

            let fetched_at = Utc::now();
            for raw in response.recordsets {
                match serde_json::from_value::<RecordSet>(raw) {
                    Ok(set) => records.push(DnsRecord {
                        name: set.name,
                        record_type: set.record_type,
                        ttl: set.ttl,
                        rdata: set.rdata,
                        fetched_at,
                    }),
                    Err(e) => {
                        tracing::warn!(zone = %self.zone, page, error = %e, "Skipping malformed record set");
                    }
                }
            }

            if response.metadata.page >= response.metadata.last_page {
                return (records, None);
            }
            page = response.metadata.page + 1;
        }
    }

    async fn fetch_page(&self, page: u32) -> Result<PageResponse, RecordsError> {
        let url = format!("{}/zones/{}/recordsets", self.base_url, self.zone);
        let response = self
            .client
            .get(url)
            .query(&[("page", page)])
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RecordsError::Status {
                status: status.as_u16(),
                page,
            });
        }

        Ok(response.json().await?)
    }
}
