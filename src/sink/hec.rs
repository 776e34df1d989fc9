//! HTTP event collector sink.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::time::Duration;

use super::{Sink, SinkError};
use crate::config::types::HecConfig;
use crate::dns::DnsRecord;
use crate::logs::parser::LogEvent;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const SOURCE_NAME: &str = "logship";

/// Batches events and POSTs them to an event-collector endpoint.
///
/// Log events and record snapshots are queued separately so each can carry
/// its own token, sourcetype, index, and batch size.
pub struct HecSink {
    config: HecConfig,
    client: reqwest::Client,
    url: String,
    host: String,
    event_queue: Vec<String>,
    record_queue: Vec<String>,
}

impl HecSink {
    pub fn new(config: HecConfig) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let scheme = if config.use_ssl { "https" } else { "http" };
        let url = format!(
            "{}://{}:{}/services/collector/event",
            scheme, config.host, config.port
        );
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());

        Ok(Self {
            config,
            client,
            url,
            host,
            event_queue: Vec::new(),
            record_queue: Vec::new(),
        })
    }

    async fn post_batch(&self, payload: String, token: &str) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Splunk {token}"))
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Status(status.as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl Sink for HecSink {
    fn add_log_event(&mut self, event: LogEvent) {
        let payload = event_payload(
            &event,
            &self.host,
            self.config.sourcetype.as_deref(),
            self.config.index.as_deref(),
        );
        self.event_queue.push(payload.to_string());
    }

    fn add_dns_record(&mut self, record: DnsRecord) {
        let payload = record_payload(
            &record,
            &self.host,
            self.config.record_sourcetype.as_deref(),
            self.config.record_index.as_deref(),
        );
        self.record_queue.push(payload.to_string());
    }

    async fn publish_log_events(&mut self, force: bool) -> Result<bool, SinkError> {
        if !should_publish(self.event_queue.len(), self.config.batch_size, force) {
            return Ok(false);
        }

        let payload = self.event_queue.join("\n");
        let token = self.config.token.clone();
        self.post_batch(payload, &token).await?;

        tracing::debug!(count = self.event_queue.len(), "Published log event batch");
        self.event_queue.clear();
        Ok(true)
    }

    async fn publish_dns_records(&mut self, force: bool) -> Result<bool, SinkError> {
        if !should_publish(self.record_queue.len(), self.config.record_batch_size, force) {
            return Ok(false);
        }

        let token = self
            .config
            .record_token
            .clone()
            .unwrap_or_else(|| self.config.token.clone());
        let payload = self.record_queue.join("\n");
        self.post_batch(payload, &token).await?;

        tracing::debug!(count = self.record_queue.len(), "Published record batch");
        self.record_queue.clear();
        Ok(true)
    }

    fn clear(&mut self) {
        self.event_queue.clear();
        self.record_queue.clear();
    }
}

/// Queued items are sent only when the batch is full, unless forced. An
/// empty queue is never published, forced or not.
fn should_publish(queued: usize, batch_size: usize, force: bool) -> bool {
    queued > 0 && (queued >= batch_size || force)
}

fn event_payload(
    event: &LogEvent,
    host: &str,
    sourcetype: Option<&str>,
    index: Option<&str>,
) -> Value {
    let mut payload = json!({
        "time": epoch_seconds(&event.timestamp),
        "host": host,
        "source": SOURCE_NAME,
        "event": event.line,
    });
    attach_routing(&mut payload, sourcetype, index);
    payload
}

fn record_payload(
    record: &DnsRecord,
    host: &str,
    sourcetype: Option<&str>,
    index: Option<&str>,
) -> Value {
    let mut payload = json!({
        "time": epoch_seconds(&record.fetched_at),
        "host": host,
        "source": SOURCE_NAME,
        "event": {
            "name": record.name,
            "type": record.record_type,
            "ttl": record.ttl,
            "rdata": record.rdata,
        },
    });
    attach_routing(&mut payload, sourcetype, index);
    payload
}

fn attach_routing(payload: &mut Value, sourcetype: Option<&str>, index: Option<&str>) {
    if let Some(object) = payload.as_object_mut() {
        if let Some(sourcetype) = sourcetype {
            object.insert("sourcetype".to_string(), json!(sourcetype));
        }
        if let Some(index) = index {
            object.insert("index".to_string(), json!(index));
        }
    }
}

fn epoch_seconds(timestamp: &DateTime<Utc>) -> f64 {
    timestamp.timestamp_millis() as f64 / 1000.0
}
