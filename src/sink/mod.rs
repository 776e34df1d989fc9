//! Delivery destinations for log events and record snapshots.

pub mod hec;
pub mod syslog;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::types::{Config, SinkType};
use crate::dns::DnsRecord;
use crate::logs::parser::LogEvent;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("destination returned status {0}")]
    Status(u16),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Buffered destination with separate queues for log events and record
/// snapshots.
///
/// `publish_*` returns `Ok(true)` when queued items were sent (and the queue
/// drained), `Ok(false)` when batching held them back. On `Err` the queue is
/// left intact so the caller can retry or discard via [`Sink::clear`].
#[async_trait]
pub trait Sink: Send {
    fn add_log_event(&mut self, event: LogEvent);

    fn add_dns_record(&mut self, record: DnsRecord);

    async fn publish_log_events(&mut self, force: bool) -> Result<bool, SinkError>;

    async fn publish_dns_records(&mut self, force: bool) -> Result<bool, SinkError>;

    /// Drop everything queued but not yet published.
    fn clear(&mut self);
}

/// Build the configured sink. Validation guarantees the matching section is
/// present.
pub fn build_sink(config: &Config) -> Result<Box<dyn Sink>, SinkError> {
    match config.sink.sink_type {
        SinkType::Hec => {
            let hec = config
                .sink
                .hec
                .as_ref()
                .ok_or_else(|| SinkError::Io(missing_section("sink.hec")))?;
            Ok(Box::new(hec::HecSink::new(hec.clone())?))
        }
        SinkType::Syslog => {
            let syslog = config
                .sink
                .syslog
                .as_ref()
                .ok_or_else(|| SinkError::Io(missing_section("sink.syslog")))?;
            Ok(Box::new(syslog::SyslogSink::new(syslog.clone())))
        }
    }
}

fn missing_section(name: &str) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("config section '{name}' is missing"),
    )
}
