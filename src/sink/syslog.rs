//! Syslog sink with UDP and TCP transports.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};

use super::{Sink, SinkError};
use crate::config::types::{DelimiterMethod, SyslogConfig, SyslogProtocol};
use crate::dns::DnsRecord;
use crate::logs::parser::LogEvent;

// user facility, informational severity
const PRIORITY: u8 = 14;

/// Formats queued items as RFC 3164 messages and sends them over UDP or TCP.
///
/// The TCP connection is established lazily on first flush and dropped on
/// any write error, so the next flush reconnects.
pub struct SyslogSink {
    config: SyslogConfig,
    host: String,
    event_queue: Vec<String>,
    record_queue: Vec<String>,
    tcp: Option<TcpStream>,
}

impl SyslogSink {
    pub fn new(config: SyslogConfig) -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            config,
            host,
            event_queue: Vec::new(),
            record_queue: Vec::new(),
            tcp: None,
        }
    }

    async fn flush(&mut self, queue_is_events: bool) -> Result<bool, SinkError> {
        let queue = if queue_is_events {
            std::mem::take(&mut self.event_queue)
        } else {
            std::mem::take(&mut self.record_queue)
        };
        if queue.is_empty() {
            return Ok(false);
        }

        if let Err(e) = self.send_all(&queue).await {
            // Put the batch back so the caller can retry or clear it.
            if queue_is_events {
                self.event_queue = queue;
            } else {
                self.record_queue = queue;
            }
            return Err(e);
        }

        tracing::debug!(count = queue.len(), "Flushed syslog batch");
        Ok(true)
    }

    async fn send_all(&mut self, queue: &[String]) -> Result<(), SinkError> {
        match self.config.protocol {
            SyslogProtocol::Udp => {
                let socket = UdpSocket::bind("0.0.0.0:0").await?;
                let target = (self.config.host.as_str(), self.config.port);
                for message in queue {
                    let datagram = frame(message, self.config.delimiter);
                    socket.send_to(&datagram, target).await?;
                }
            }
            SyslogProtocol::Tcp => {
                let mut payload = Vec::new();
                for message in queue {
                    payload.extend_from_slice(&frame(message, self.config.delimiter));
                }

                if self.tcp.is_none() {
                    let target = (self.config.host.as_str(), self.config.port);
                    self.tcp = Some(TcpStream::connect(target).await?);
                }

                if let Some(stream) = self.tcp.as_mut() {
                    if let Err(e) = stream.write_all(&payload).await {
                        // Drop the broken connection; the next flush reconnects.
                        self.tcp = None;
                        return Err(e.into());
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Sink for SyslogSink {
    fn add_log_event(&mut self, event: LogEvent) {
        let message = format_message(
            &event.timestamp,
            &self.host,
            &self.config.app_name,
            &event.line,
        );
        self.event_queue.push(message);
    }

    fn add_dns_record(&mut self, record: DnsRecord) {
        let app_name = self
            .config
            .record_app_name
            .clone()
            .unwrap_or_else(|| self.config.app_name.clone());
        let body = format!(
            "{} {} {} {}",
            record.name,
            record.record_type,
            record.ttl,
            record.rdata.join(",")
        );
        let message = format_message(&Utc::now(), &self.host, &app_name, &body);
        self.record_queue.push(message);
    }

    // Syslog has no server-side batching to amortize, so every flush sends
    // whatever is queued regardless of force.
    async fn publish_log_events(&mut self, _force: bool) -> Result<bool, SinkError> {
        self.flush(true).await
    }

    async fn publish_dns_records(&mut self, _force: bool) -> Result<bool, SinkError> {
        self.flush(false).await
    }

    fn clear(&mut self) {
        self.event_queue.clear();
        self.record_queue.clear();
    }
}

/// RFC 3164 message: `<PRI>TIMESTAMP HOSTNAME TAG: MSG`.
fn format_message(timestamp: &DateTime<Utc>, host: &str, app_name: &str, msg: &str) -> String {
    format!(
        "<{}>{} {} {}: {}",
        PRIORITY,
        timestamp.format("%b %d %H:%M:%S"),
        host,
        app_name,
        msg
    )
}

fn frame(message: &str, delimiter: DelimiterMethod) -> Vec<u8> {
    match delimiter {
        DelimiterMethod::None => message.as_bytes().to_vec(),
        DelimiterMethod::Lf => format!("{message}\n").into_bytes(),
        DelimiterMethod::Crlf => format!("{message}\r\n").into_bytes(),
        DelimiterMethod::Null => format!("{message}\0").into_bytes(),
        DelimiterMethod::Octet => format!("{} {}", message.len(), message).into_bytes(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_rfc3164_format() {
        let timestamp = Utc.with_ymd_and_hms(2023, 1, 3, 4, 16, 36).unwrap();
        let message = format_message(&timestamp, "agent01", "lds", "dns query line");
        assert_eq!(message, "<14>Jan 03 04:16:36 agent01 lds: dns query line");
    }

    #[test]
    fn test_framing_methods() {
        assert_eq!(frame("msg", DelimiterMethod::None), b"msg".to_vec());
        assert_eq!(frame("msg", DelimiterMethod::Lf), b"msg\n".to_vec());
        assert_eq!(frame("msg", DelimiterMethod::Crlf), b"msg\r\n".to_vec());
        assert_eq!(frame("msg", DelimiterMethod::Null), b"msg\0".to_vec());
        assert_eq!(frame("msg", DelimiterMethod::Octet), b"3 msg".to_vec());
    }

    #[test]
    fn test_octet_count_covers_full_message() {
        let framed = frame("<14>Jan 03 04:16:36 h a: x", DelimiterMethod::Octet);
        let framed = String::from_utf8(framed).unwrap();
        let (count, rest) = framed.split_once(' ').unwrap();
        assert_eq!(count.parse::<usize>().unwrap(), rest.len());
    }
}
