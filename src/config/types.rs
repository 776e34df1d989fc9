use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    pub connector: ConnectorConfig,
    pub sink: SinkConfig,
    pub records: Option<RecordsConfig>,
}

/// Remote object store the delivery service uploads log files to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub base_url: String,
    pub account: String,
    pub key: String,
    /// Listing path under the base URL, e.g. "12345/logs".
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    pub download_dir: PathBuf,
    /// Line template locating the timestamp, e.g. "{timestamp} - {}".
    pub timestamp_pattern: String,
    /// chrono strftime format for the captured timestamp, or "%s" for epoch.
    pub timestamp_format: String,
    #[serde(with = "duration_format", default = "default_log_poll_interval")]
    pub log_poll_interval: Duration,
    #[serde(with = "duration_format", default = "default_record_poll_interval")]
    pub record_poll_interval: Duration,
}

fn default_log_poll_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_record_poll_interval() -> Duration {
    Duration::from_secs(3600)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(rename = "type")]
    pub sink_type: SinkType,
    pub hec: Option<HecConfig>,
    pub syslog: Option<SyslogConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkType {
    Hec,
    Syslog,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HecConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_use_ssl")]
    pub use_ssl: bool,
    pub token: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    pub sourcetype: Option<String>,
    pub index: Option<String>,
    /// Token for record snapshots; required when record forwarding is on.
    pub record_token: Option<String>,
    pub record_sourcetype: Option<String>,
    pub record_index: Option<String>,
    #[serde(default = "default_batch_size")]
    pub record_batch_size: usize,
}

fn default_use_ssl() -> bool {
    true
}

fn default_batch_size() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyslogConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_syslog_protocol")]
    pub protocol: SyslogProtocol,
    #[serde(default = "default_delimiter")]
    pub delimiter: DelimiterMethod,
    pub app_name: String,
    /// App name for record snapshots; required when record forwarding is on.
    pub record_app_name: Option<String>,
}

fn default_syslog_protocol() -> SyslogProtocol {
    SyslogProtocol::Udp
}

fn default_delimiter() -> DelimiterMethod {
    DelimiterMethod::Lf
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyslogProtocol {
    Udp,
    Tcp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelimiterMethod {
    None,
    Lf,
    Crlf,
    Null,
    Octet,
}

/// Authoritative DNS API for record snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordsConfig {
    pub base_url: String,
    pub zone: String,
    pub token: String,
}

// Custom serde module for duration parsing
mod duration_format {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty duration string".to_string());
        }

        let (value_str, unit) = if s.ends_with("ms") {
            (&s[..s.len() - 2], "ms")
        } else if s.ends_with('s') {
            (&s[..s.len() - 1], "s")
        } else if s.ends_with('m') {
            (&s[..s.len() - 1], "m")
        } else if s.ends_with('h') {
            (&s[..s.len() - 1], "h")
        } else {
            return Err(format!("invalid duration format: {}", s));
        };

        let value: u64 = value_str
            .parse()
            .map_err(|_| format!("invalid numeric value: {}", value_str))?;

        let duration = match unit {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value * 60),
            "h" => Duration::from_secs(value * 3600),
            _ => return Err(format!("unknown unit: {}", unit)),
        };

        Ok(duration)
    }

    fn format_duration(d: Duration) -> String {
        let secs = d.as_secs();
        if secs % 3600 == 0 && secs > 0 {
            format!("{}h", secs / 3600)
        } else if secs % 60 == 0 && secs > 0 {
            format!("{}m", secs / 60)
        } else if secs > 0 {
            format!("{}s", secs)
        } else {
            format!("{}ms", d.as_millis())
        }
    }
}
