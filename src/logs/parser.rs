use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("timestamp pattern missing '{{timestamp}}' placeholder: {0}")]
    MissingPlaceholder(String),

    #[error("timestamp pattern compiled to invalid regex: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Format sentinel meaning "the timestamp substring is Unix epoch seconds".
pub const EPOCH_FORMAT: &str = "%s";

/// A parsed log line: the line text (trailing newline stripped) and the
/// timestamp extracted from it.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub line: String,
    pub timestamp: DateTime<Utc>,
}

/// Parses raw log lines using a configured positional template.
///
/// The template must contain a `{timestamp}` placeholder marking where the
/// timestamp substring sits; any other `{}` spans are wildcards. A line that
/// does not match, or whose timestamp cannot be parsed, is a skip rather
/// than an error: the delivery pipeline keeps counting past it.
#[derive(Debug)]
pub struct LineParser {
    pattern: Regex,
    format: String,
}

impl LineParser {
    pub fn new(template: &str, format: &str) -> Result<Self, ParserError> {
        if !template.contains("{timestamp}") {
            return Err(ParserError::MissingPlaceholder(template.to_string()));
        }

        Ok(Self {
            pattern: Regex::new(&template_to_regex(template))?,
            format: format.to_string(),
        })
    }

    /// Parse one line. `None` means the line is malformed and was skipped.
    pub fn parse(&self, raw_line: &str) -> Option<LogEvent> {
        let line = raw_line.trim_end_matches(['\n', '\r']);

        let captures = match self.pattern.captures(line) {
            Some(captures) => captures,
            None => {
                tracing::warn!(line, "Line did not match timestamp pattern, skipping");
                return None;
            }
        };

        let timestamp_str = captures
            .name("timestamp")
            .expect("timestamp capture group exists by construction")
            .as_str();

        let timestamp = match self.parse_timestamp(timestamp_str) {
            Some(timestamp) => timestamp,
            None => {
                tracing::warn!(
                    line,
                    value = timestamp_str,
                    format = %self.format,
                    "Failed parsing line timestamp, skipping"
                );
                return None;
            }
        };

        Some(LogEvent {
            line: line.to_string(),
            timestamp,
        })
    }

    fn parse_timestamp(&self, value: &str) -> Option<DateTime<Utc>> {
        if self.format == EPOCH_FORMAT {
            return parse_epoch_seconds(value);
        }

        if self.format.contains("%z") || self.format.contains("%Z") || self.format.contains("%:z")
        {
            return DateTime::parse_from_str(value, &self.format)
                .ok()
                .map(|dt| dt.with_timezone(&Utc));
        }

        NaiveDateTime::parse_from_str(value, &self.format)
            .ok()
            .map(|ndt| Utc.from_utc_datetime(&ndt))
    }
}

/// Parse `"1673222400"` or `"1673222400.543"` into a UTC instant. The
/// fraction is taken from the digits directly so millisecond values survive
/// exactly instead of picking up float rounding error.
fn parse_epoch_seconds(value: &str) -> Option<DateTime<Utc>> {
    let (whole, fraction) = match value.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (value, ""),
    };

    let seconds: i64 = whole.parse().ok()?;

    let nanos: u32 = if fraction.is_empty() {
        0
    } else {
        if !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let mut digits = fraction.to_string();
        digits.truncate(9);
        while digits.len() < 9 {
            digits.push('0');
        }
        digits.parse().ok()?
    };

    Utc.timestamp_opt(seconds, nanos).single()
}

/// Translate the positional template into an anchored regex. `{timestamp}`
/// becomes a named capture, bare `{}` spans become lazy wildcards, and
/// everything else is matched literally.
fn template_to_regex(template: &str) -> String {
    let mut pattern = String::from("^");
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        pattern.push_str(&regex::escape(&rest[..open]));
        let after = &rest[open..];

        if let Some(tail) = after.strip_prefix("{timestamp}") {
            pattern.push_str("(?P<timestamp>.+?)");
            rest = tail;
        } else if let Some(tail) = after.strip_prefix("{}") {
            pattern.push_str(".*?");
            rest = tail;
        } else {
            // A brace that opens no recognized placeholder is literal text.
            pattern.push_str(&regex::escape("{"));
            rest = &after[1..];
        }
    }

    pattern.push_str(&regex::escape(rest));
    pattern.push('$');
    pattern
}
