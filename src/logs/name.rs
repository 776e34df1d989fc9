use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NameError {
    #[error("filename '{0}' does not match the delivery naming convention")]
    Pattern(String),

    #[error("filename '{filename}' has invalid start time '{value}': {source}")]
    StartTime {
        filename: String,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Identity metadata parsed from a delivered log file's name.
///
/// Delivered files follow a fixed positional convention:
/// `{zone}_{product}.{format}_{S|U}.{start}-{end}-{part}.{encoding}`
/// where `start`/`end` are 14-digit `YYYYMMDDHHMMSS` UTC timestamps.
/// The end time is discarded; files are ordered by `(start_time, part)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogNameInfo {
    pub zone: String,
    pub product: u32,
    pub format: String,
    pub sorted: bool,
    pub start_time: DateTime<Utc>,
    pub part: u32,
    pub encoding: String,
}

impl LogNameInfo {
    /// Ordering key used by the selector: chronological, parts break ties.
    pub fn sort_key(&self) -> (DateTime<Utc>, u32) {
        (self.start_time, self.part)
    }
}

const START_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<zone>[^_]+)_(?P<product>\d+)\.(?P<format>[^_]+)_(?P<sort>[A-Za-z])\.(?P<start>\d{14})-(?P<end>\d{14})-(?P<part>\d+)\.(?P<encoding>.+)$",
        )
        .expect("log name regex is valid")
    })
}

/// Parse a delivered log filename into its identity metadata.
///
/// A name that does not match the convention is a hard error; callers that
/// want to tolerate foreign objects in a listing must filter explicitly.
pub fn parse_log_name(filename: &str) -> Result<LogNameInfo, NameError> {
    let captures = name_regex()
        .captures(filename)
        .ok_or_else(|| NameError::Pattern(filename.to_string()))?;

    let start_str = &captures["start"];
    let start_naive = NaiveDateTime::parse_from_str(start_str, START_TIME_FORMAT).map_err(
        |source| NameError::StartTime {
            filename: filename.to_string(),
            value: start_str.to_string(),
            source,
        },
    )?;

    // Numeric groups are \d+ so the only failure mode is overflow; that is
    // still a name we cannot represent, so report it as a pattern mismatch.
    let product: u32 = captures["product"]
        .parse()
        .map_err(|_| NameError::Pattern(filename.to_string()))?;
    let part: u32 = captures["part"]
        .parse()
        .map_err(|_| NameError::Pattern(filename.to_string()))?;

    Ok(LogNameInfo {
        zone: captures["zone"].to_string(),
        product,
        format: captures["format"].to_string(),
        sorted: &captures["sort"] == "S",
        start_time: Utc.from_utc_datetime(&start_naive),
        part,
        encoding: captures["encoding"].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_valid_name() {
        let info =
            parse_log_name("customer1_123456.edns_S.20230109000000-20230110000000-0.gz").unwrap();

        assert_eq!(info.zone, "customer1");
        assert_eq!(info.product, 123456);
        assert_eq!(info.format, "edns");
        assert!(info.sorted);
        assert_eq!(
            info.start_time,
            Utc.with_ymd_and_hms(2023, 1, 9, 0, 0, 0).unwrap()
        );
        assert_eq!(info.part, 0);
        assert_eq!(info.encoding, "gz");
    }

    #[test]
    fn test_parse_unsorted_flag() {
        let info =
            parse_log_name("zone2_77.cdn_U.20230109123000-20230110123000-3.gzip_uncompressed").unwrap();

        assert!(!info.sorted);
        assert_eq!(info.part, 3);
        assert_eq!(info.encoding, "gzip_uncompressed");
        assert_eq!(
            info.start_time,
            Utc.with_ymd_and_hms(2023, 1, 9, 12, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_is_idempotent() {
        let name = "customer1_123456.edns_S.20230109000000-20230110000000-1.gz";
        assert_eq!(parse_log_name(name).unwrap(), parse_log_name(name).unwrap());
    }

    #[test]
    fn test_garbage_name_is_error() {
        assert!(matches!(
            parse_log_name("garbage.gz"),
            Err(NameError::Pattern(_))
        ));
    }

    #[test]
    fn test_short_timestamp_is_error() {
        assert!(matches!(
            parse_log_name("zone_1.edns_S.20230109-20230110-0.gz"),
            Err(NameError::Pattern(_))
        ));
    }

    #[test]
    fn test_impossible_start_time_is_error() {
        // Matches the shape but month 13 cannot parse.
        assert!(matches!(
            parse_log_name("zone_1.edns_S.20231350000000-20231360000000-0.gz"),
            Err(NameError::StartTime { .. })
        ));
    }

    #[test]
    fn test_sort_key_orders_by_time_then_part() {
        let early_p1 = parse_log_name("z_1.edns_S.20230109000000-20230110000000-1.gz").unwrap();
        let late_p0 = parse_log_name("z_1.edns_S.20230110000000-20230111000000-0.gz").unwrap();
        let early_p0 = parse_log_name("z_1.edns_S.20230109000000-20230110000000-0.gz").unwrap();

        let mut keys = vec![late_p0.sort_key(), early_p1.sort_key(), early_p0.sort_key()];
        keys.sort();
        assert_eq!(
            keys,
            vec![early_p0.sort_key(), early_p1.sort_key(), late_p0.sort_key()]
        );
    }
}
