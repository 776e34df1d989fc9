//! Streams a staged log file through the sink, line by line.

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::parser::LineParser;
use super::LogFile;
use crate::sink::{Sink, SinkError};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("log file '{0}' has no local decompressed copy")]
    MissingLocalFile(String),
}

/// Read the file's decompressed copy and forward its events to the sink.
///
/// Lines are counted from 1; lines at or below `last_processed_line` were
/// delivered in an earlier run and are skipped. The cursor only moves when
/// the sink confirms a publish, so lines queued but never sent are re-read
/// next time. A sink error stops delivery immediately with the cursor at
/// the last confirmed line.
pub async fn deliver_file(
    file: &mut LogFile,
    parser: &LineParser,
    sink: &mut dyn Sink,
) -> Result<(), DeliveryError> {
    let path = file
        .local_txt
        .clone()
        .ok_or_else(|| DeliveryError::MissingLocalFile(file.filename.clone()))?;

    let reader = BufReader::new(tokio::fs::File::open(&path).await?);
    let mut lines = reader.lines();
    let mut line_number: u64 = 0;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        if line_number <= file.last_processed_line {
            continue;
        }

        // Unparseable lines are dropped by the parser but still advance the
        // cursor at the next confirmed publish.
        if let Some(event) = parser.parse(&line) {
            sink.add_log_event(event);
            if sink.publish_log_events(false).await? {
                file.last_processed_line = line_number;
            }
        }
    }

    sink.publish_log_events(true).await?;
    file.last_processed_line = line_number;
    file.processed = true;

    tracing::info!(
        zone = %file.name.zone,
        filename = %file.filename,
        lines = line_number,
        "Finished delivering log file"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::DnsRecord;
    use crate::logs::name::parse_log_name;
    use crate::logs::parser::LogEvent;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// In-memory sink with the same batching gate as the real destinations,
    /// optionally failing the Nth actual send.
    struct RecordingSink {
        batch_size: usize,
        queue: Vec<String>,
        batches: Vec<Vec<String>>,
        fail_on_send: Option<usize>,
        sends: usize,
    }

    impl RecordingSink {
        fn new(batch_size: usize) -> Self {
            Self {
                batch_size,
                queue: Vec::new(),
                batches: Vec::new(),
                fail_on_send: None,
                sends: 0,
            }
        }

        fn failing_on(batch_size: usize, send: usize) -> Self {
            let mut sink = Self::new(batch_size);
            sink.fail_on_send = Some(send);
            sink
        }

        fn delivered_lines(&self) -> Vec<String> {
            self.batches.iter().flatten().cloned().collect()
        }
    }

    #[async_trait]
    impl Sink for RecordingSink {
        fn add_log_event(&mut self, event: LogEvent) {
            self.queue.push(event.line);
        }

        fn add_dns_record(&mut self, _record: DnsRecord) {}

        async fn publish_log_events(&mut self, force: bool) -> Result<bool, SinkError> {
            if self.queue.is_empty() || (self.queue.len() < self.batch_size && !force) {
                return Ok(false);
            }

            self.sends += 1;
            if self.fail_on_send == Some(self.sends) {
                return Err(SinkError::Status(503));
            }

            self.batches.push(std::mem::take(&mut self.queue));
            Ok(true)
        }

        async fn publish_dns_records(&mut self, _force: bool) -> Result<bool, SinkError> {
            Ok(false)
        }

        fn clear(&mut self) {
            self.queue.clear();
        }
    }

    fn parser() -> LineParser {
        LineParser::new("{timestamp} - {}", "%s").unwrap()
    }

    fn staged_file(dir: &TempDir, lines: &[&str]) -> LogFile {
        let filename = "zone1_1.edns_S.20230109000000-20230110000000-0.gz";
        let txt_path = dir.path().join("zone1.txt");
        std::fs::write(&txt_path, format!("{}\n", lines.join("\n"))).unwrap();

        let name = parse_log_name(filename).unwrap();
        let mut file = LogFile::new(
            format!("12345/logs/{filename}"),
            filename.to_string(),
            100,
            "ff".to_string(),
            name,
        );
        file.local_txt = Some(txt_path);
        file
    }

    fn numbered_lines(count: usize) -> Vec<String> {
        (1..=count).map(|i| format!("{} - line {}", 1672716000 + i, i)).collect()
    }

    #[tokio::test]
    async fn test_batches_flush_and_cursor_advances() {
        let dir = TempDir::new().unwrap();
        let lines = numbered_lines(15);
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let mut file = staged_file(&dir, &refs);
        let mut sink = RecordingSink::new(8);

        deliver_file(&mut file, &parser(), &mut sink).await.unwrap();

        assert_eq!(sink.batches.len(), 2);
        assert_eq!(sink.batches[0].len(), 8);
        assert_eq!(sink.batches[1].len(), 7);
        assert_eq!(file.last_processed_line, 15);
        assert!(file.processed);
    }

    #[tokio::test]
    async fn test_sink_failure_keeps_cursor_at_last_confirmed_line() {
        let dir = TempDir::new().unwrap();
        let lines = numbered_lines(15);
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let mut file = staged_file(&dir, &refs);
        let mut sink = RecordingSink::failing_on(8, 2);

        let err = deliver_file(&mut file, &parser(), &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Sink(SinkError::Status(503))));

        // First batch of 8 was confirmed; the forced flush of 9..15 failed.
        assert_eq!(file.last_processed_line, 8);
        assert!(!file.processed);
    }

    #[tokio::test]
    async fn test_resume_skips_already_delivered_lines() {
        let dir = TempDir::new().unwrap();
        let lines = numbered_lines(15);
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let mut file = staged_file(&dir, &refs);
        file.last_processed_line = 8;
        let mut sink = RecordingSink::new(8);

        deliver_file(&mut file, &parser(), &mut sink).await.unwrap();

        let delivered = sink.delivered_lines();
        assert_eq!(delivered.len(), 7);
        assert!(delivered[0].ends_with("line 9"));
        assert!(delivered[6].ends_with("line 15"));
        assert_eq!(file.last_processed_line, 15);
        assert!(file.processed);
    }

    #[tokio::test]
    async fn test_unparseable_lines_advance_cursor_without_delivery() {
        let dir = TempDir::new().unwrap();
        let mut file = staged_file(
            &dir,
            &["1672716001 - first", "not a log line", "1672716003 - third"],
        );
        let mut sink = RecordingSink::new(1);

        deliver_file(&mut file, &parser(), &mut sink).await.unwrap();

        assert_eq!(sink.delivered_lines().len(), 2);
        assert_eq!(file.last_processed_line, 3);
        assert!(file.processed);
    }

    #[tokio::test]
    async fn test_missing_local_copy_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut file = staged_file(&dir, &["1672716001 - only"]);
        file.local_txt = None;
        let mut sink = RecordingSink::new(1);

        let err = deliver_file(&mut file, &parser(), &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::MissingLocalFile(_)));
    }
}
