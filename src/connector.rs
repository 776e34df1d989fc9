//! Orchestrates the log and record pipelines.

use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::config::types::Config;
use crate::dns::RecordsClient;
use crate::logs::delivery::{self, DeliveryError};
use crate::logs::manager::{LogManager, ManagerError};
use crate::logs::parser::LineParser;
use crate::logs::progress::ProgressStore;
use crate::logs::{LogFile, NO_LINES_PROCESSED};
use crate::remote::HttpRemoteStore;
use crate::sink::{build_sink, Sink};

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("remote store error: {0}")]
    Remote(#[from] crate::remote::RemoteError),

    #[error("progress error: {0}")]
    Progress(#[from] crate::logs::progress::ProgressError),

    #[error("sink error: {0}")]
    Sink(#[from] crate::sink::SinkError),

    #[error("timestamp parser error: {0}")]
    Parser(#[from] crate::logs::parser::ParserError),

    #[error("records API error: {0}")]
    Records(#[from] crate::dns::RecordsError),
}

#[derive(Debug, Error)]
enum FileError {
    #[error(transparent)]
    Manager(#[from] ManagerError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// Owns the selection, staging, delivery, and bookkeeping for both
/// pipelines. Work within a pipeline is strictly sequential.
pub struct Connector {
    manager: LogManager,
    progress: ProgressStore,
    sink: Box<dyn Sink>,
    parser: LineParser,
    records: Option<RecordsClient>,
}

impl Connector {
    /// Wire up the production components from config.
    pub fn from_config(config: &Config) -> Result<Self, ConnectorError> {
        let store = HttpRemoteStore::new(
            &config.store.base_url,
            &config.store.account,
            &config.store.key,
        )?;
        let manager = LogManager::new(
            Arc::new(store),
            &config.store.path,
            &config.connector.download_dir,
        );
        let progress = ProgressStore::load(&config.connector.download_dir)?;
        let sink = build_sink(config)?;
        let parser = LineParser::new(
            &config.connector.timestamp_pattern,
            &config.connector.timestamp_format,
        )?;
        let records = match &config.records {
            Some(records) => Some(RecordsClient::new(
                &records.base_url,
                &records.zone,
                &records.token,
            )?),
            None => None,
        };

        Ok(Self::new(manager, progress, sink, parser, records))
    }

    pub fn new(
        manager: LogManager,
        progress: ProgressStore,
        sink: Box<dyn Sink>,
        parser: LineParser,
        records: Option<RecordsClient>,
    ) -> Self {
        Self {
            manager,
            progress,
            sink,
            parser,
            records,
        }
    }

    /// Drain everything the remote store has queued, one file at a time.
    /// A zone whose file fails is set aside for the rest of the cycle so the
    /// remaining zones still make progress; the next cycle retries it.
    pub async fn run_log_cycle(&mut self) {
        let mut failed_zones: HashSet<String> = HashSet::new();

        while let Some(mut file) = self.manager.next_file(&self.progress, &failed_zones).await {
            let zone = file.name.zone.clone();
            let result = self.process_file(&mut file).await;

            if let Err(e) = &result {
                tracing::error!(
                    zone = %zone,
                    filename = %file.filename,
                    error = %e,
                    "Failed processing log file"
                );
                failed_zones.insert(zone);
            }

            self.finish_file(&mut file).await;
        }
    }

    async fn process_file(&mut self, file: &mut LogFile) -> Result<(), FileError> {
        if file.local_txt.is_none() {
            self.manager.fetch(file).await?;
        }
        delivery::deliver_file(file, &self.parser, self.sink.as_mut()).await?;
        Ok(())
    }

    /// Terminal bookkeeping that runs whether the file succeeded or not:
    /// persist the cursor, drop unsent sink state, and remove the local
    /// copy once fully delivered.
    async fn finish_file(&mut self, file: &mut LogFile) {
        self.sink.clear();

        if file.processed {
            if let Some(path) = file.local_txt.take() {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    tracing::warn!(path = %path.display(), error = %e, "Failed deleting local log file");
                }
            }
        }

        // A file that failed before delivery produced any state must not
        // become the zone's watermark: recording it would make selection
        // skip past a file that was never delivered. Leave the zone entry
        // alone so the next cycle picks the same file again.
        if !file.processed
            && file.last_processed_line == NO_LINES_PROCESSED
            && file.local_txt.is_none()
        {
            return;
        }

        if let Err(e) = self.progress.update(file.clone()) {
            tracing::error!(
                zone = %file.name.zone,
                error = %e,
                "Failed persisting progress"
            );
        }
    }

    /// Snapshot the zone's records and forward them through the sink.
    pub async fn run_record_cycle(&mut self) {
        let Some(client) = &self.records else {
            return;
        };

        let (records, fetch_error) = client.fetch_all().await;
        if let Some(e) = fetch_error {
            tracing::warn!(error = %e, "Record snapshot is partial");
        }
        if records.is_empty() {
            return;
        }

        let count = records.len();
        for record in records {
            self.sink.add_dns_record(record);
            if let Err(e) = self.sink.publish_dns_records(false).await {
                tracing::error!(error = %e, "Failed publishing record batch");
                self.sink.clear();
                return;
            }
        }

        if let Err(e) = self.sink.publish_dns_records(true).await {
            tracing::error!(error = %e, "Failed publishing record batch");
            self.sink.clear();
            return;
        }

        tracing::info!(records = count, "Delivered record snapshot");
    }
}
