//! Selects, downloads, and decompresses remote log files.

use flate2::read::GzDecoder;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use super::name::parse_log_name;
use super::progress::ProgressStore;
use super::LogFile;
use crate::remote::{RemoteEntry, RemoteStore};

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("remote store error: {0}")]
    Remote(#[from] crate::remote::RemoteError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decides which remote file to handle next and stages it locally.
///
/// A full listing is parsed, sorted ascending by `(start_time, part)`, and
/// cached; selection consumes the cache and only re-lists once it runs dry,
/// so a backlog of queued files does not trigger a listing per file.
pub struct LogManager {
    store: Arc<dyn RemoteStore>,
    list_path: String,
    download_dir: PathBuf,
    candidates: Vec<LogFile>,
}

impl LogManager {
    pub fn new(store: Arc<dyn RemoteStore>, list_path: &str, download_dir: &Path) -> Self {
        Self {
            store,
            list_path: list_path.to_string(),
            download_dir: download_dir.to_path_buf(),
            candidates: Vec::new(),
        }
    }

    /// Compute the next file to process, or `None` when every zone is caught
    /// up. Zones in `excluded_zones` (failed earlier this cycle) are passed
    /// over entirely so a down destination cannot spin the cycle loop.
    ///
    /// A zone's partially-processed file whose decompressed copy is still on
    /// disk is resumed in place before any new candidate is considered.
    pub async fn next_file(
        &mut self,
        progress: &ProgressStore,
        excluded_zones: &HashSet<String>,
    ) -> Option<LogFile> {
        if let Some(resume) = Self::find_resumable(progress, excluded_zones) {
            tracing::info!(
                zone = %resume.name.zone,
                filename = %resume.filename,
                last_processed_line = resume.last_processed_line,
                "Resuming partially processed log file"
            );
            return Some(resume);
        }

        if self.candidates.is_empty() {
            self.refresh_candidates().await;
        }

        self.take_next_candidate(progress, excluded_zones)
    }

    fn find_resumable(
        progress: &ProgressStore,
        excluded_zones: &HashSet<String>,
    ) -> Option<LogFile> {
        for (zone, entry) in progress.zones() {
            if entry.processed || excluded_zones.contains(zone) {
                continue;
            }

            match &entry.local_txt {
                Some(path) if path.is_file() => return Some(entry.clone()),
                Some(path) => {
                    // The copy vanished out from under us; keep the entry as
                    // the zone watermark so selection moves past this file.
                    tracing::warn!(
                        zone = %zone,
                        path = %path.display(),
                        "Partially processed log file is missing locally, skipping past it"
                    );
                }
                None => {}
            }
        }
        None
    }

    async fn refresh_candidates(&mut self) {
        let entries = match self.store.list(&self.list_path).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(path = %self.list_path, error = %e, "Failed listing remote store");
                return;
            }
        };

        self.candidates = parse_listing(&self.list_path, entries);
        tracing::debug!(
            candidates = self.candidates.len(),
            "Refreshed remote listing cache"
        );
    }

    fn take_next_candidate(
        &mut self,
        progress: &ProgressStore,
        excluded_zones: &HashSet<String>,
    ) -> Option<LogFile> {
        let mut index = 0;
        while index < self.candidates.len() {
            if excluded_zones.contains(&self.candidates[index].name.zone) {
                index += 1;
                continue;
            }

            let already_handled = progress
                .get(&self.candidates[index].name.zone)
                .is_some_and(|last| {
                    self.candidates[index].name.sort_key() <= last.name.sort_key()
                });
            if already_handled {
                // Superseded by the zone's watermark; drop from the cache.
                self.candidates.remove(index);
                continue;
            }

            let file = self.candidates.remove(index);
            tracing::debug!(
                zone = %file.name.zone,
                filename = %file.filename,
                "Selected next log file"
            );
            return Some(file);
        }
        None
    }

    /// Download the file and decompress it into the download directory,
    /// removing the compressed copy on success. Fills `local_gz`/`local_txt`.
    pub async fn fetch(&self, file: &mut LogFile) -> Result<(), ManagerError> {
        tokio::fs::create_dir_all(&self.download_dir).await?;

        let gz_path = self.download_dir.join(&file.filename);
        tracing::debug!(
            remote_path = %file.remote_path,
            local = %gz_path.display(),
            "Downloading log file"
        );
        self.store.download(&file.remote_path, &gz_path).await?;
        file.local_gz = Some(gz_path.clone());

        let txt_path = gz_path.with_extension("txt");
        decompress(&gz_path, &txt_path)?;
        file.local_txt = Some(txt_path);

        tokio::fs::remove_file(&gz_path).await?;
        file.local_gz = None;

        Ok(())
    }
}

/// Parse listing entries into sorted candidates. Entries whose names do not
/// match the delivery convention are dropped with a warning so one foreign
/// object cannot stall every zone.
fn parse_listing(list_path: &str, entries: Vec<RemoteEntry>) -> Vec<LogFile> {
    let mut files: Vec<LogFile> = entries
        .into_iter()
        .filter_map(|entry| match parse_log_name(&entry.name) {
            Ok(name) => Some(LogFile::new(
                format!("{}/{}", list_path.trim_end_matches('/'), entry.name),
                entry.name,
                entry.size,
                entry.checksum,
                name,
            )),
            Err(e) => {
                tracing::warn!(name = %entry.name, error = %e, "Ignoring unparseable listing entry");
                None
            }
        })
        .collect();

    files.sort_by_key(|f| f.name.sort_key());
    files
}

fn decompress(gz_path: &Path, txt_path: &Path) -> Result<(), ManagerError> {
    use std::io::Write;

    let gz_file = std::fs::File::open(gz_path)?;
    let mut decoder = GzDecoder::new(std::io::BufReader::new(gz_file));
    let mut txt_file = std::io::BufWriter::new(std::fs::File::create(txt_path)?);
    std::io::copy(&mut decoder, &mut txt_file)?;
    txt_file.flush()?;
    Ok(())
}
