//! Durable per-zone delivery progress.
//!
//! The progress file is a single versioned JSON document mapping each zone
//! to the last `LogFile` handled for it. It is read once at startup and
//! rewritten wholesale after every fully- or partially-consumed file, using
//! a temp-file + rename so a crash never leaves it half written.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::LogFile;

const CURRENT_VERSION: u32 = 1;
const PROGRESS_FILE_NAME: &str = "progress.json";

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("io error on progress file: {0}")]
    Io(#[from] std::io::Error),

    #[error("progress file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("progress file has schema version {found}, expected {expected}; migrate or remove it")]
    Version { found: u32, expected: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProgressDocument {
    version: u32,
    zones: HashMap<String, LogFile>,
}

/// In-memory source of truth for per-zone progress during a run.
#[derive(Debug)]
pub struct ProgressStore {
    path: PathBuf,
    zones: HashMap<String, LogFile>,
}

impl ProgressStore {
    /// Load progress from `dir`, or start empty when no file exists.
    ///
    /// A present-but-unreadable file and a schema version mismatch are both
    /// hard errors: silently reprocessing everything would duplicate data.
    pub fn load(dir: &Path) -> Result<Self, ProgressError> {
        let path = dir.join(PROGRESS_FILE_NAME);

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No progress file, starting fresh");
                return Ok(Self {
                    path,
                    zones: HashMap::new(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let document: ProgressDocument = serde_json::from_str(&text)?;
        if document.version != CURRENT_VERSION {
            return Err(ProgressError::Version {
                found: document.version,
                expected: CURRENT_VERSION,
            });
        }

        tracing::info!(
            path = %path.display(),
            zones = document.zones.len(),
            "Loaded progress file"
        );

        Ok(Self {
            path,
            zones: document.zones,
        })
    }

    pub fn get(&self, zone: &str) -> Option<&LogFile> {
        self.zones.get(zone)
    }

    pub fn zones(&self) -> impl Iterator<Item = (&String, &LogFile)> {
        self.zones.iter()
    }

    /// Record `file` as the most-recently-handled file for its zone and
    /// rewrite the progress file.
    pub fn update(&mut self, file: LogFile) -> Result<(), ProgressError> {
        tracing::debug!(
            zone = %file.name.zone,
            filename = %file.filename,
            last_processed_line = file.last_processed_line,
            processed = file.processed,
            "Saving progress"
        );

        self.zones.insert(file.name.zone.clone(), file);
        self.save()
    }

    fn save(&self) -> Result<(), ProgressError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let document = ProgressDocument {
            version: CURRENT_VERSION,
            zones: self.zones.clone(),
        };
        let json = serde_json::to_string_pretty(&document)?;

        // Temp file + rename keeps the progress file whole across crashes.
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::name::parse_log_name;
    use tempfile::TempDir;

    fn make_file(zone: &str, start: &str, part: u32) -> LogFile {
        let filename = format!("{zone}_1.edns_S.{start}-{start}-{part}.gz");
        let name = parse_log_name(&filename).unwrap();
        LogFile::new(format!("/logs/{filename}"), filename, 100, "abc".into(), name)
    }

    #[test]
    fn test_load_missing_file_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::load(dir.path()).unwrap();
        assert!(store.get("zone1").is_none());
    }

    #[test]
    fn test_round_trip_preserves_cursor_and_flag() {
        let dir = TempDir::new().unwrap();

        let mut store = ProgressStore::load(dir.path()).unwrap();
        let mut file = make_file("zone1", "20230109000000", 0);
        file.last_processed_line = 42;
        file.processed = false;
        file.local_txt = Some(dir.path().join("zone1.txt"));
        store.update(file.clone()).unwrap();

        let reloaded = ProgressStore::load(dir.path()).unwrap();
        let entry = reloaded.get("zone1").unwrap();
        assert_eq!(entry, &file);
        assert_eq!(entry.last_processed_line, 42);
        assert!(!entry.processed);
    }

    #[test]
    fn test_zones_tracked_independently() {
        let dir = TempDir::new().unwrap();

        let mut store = ProgressStore::load(dir.path()).unwrap();
        store
            .update(make_file("zone1", "20230109000000", 0))
            .unwrap();
        store
            .update(make_file("zone2", "20230110000000", 1))
            .unwrap();

        let reloaded = ProgressStore::load(dir.path()).unwrap();
        assert_eq!(reloaded.get("zone1").unwrap().name.part, 0);
        assert_eq!(reloaded.get("zone2").unwrap().name.part, 1);
    }

    #[test]
    fn test_update_overwrites_zone_entry() {
        let dir = TempDir::new().unwrap();

        let mut store = ProgressStore::load(dir.path()).unwrap();
        store
            .update(make_file("zone1", "20230109000000", 0))
            .unwrap();
        store
            .update(make_file("zone1", "20230110000000", 0))
            .unwrap();

        let reloaded = ProgressStore::load(dir.path()).unwrap();
        let entry = reloaded.get("zone1").unwrap();
        assert_eq!(
            entry.name.start_time,
            parse_log_name("zone1_1.edns_S.20230110000000-20230110000000-0.gz")
                .unwrap()
                .start_time
        );
    }

    #[test]
    fn test_version_mismatch_is_hard_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(PROGRESS_FILE_NAME),
            r#"{"version": 99, "zones": {}}"#,
        )
        .unwrap();

        assert!(matches!(
            ProgressStore::load(dir.path()),
            Err(ProgressError::Version {
                found: 99,
                expected: CURRENT_VERSION
            })
        ));
    }

    #[test]
    fn test_corrupt_file_is_hard_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(PROGRESS_FILE_NAME), "not json").unwrap();

        assert!(matches!(
            ProgressStore::load(dir.path()),
            Err(ProgressError::Json(_))
        ));
    }
}
