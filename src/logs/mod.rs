//! Log-file pipeline: naming, selection, fetch, parse, delivery, progress.

pub mod delivery;
pub mod manager;
pub mod name;
pub mod parser;
pub mod progress;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use name::LogNameInfo;

/// Sentinel for `LogFile::last_processed_line`: no line delivered yet.
/// Lines are 1-indexed.
pub const NO_LINES_PROCESSED: u64 = 0;

/// One remote log file's processing state, from listing through delivery.
///
/// Created when the lister returns metadata; the manager fills in local
/// paths after download/decompression, and the delivery pipeline advances
/// `last_processed_line` and finally sets `processed`. The whole struct is
/// persisted per zone in the progress store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogFile {
    pub remote_path: String,
    pub filename: String,
    pub size: u64,
    pub checksum: String,
    pub name: LogNameInfo,
    pub local_gz: Option<PathBuf>,
    pub local_txt: Option<PathBuf>,
    pub last_processed_line: u64,
    pub processed: bool,
}

impl LogFile {
    pub fn new(
        remote_path: String,
        filename: String,
        size: u64,
        checksum: String,
        name: LogNameInfo,
    ) -> Self {
        Self {
            remote_path,
            filename,
            size,
            checksum,
            name,
            local_gz: None,
            local_txt: None,
            last_processed_line: NO_LINES_PROCESSED,
            processed: false,
        }
    }
}
