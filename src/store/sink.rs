//! Incremental JSONL sink
//!
//! Workers append each completed record as one JSON line, flushed to disk
//! immediately, so an interrupted run loses at most the record in flight.
//! Finalizing replays the partial file and collapses duplicate server URLs,
//! keeping the most recently appended version of each.

use crate::model::ServerRecord;
use crate::store::{snapshot, StoreError};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Append-only record sink backed by a JSONL file
///
/// Safe to share across workers behind an `Arc`; appends are serialized by
/// an internal lock and each line is flushed before the call returns.
pub struct IncrementalSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl IncrementalSink {
    /// Creates the sink, truncating any previous partial file at `path`
    pub fn create(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| StoreError::Io {
                path: path.display().to_string(),
                source,
            })?;

        tracing::info!("Incremental results will stream to {}", path.display());
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    /// Opens the sink in append mode, keeping existing lines
    ///
    /// Used when resuming a run whose partial output should be extended
    /// rather than replaced.
    pub fn resume(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| StoreError::Io {
                path: path.display().to_string(),
                source,
            })?;

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record as a flushed JSON line
    pub fn append(&self, record: &ServerRecord) -> Result<(), StoreError> {
        let line = serde_json::to_string(record).map_err(|source| StoreError::Json {
            path: self.path.display().to_string(),
            source,
        })?;

        // Lock poisoning only follows a panic while writing; treat the
        // writer as still usable and keep appending.
        let mut writer = match self.writer.lock() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        };
        writeln!(writer, "{}", line).map_err(|source| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        writer.flush().map_err(|source| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        })
    }

    /// Flushes, replays the partial file, and collapses duplicates
    ///
    /// When the same server URL was appended more than once (a rescrape,
    /// or a resumed run revisiting an item), the later line wins.
    pub fn finalize(&self) -> Result<Vec<ServerRecord>, StoreError> {
        {
            let mut writer = match self.writer.lock() {
                Ok(writer) => writer,
                Err(poisoned) => poisoned.into_inner(),
            };
            writer.flush().map_err(|source| StoreError::Io {
                path: self.path.display().to_string(),
                source,
            })?;
        }

        let records = snapshot::read_jsonl(&self.path)?;
        let total = records.len();
        let deduped = snapshot::dedup_last_wins(records);
        if deduped.len() < total {
            tracing::info!(
                "Collapsed {} duplicate record(s) during finalize",
                total - deduped.len()
            );
        }
        Ok(deduped)
    }
}
