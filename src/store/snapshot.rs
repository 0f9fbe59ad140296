//! Whole-dataset JSON snapshots and URL lists
//!
//! The canonical dataset file is a pretty-printed JSON array of server
//! records. Rescrape tooling also exchanges plain URL lists (one JSON
//! string array per file) and replays JSONL partials written by the sink.

use crate::model::ServerRecord;
use crate::store::StoreError;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Loads a JSON array of server records
pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<ServerRecord>, StoreError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| io_error(path, source))?;

    let value: serde_json::Value =
        serde_json::from_str(&raw).map_err(|source| StoreError::Json {
            path: path.display().to_string(),
            source,
        })?;
    if !value.is_array() {
        return Err(StoreError::NotAnArray {
            path: path.display().to_string(),
        });
    }

    let records: Vec<ServerRecord> =
        serde_json::from_value(value).map_err(|source| StoreError::Json {
            path: path.display().to_string(),
            source,
        })?;
    if let Some(index) = records.iter().position(|r| r.server_url.trim().is_empty()) {
        return Err(StoreError::EmptyKey {
            path: path.display().to_string(),
            index,
        });
    }
    tracing::debug!("Loaded {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Saves records as a pretty-printed JSON array
pub fn save_records(path: impl AsRef<Path>, records: &[ServerRecord]) -> Result<(), StoreError> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(records).map_err(|source| StoreError::Json {
        path: path.display().to_string(),
        source,
    })?;
    fs::write(path, json).map_err(|source| io_error(path, source))?;
    tracing::info!("Saved {} records to {}", records.len(), path.display());
    Ok(())
}

/// Loads a URL list, deduplicated in first-seen order
///
/// Rescrape inputs come in two shapes: a plain array of URL strings, or an
/// array of record objects carrying a `server_url` field. Entries without a
/// usable URL are skipped with a warning.
pub fn load_url_list(path: impl AsRef<Path>) -> Result<Vec<String>, StoreError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| io_error(path, source))?;

    let entries: Vec<serde_json::Value> =
        serde_json::from_str(&raw).map_err(|source| StoreError::Json {
            path: path.display().to_string(),
            source,
        })?;

    let mut seen = std::collections::HashSet::new();
    let mut urls = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        let url = match entry {
            serde_json::Value::String(url) => Some(url.as_str()),
            serde_json::Value::Object(map) => map.get("server_url").and_then(|v| v.as_str()),
            _ => None,
        };
        match url {
            Some(url) if !url.trim().is_empty() => {
                let url = url.trim().to_string();
                if seen.insert(url.clone()) {
                    urls.push(url);
                }
            }
            _ => tracing::warn!(
                "Entry {} in {} carries no URL, skipping",
                index,
                path.display()
            ),
        }
    }
    Ok(urls)
}

/// Saves URL strings as a pretty-printed JSON array
pub fn save_url_list(path: impl AsRef<Path>, urls: &[String]) -> Result<(), StoreError> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(urls).map_err(|source| StoreError::Json {
        path: path.display().to_string(),
        source,
    })?;
    fs::write(path, json).map_err(|source| io_error(path, source))
}

/// Replays a JSONL partial file into records
///
/// Blank lines are skipped and unparseable lines are warned about rather
/// than failing the run: a partial file may end mid-line if the writer was
/// killed, and one torn record must not cost the rest.
pub fn read_jsonl(path: impl AsRef<Path>) -> Result<Vec<ServerRecord>, StoreError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| io_error(path, source))?;

    let mut records = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ServerRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(
                "Skipping unparseable line {} of {}: {}",
                index + 1,
                path.display(),
                e
            ),
        }
    }
    Ok(records)
}

/// Collapses duplicate server URLs, keeping the last occurrence
///
/// Output preserves the order in which each URL was first seen, so a
/// rescraped record replaces the original in place rather than moving to
/// the end of the dataset.
pub fn dedup_last_wins(records: Vec<ServerRecord>) -> Vec<ServerRecord> {
    let mut latest: HashMap<String, ServerRecord> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for record in records {
        if !latest.contains_key(&record.server_url) {
            order.push(record.server_url.clone());
        }
        latest.insert(record.server_url.clone(), record);
    }

    order
        .into_iter()
        .filter_map(|url| latest.remove(&url))
        .collect()
}
