//! Durable storage: incremental JSONL sink and JSON snapshots
//!
//! - [`sink`] appends records durably as they are harvested
//! - [`snapshot`] loads and saves whole-dataset JSON files and URL lists

pub mod sink;
pub mod snapshot;

use thiserror::Error;

pub use sink::IncrementalSink;
pub use snapshot::{
    dedup_last_wins, load_records, load_url_list, read_jsonl, save_records, save_url_list,
};

/// Errors from reading or writing dataset files
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path} does not contain a JSON array of records")]
    NotAnArray { path: String },

    #[error("record {index} in {path} has an empty server_url")]
    EmptyKey { path: String, index: usize },
}
