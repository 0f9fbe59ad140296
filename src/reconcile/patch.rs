//! Keyed patching of a snapshot with rescraped records
//!
//! A patch is a wholesale per-key overwrite: the incoming record replaces
//! the stored one entirely, field merging never happens. Records for keys
//! the snapshot has never seen are appended, and the result is guaranteed
//! to hold each key at most once.

use crate::model::{normalize_server_url, ServerRecord};
use std::collections::HashMap;

/// Result of applying a patch
#[derive(Debug)]
pub struct PatchOutcome {
    /// Patched dataset, one record per key
    pub records: Vec<ServerRecord>,

    /// Keys that existed and were overwritten
    pub updated: usize,

    /// Keys new to the snapshot, appended in incoming order
    pub added: usize,

    /// Pre-existing duplicate keys collapsed while applying
    pub collapsed: usize,
}

/// Applies rescraped records onto a snapshot by normalized key
///
/// Within both inputs, a later record for the same key wins. Duplicate
/// keys already present in the snapshot are collapsed (last occurrence
/// kept) so the output never carries a key twice; the collapse is counted
/// and logged because it means the stored dataset was already defective.
pub fn apply_patch(
    current: Vec<ServerRecord>,
    updates: Vec<ServerRecord>,
    base_url: &str,
) -> PatchOutcome {
    let mut records: Vec<ServerRecord> = Vec::with_capacity(current.len());
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut collapsed = 0;

    for record in current {
        let key = normalize_server_url(&record.server_url, base_url);
        match index.get(&key) {
            Some(&slot) => {
                records[slot] = record;
                collapsed += 1;
            }
            None => {
                index.insert(key, records.len());
                records.push(record);
            }
        }
    }
    if collapsed > 0 {
        tracing::warn!("Snapshot held {} duplicate key(s), keeping the last of each", collapsed);
    }

    let mut updated = 0;
    let mut added = 0;
    for record in updates {
        let key = normalize_server_url(&record.server_url, base_url);
        match index.get(&key) {
            Some(&slot) => {
                records[slot] = record;
                updated += 1;
            }
            None => {
                index.insert(key, records.len());
                records.push(record);
                added += 1;
            }
        }
    }

    tracing::info!(
        "Patch applied: {} updated, {} added, {} total records",
        updated,
        added,
        records.len()
    );
    PatchOutcome {
        records,
        updated,
        added,
        collapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ToolRecord;

    const BASE: &str = "https://test.local";

    fn record(url: &str, total_tools: usize) -> ServerRecord {
        let mut record = ServerRecord::new(url);
        record.total_tools = total_tools;
        for i in 0..total_tools {
            record
                .tools
                .push(ToolRecord::bare(format!("tool_{}", i), "d"));
        }
        record
    }

    #[test]
    fn test_patch_overwrites_wholesale() {
        // {X: 5 tools, Y: 2 tools} patched with {X: 2 tools}
        let current = vec![
            record("https://test.local/server/x", 5),
            record("https://test.local/server/y", 2),
        ];
        let updates = vec![record("https://test.local/server/x", 2)];

        let outcome = apply_patch(current, updates, BASE);
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.added, 0);
        assert_eq!(outcome.records.len(), 2);

        let x = &outcome.records[0];
        assert_eq!(x.server_url, "https://test.local/server/x");
        assert_eq!(x.total_tools, 2);
        assert_eq!(x.tools.len(), 2);
        assert_eq!(outcome.records[1].total_tools, 2);
    }

    #[test]
    fn test_patch_appends_unseen_keys() {
        let current = vec![record("https://test.local/server/x", 1)];
        let updates = vec![record("https://test.local/server/z", 3)];

        let outcome = apply_patch(current, updates, BASE);
        assert_eq!(outcome.updated, 0);
        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.records[1].server_url, "https://test.local/server/z");
    }

    #[test]
    fn test_patch_matches_on_normalized_key() {
        // Stored with a trailing slash, patched without one
        let current = vec![record("https://test.local/server/x/", 5)];
        let updates = vec![record("https://test.local/server/x", 1)];

        let outcome = apply_patch(current, updates, BASE);
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].total_tools, 1);
    }

    #[test]
    fn test_patch_collapses_existing_duplicates() {
        let current = vec![
            record("https://test.local/server/x", 1),
            record("https://test.local/server/x", 4),
        ];

        let outcome = apply_patch(current, Vec::new(), BASE);
        assert_eq!(outcome.collapsed, 1);
        assert_eq!(outcome.records.len(), 1);
        // Last occurrence wins
        assert_eq!(outcome.records[0].total_tools, 4);
    }

    #[test]
    fn test_later_update_for_same_key_wins() {
        let current = Vec::new();
        let updates = vec![
            record("https://test.local/server/x", 1),
            record("https://test.local/server/x", 7),
        ];

        let outcome = apply_patch(current, updates, BASE);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].total_tools, 7);
    }
}
