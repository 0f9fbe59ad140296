//! Drift audit between a stored snapshot and the live listing
//!
//! The audit never mutates the snapshot: missing, extra, mismatched, and
//! duplicate keys are all reported, and drift is a normal outcome rather
//! than an error. Keys are normalized server URLs on both sides so cosmetic
//! URL differences never show up as drift.

use crate::config::AuditConfig;
use crate::harvest::extract::extract_server_fields;
use crate::harvest::retry::{Attempt, RetryPolicy};
use crate::harvest::walker::collect_listing;
use crate::model::{normalize_server_url, AuditReport, Mismatch, ServerRecord};
use crate::render::Renderer;
use crate::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Audits a snapshot against the live listing
///
/// Walks the listing with the skip policy (recorded page failures appear in
/// the report), diffs the key sets, flags duplicate snapshot keys, and
/// checks each record's advertised tool count against its stored tool list.
/// When `config.recount_threads` is set, the stored comparison is replaced
/// by a live one: each server's detail page is re-rendered and its currently
/// advertised count wins.
pub async fn run_audit(
    renderer: Arc<dyn Renderer>,
    config: &AuditConfig,
    snapshot: &[ServerRecord],
) -> Result<AuditReport> {
    let mut report = AuditReport::default();

    // Snapshot side: normalized keys, with duplicates surfaced not resolved
    let mut key_counts: BTreeMap<String, usize> = BTreeMap::new();
    for record in snapshot {
        let key = normalize_server_url(&record.server_url, &config.base_url);
        *key_counts.entry(key).or_insert(0) += 1;
    }
    report.scraped_count = key_counts.len();
    report.duplicates = key_counts
        .iter()
        .filter(|(_, count)| **count > 1)
        .map(|(key, _)| key.clone())
        .collect();

    // Live side
    let listing = collect_listing(renderer.as_ref(), &config.walk_config()).await?;
    let live_keys: BTreeSet<String> = listing.refs.iter().map(|r| r.url.clone()).collect();
    report.current_count = live_keys.len();
    report.page_errors = listing.page_errors;

    report.missing = live_keys
        .iter()
        .filter(|key| !key_counts.contains_key(*key))
        .cloned()
        .collect();
    report.extra = key_counts
        .keys()
        .filter(|key| !live_keys.contains(*key))
        .cloned()
        .collect();

    report.mismatched = match config.recount_threads {
        Some(threads) => recount_live(renderer, config, snapshot, threads).await?,
        None => local_mismatches(snapshot, &config.base_url),
    };

    tracing::info!(
        "Audit: {} scraped / {} live, {} missing, {} extra, {} mismatched, {} duplicate(s)",
        report.scraped_count,
        report.current_count,
        report.missing.len(),
        report.extra.len(),
        report.mismatched.len(),
        report.duplicates.len()
    );
    Ok(report)
}

/// Flags records whose advertised tool count disagrees with the stored list
fn local_mismatches(snapshot: &[ServerRecord], base_url: &str) -> Vec<Mismatch> {
    let mut mismatches: Vec<Mismatch> = snapshot
        .iter()
        .filter(|record| !record.tool_count_consistent())
        .map(|record| Mismatch {
            server_url: normalize_server_url(&record.server_url, base_url),
            recorded_total: record.total_tools,
            actual_total: record.tools.len(),
            live_total: None,
        })
        .collect();
    mismatches.sort_by(|a, b| a.server_url.cmp(&b.server_url));
    mismatches.dedup();
    mismatches
}

/// Re-renders each detail page and compares its advertised count against
/// the stored tool list
///
/// A mismatch carries all three counts: the advertised total recorded at
/// harvest time, the tools the snapshot actually holds, and the count the
/// page advertises now. Servers whose page stays unrenderable after retries
/// are logged and left out of the mismatch list rather than reported on
/// stale data.
async fn recount_live(
    renderer: Arc<dyn Renderer>,
    config: &AuditConfig,
    snapshot: &[ServerRecord],
    threads: usize,
) -> Result<Vec<Mismatch>> {
    let retry = RetryPolicy::new(config.max_attempts, config.base_delay);
    let semaphore = Arc::new(Semaphore::new(threads));
    let mut tasks = JoinSet::new();

    for record in snapshot {
        let key = normalize_server_url(&record.server_url, &config.base_url);
        if key.is_empty() {
            continue;
        }
        let advertised = record.total_tools;
        let stored_tools = record.tools.len();
        let renderer = renderer.clone();
        let semaphore = semaphore.clone();

        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return None;
            };

            let rendered = retry
                .run(&format!("recount {}", key), |_| {
                    let url = key.clone();
                    let renderer = renderer.clone();
                    async move { Attempt::from_render(renderer.render(&url).await) }
                })
                .await;

            match rendered {
                Ok(page) => {
                    let live_total = extract_server_fields(&page, &key).total_tools;
                    if live_total != stored_tools {
                        Some(Mismatch {
                            server_url: key,
                            recorded_total: advertised,
                            actual_total: stored_tools,
                            live_total: Some(live_total),
                        })
                    } else {
                        None
                    }
                }
                Err(e) => {
                    tracing::warn!("Recount skipped for {}: {}", key, e);
                    None
                }
            }
        });
    }

    let mut mismatches = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Some(mismatch)) => mismatches.push(mismatch),
            Ok(None) => {}
            Err(e) => tracing::error!("Recount task panicked: {}", e),
        }
    }
    mismatches.sort_by(|a, b| a.server_url.cmp(&b.server_url));
    Ok(mismatches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{Link, RenderError, RenderResult, RenderedPage};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    struct FixtureRenderer {
        pages: HashMap<String, RenderedPage>,
    }

    #[async_trait]
    impl Renderer for FixtureRenderer {
        async fn render(&self, url: &str) -> RenderResult<RenderedPage> {
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| RenderError::Http {
                    url: url.to_string(),
                    status: 404,
                })
        }

        async fn click(
            &self,
            _page: &RenderedPage,
            _element_text: &str,
        ) -> RenderResult<RenderedPage> {
            Err(RenderError::InteractionUnsupported)
        }
    }

    fn listing_page(server_paths: &[&str]) -> RenderedPage {
        RenderedPage {
            text: "Servers".to_string(),
            links: server_paths
                .iter()
                .map(|path| Link {
                    href: path.to_string(),
                    text: "server".to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }

    fn empty_page() -> RenderedPage {
        RenderedPage {
            text: "No servers".to_string(),
            ..Default::default()
        }
    }

    fn fixture_renderer(live_servers: &[&str]) -> Arc<FixtureRenderer> {
        let mut pages = HashMap::new();
        pages.insert(
            "https://test.local/servers?page=1".to_string(),
            listing_page(live_servers),
        );
        pages.insert(
            "https://test.local/servers?page=2".to_string(),
            empty_page(),
        );
        Arc::new(FixtureRenderer { pages })
    }

    fn fast_config() -> AuditConfig {
        AuditConfig {
            base_url: "https://test.local".to_string(),
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
            ..Default::default()
        }
    }

    fn record(url: &str, total_tools: usize, actual_tools: usize) -> ServerRecord {
        let mut record = ServerRecord::new(url);
        record.total_tools = total_tools;
        for i in 0..actual_tools {
            record
                .tools
                .push(crate::model::ToolRecord::bare(format!("tool_{}", i), "d"));
        }
        record
    }

    #[tokio::test]
    async fn test_audit_reports_missing_and_extra() {
        // Snapshot has {a, b, c}; live listing has {b, c, d}
        let renderer = fixture_renderer(&["/server/b", "/server/c", "/server/d"]);
        let snapshot = vec![
            record("https://test.local/server/a", 1, 1),
            record("https://test.local/server/b", 1, 1),
            record("https://test.local/server/c", 1, 1),
        ];

        let report = run_audit(renderer, &fast_config(), &snapshot).await.unwrap();
        assert_eq!(report.missing, vec!["https://test.local/server/d"]);
        assert_eq!(report.extra, vec!["https://test.local/server/a"]);
        assert_eq!(report.scraped_count, 3);
        assert_eq!(report.current_count, 3);
        assert!(report.mismatched.is_empty());
    }

    #[tokio::test]
    async fn test_audit_flags_tool_count_mismatch() {
        let renderer = fixture_renderer(&["/server/a"]);
        let snapshot = vec![record("https://test.local/server/a", 3, 2)];

        let report = run_audit(renderer, &fast_config(), &snapshot).await.unwrap();
        assert_eq!(report.mismatched.len(), 1);
        assert_eq!(report.mismatched[0].recorded_total, 3);
        assert_eq!(report.mismatched[0].actual_total, 2);
    }

    #[tokio::test]
    async fn test_audit_reports_duplicates_without_resolving() {
        let renderer = fixture_renderer(&["/server/a"]);
        // Same key twice, once with a cosmetic trailing slash
        let snapshot = vec![
            record("https://test.local/server/a", 1, 1),
            record("https://test.local/server/a/", 1, 1),
        ];

        let report = run_audit(renderer, &fast_config(), &snapshot).await.unwrap();
        assert_eq!(report.duplicates, vec!["https://test.local/server/a"]);
        assert_eq!(report.scraped_count, 1);
    }

    #[tokio::test]
    async fn test_audit_in_sync_snapshot_is_clean() {
        let renderer = fixture_renderer(&["/server/a", "/server/b"]);
        let snapshot = vec![
            record("https://test.local/server/a", 2, 2),
            record("https://test.local/server/b", 0, 0),
        ];

        let report = run_audit(renderer, &fast_config(), &snapshot).await.unwrap();
        assert!(report.missing.is_empty());
        assert!(report.extra.is_empty());
        assert!(report.mismatched.is_empty());
        assert!(report.duplicates.is_empty());
    }

    #[tokio::test]
    async fn test_recount_uses_live_advertised_count() {
        let mut pages = HashMap::new();
        pages.insert(
            "https://test.local/servers?page=1".to_string(),
            listing_page(&["/server/a"]),
        );
        pages.insert(
            "https://test.local/servers?page=2".to_string(),
            empty_page(),
        );
        // The live page now advertises 4 tools
        pages.insert(
            "https://test.local/server/a".to_string(),
            RenderedPage {
                heading: Some("A".to_string()),
                text: "Tools\n4\nsearch_engine\nSearches things.".to_string(),
                ..Default::default()
            },
        );
        let renderer = Arc::new(FixtureRenderer { pages });

        let mut config = fast_config();
        config.recount_threads = Some(2);

        // Stored record looks self-consistent; only the live count exposes it
        let snapshot = vec![record("https://test.local/server/a", 2, 2)];
        let report = run_audit(renderer, &config, &snapshot).await.unwrap();

        assert_eq!(report.mismatched.len(), 1);
        assert_eq!(report.mismatched[0].recorded_total, 2);
        assert_eq!(report.mismatched[0].actual_total, 2);
        assert_eq!(report.mismatched[0].live_total, Some(4));
    }
}
