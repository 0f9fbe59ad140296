//! Concurrent harvest worker pool
//!
//! Fans listing references out across a bounded number of workers. Each
//! worker renders the detail page (retried), extracts the top-level server
//! fields, then extracts the tool list with its own retry-then-fallback
//! discipline, and finally hands the fully populated record to the
//! incremental sink. One item's terminal failure never stops the others.

use crate::config::{HarvestConfig, MAX_TOOL_PAGES};
use crate::harvest::extract::{
    extract_server_fields, extract_tool_from_expanded, looks_like_tool_name,
    parse_tools_from_text,
};
use crate::harvest::retry::{Attempt, RetryPolicy};
use crate::model::{ListingRef, ServerRecord, ToolRecord};
use crate::render::{RenderError, Renderer};
use crate::store::IncrementalSink;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Terminal per-item failure, recorded after retries and fallback are spent
#[derive(Debug, Error)]
#[error("harvest failed for {url} (page {page_index}, {attempts} attempts): {message}")]
pub struct HarvestError {
    pub url: String,
    pub page_index: u32,
    pub attempts: u32,
    pub message: String,
}

/// Result of harvesting one listing reference
#[derive(Debug)]
pub enum HarvestOutcome {
    Success(ServerRecord),
    Failed(HarvestError),
}

/// Aggregate statistics for one harvest run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestStats {
    pub total: usize,
    pub completed: usize,
    /// Records whose harvested tool count matches the advertised one
    pub success: usize,
    /// Records with some tools but fewer than advertised
    pub partial: usize,
    /// Records with no tools, plus terminal failures
    pub failed: usize,
    pub total_tools: usize,
}

impl HarvestStats {
    /// Builds statistics from a set of outcomes
    pub fn from_outcomes(outcomes: &[HarvestOutcome]) -> Self {
        let mut stats = Self {
            total: outcomes.len(),
            completed: outcomes.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                HarvestOutcome::Success(record) => {
                    stats.total_tools += record.tools.len();
                    if !record.tools.is_empty() && record.tool_count_consistent() {
                        stats.success += 1;
                    } else if !record.tools.is_empty() {
                        stats.partial += 1;
                    } else {
                        stats.failed += 1;
                    }
                }
                HarvestOutcome::Failed(_) => stats.failed += 1,
            }
        }
        stats
    }
}

/// Fixed-size pool of harvest workers
///
/// The renderer is shared: implementations are required to be safe for
/// concurrent use (the HTTP renderer's client pools connections
/// internally). Cooperative stop is exposed through [`HarvestPool::stop_handle`];
/// setting it lets in-flight items finish and skips the rest.
pub struct HarvestPool {
    renderer: Arc<dyn Renderer>,
    config: HarvestConfig,
    stop: Arc<AtomicBool>,
}

impl HarvestPool {
    pub fn new(renderer: Arc<dyn Renderer>, config: HarvestConfig) -> Self {
        Self {
            renderer,
            config,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for requesting a cooperative stop from outside the pool
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Harvests all references, appending each success to the sink
    ///
    /// Completion order is arrival order, not input order. Returns one
    /// outcome per reference actually attempted; references skipped by a
    /// cooperative stop produce no outcome.
    pub async fn run(
        &self,
        refs: Vec<ListingRef>,
        sink: Option<Arc<IncrementalSink>>,
    ) -> Vec<HarvestOutcome> {
        let total = refs.len();
        tracing::info!(
            "Harvesting {} servers with {} worker(s)",
            total,
            self.config.threads
        );

        let semaphore = Arc::new(Semaphore::new(self.config.threads));
        let completed = Arc::new(AtomicUsize::new(0));
        let retry = RetryPolicy::new(self.config.max_attempts, self.config.base_delay);

        let mut tasks = JoinSet::new();
        for item in refs {
            let semaphore = semaphore.clone();
            let renderer = self.renderer.clone();
            let sink = sink.clone();
            let stop = self.stop.clone();
            let completed = completed.clone();

            tasks.spawn(async move {
                // Closing the semaphore is not part of this design; an
                // acquire error would mean the pool itself is gone.
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };
                if stop.load(Ordering::SeqCst) {
                    tracing::debug!("Stop requested, skipping {}", item.url);
                    return None;
                }

                let outcome = match harvest_item(renderer.as_ref(), &retry, &item).await {
                    Ok(record) => {
                        if let Some(sink) = &sink {
                            if let Err(e) = sink.append(&record) {
                                tracing::error!(
                                    "Incremental append failed for {}: {}",
                                    record.server_url,
                                    e
                                );
                            }
                        }
                        HarvestOutcome::Success(record)
                    }
                    Err(error) => HarvestOutcome::Failed(error),
                };

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                match &outcome {
                    HarvestOutcome::Success(record) => tracing::info!(
                        "[{}/{}] {} ({}/{} tools)",
                        done,
                        total,
                        record.server_name,
                        record.tools.len(),
                        record.total_tools
                    ),
                    HarvestOutcome::Failed(error) => {
                        tracing::warn!("[{}/{}] FAILED {}", done, total, error)
                    }
                }

                Some(outcome)
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(outcome)) => outcomes.push(outcome),
                Ok(None) => {}
                Err(e) => tracing::error!("Harvest task panicked: {}", e),
            }
        }

        let stats = HarvestStats::from_outcomes(&outcomes);
        tracing::info!(
            "Harvest complete: {} ok / {} partial / {} failed, {} tools",
            stats.success,
            stats.partial,
            stats.failed,
            stats.total_tools
        );

        outcomes
    }
}

/// Harvests one server: detail page, fields, tools, normalize
async fn harvest_item(
    renderer: &dyn Renderer,
    retry: &RetryPolicy,
    item: &ListingRef,
) -> Result<ServerRecord, HarvestError> {
    let detail = retry
        .run(&format!("detail page {}", item.url), |_| {
            let url = item.url.clone();
            async move { Attempt::from_render(renderer.render(&url).await) }
        })
        .await
        .map_err(|e| HarvestError {
            url: item.url.clone(),
            page_index: item.page_index,
            attempts: e.attempts,
            message: e.last_error,
        })?;

    let mut record = extract_server_fields(&detail, &item.url);

    // Tool extraction fails far more often than top-level metadata, so it
    // gets its own retry-then-fallback pass; a server with no extractable
    // tools is still a valid (partial) record, not a harvest failure.
    match extract_tools(renderer, retry, &item.url).await {
        Ok(tools) => record.tools = tools,
        Err(e) => {
            tracing::warn!("Tool extraction exhausted for {}: {}", item.url, e);
            record.tools = Vec::new();
        }
    }

    record.normalize();
    Ok(record)
}

/// Extracts the tool list for one server across its tool pages
///
/// Per page, the structured variant expands each tool-shaped clickable and
/// parses its parameter block. If the renderer cannot interact or the page
/// exposes no clickable tools, the degraded text parser covers that page.
/// A tool page that stays unrenderable ends pagination with whatever was
/// collected so far.
async fn extract_tools(
    renderer: &dyn Renderer,
    retry: &RetryPolicy,
    server_url: &str,
) -> Result<Vec<ToolRecord>, crate::harvest::RetryExhausted> {
    let mut tools = Vec::new();
    let mut tool_page = 1u32;

    loop {
        let tools_url = format!("{}?capability=tools&page={}", server_url, tool_page);

        let page = retry
            .run_with_fallback(
                &format!("tools page {} of {}", tool_page, server_url),
                |_| {
                    let url = tools_url.clone();
                    async move { Attempt::from_render(renderer.render(&url).await) }
                },
                || {
                    // Degraded mode: the detail page itself usually lists
                    // the tools even when the tools view will not load.
                    let url = server_url.to_string();
                    async move { Attempt::from_render(renderer.render(&url).await) }
                },
            )
            .await;

        let page = match page {
            Ok(page) => page,
            Err(e) if tool_page == 1 => return Err(e),
            Err(e) => {
                tracing::warn!("Tool page {} unrenderable, keeping {} tools: {}", tool_page, tools.len(), e);
                break;
            }
        };

        let candidates: Vec<String> = page
            .clickables
            .iter()
            .filter(|label| looks_like_tool_name(label))
            .cloned()
            .collect();

        if candidates.is_empty() {
            tracing::debug!(
                "No clickable tools on page {} of {}, using text fallback",
                tool_page,
                server_url
            );
            tools.extend(dedup_new_tools(&tools, parse_tools_from_text(&page.text)));
        } else {
            let mut structured_failed = false;
            for candidate in &candidates {
                match renderer.click(&page, candidate).await {
                    Ok(expanded) => {
                        let tool = extract_tool_from_expanded(&expanded.text, candidate);
                        if !tools.iter().any(|t: &ToolRecord| t.name == tool.name) {
                            tools.push(tool);
                        }
                    }
                    Err(RenderError::InteractionUnsupported) => {
                        structured_failed = true;
                        break;
                    }
                    Err(e) => {
                        tracing::debug!("Click failed for {}: {}", candidate, e);
                    }
                }
            }
            if structured_failed {
                tools.extend(dedup_new_tools(&tools, parse_tools_from_text(&page.text)));
            }
        }

        if !page.has_link_containing(&format!("page={}", tool_page + 1)) {
            break;
        }
        tool_page += 1;
        if tool_page > MAX_TOOL_PAGES {
            tracing::warn!("Reached safety limit of {} tool pages", MAX_TOOL_PAGES);
            break;
        }
    }

    Ok(tools)
}

fn dedup_new_tools(existing: &[ToolRecord], incoming: Vec<ToolRecord>) -> Vec<ToolRecord> {
    incoming
        .into_iter()
        .filter(|tool| !existing.iter().any(|t| t.name == tool.name))
        .collect()
}
