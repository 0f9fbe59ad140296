//! Pagination walker for the server listing
//!
//! Enumerates `/servers?page=N` into listing references for the worker
//! pool. The walker is careful to distinguish "page failed to render" from
//! "listing exhausted": a failed page is retried through the retry policy
//! and, only once exhausted, handled per the configured page-failure
//! policy; the walk terminates only when a page renders successfully and
//! yields nothing new.

use crate::config::{HarvestConfig, PageFailurePolicy, MAX_LISTING_PAGES};
use crate::harvest::extract::{extract_listing_refs, page_indicator};
use crate::harvest::retry::{Attempt, RetryPolicy};
use crate::model::{ListingRef, PageError};
use crate::render::Renderer;
use crate::MirrorError;
use std::collections::HashSet;

/// Result of walking the listing
#[derive(Debug, Default)]
pub struct Listing {
    /// Unique references in discovery order (sorted within each page)
    pub refs: Vec<ListingRef>,

    /// Pages that stayed unrenderable after retries (skip policy only)
    pub page_errors: Vec<PageError>,
}

/// Walks the paginated listing and collects detail-page references
///
/// Honors `config.page` (walk exactly that page), `config.limit` (cap on
/// collected references), and the page-failure policy. Aborting returns
/// [`MirrorError::ListingPage`]; skipping records the failure and moves on.
pub async fn collect_listing(
    renderer: &dyn Renderer,
    config: &HarvestConfig,
) -> Result<Listing, MirrorError> {
    let retry = RetryPolicy::new(config.max_attempts, config.base_delay);
    let single_page = config.page.is_some();
    let page_cap = config
        .max_pages
        .map_or(MAX_LISTING_PAGES, |m| m.min(MAX_LISTING_PAGES));
    let mut page_num = config.page.unwrap_or(1);

    let mut listing = Listing::default();
    let mut seen: HashSet<String> = HashSet::new();

    loop {
        tracing::info!("Scanning listing page {}", page_num);
        let page_url = format!("{}/servers?page={}", config.base_url, page_num);

        let rendered = retry
            .run(&format!("listing page {}", page_num), |_| {
                let url = page_url.clone();
                async move { Attempt::from_render(renderer.render(&url).await) }
            })
            .await;

        match rendered {
            Ok(page) => {
                if let Some((current, total)) = page_indicator(&page.text) {
                    tracing::debug!("Listing page indicator: {} / {}", current, total);
                }

                let refs = extract_listing_refs(&page, &config.base_url);
                if refs.is_empty() {
                    tracing::info!("No servers found on page {}, listing exhausted", page_num);
                    break;
                }

                let mut added = 0;
                for url in refs {
                    if seen.insert(url.clone()) {
                        listing.refs.push(ListingRef::new(url, page_num));
                        added += 1;
                    }
                }
                tracing::info!(
                    "Page {}: +{} new servers, {} total",
                    page_num,
                    added,
                    listing.refs.len()
                );

                if let Some(limit) = config.limit {
                    if listing.refs.len() >= limit {
                        listing.refs.truncate(limit);
                        tracing::info!("Reached server limit of {}", limit);
                        break;
                    }
                }
            }
            Err(exhausted) => match config.page_failure_policy {
                PageFailurePolicy::Abort => {
                    return Err(MirrorError::ListingPage {
                        page: page_num,
                        message: exhausted.to_string(),
                    });
                }
                PageFailurePolicy::Skip => {
                    tracing::warn!("Skipping unrenderable page {}: {}", page_num, exhausted);
                    listing.page_errors.push(PageError {
                        page: page_num,
                        error: exhausted.to_string(),
                    });
                }
            },
        }

        if single_page {
            break;
        }

        page_num += 1;
        if page_num > page_cap {
            tracing::warn!("Reached listing page limit of {}", page_cap);
            break;
        }
    }

    Ok(listing)
}
