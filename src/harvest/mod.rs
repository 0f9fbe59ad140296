//! Dataset harvesting: retries, pagination, extraction, and the worker pool
//!
//! - [`retry`] bounds every flaky operation with backoff and fallback
//! - [`walker`] enumerates listing pages into detail references
//! - [`extract`] turns rendered pages into records
//! - [`pool`] fans detail harvesting out across bounded workers

pub mod extract;
pub mod pool;
pub mod retry;
pub mod walker;

pub use extract::{
    extract_listing_refs, extract_server_fields, extract_tool_from_expanded, looks_like_tool_name,
    page_indicator, parse_tools_from_text,
};
pub use pool::{HarvestError, HarvestOutcome, HarvestPool, HarvestStats};
pub use retry::{Attempt, RetryExhausted, RetryPolicy};
pub use walker::{collect_listing, Listing};
