//! Harvest and audit configuration with validation
//!
//! Parameters arrive from the CLI rather than a config file; validation
//! clamps or rejects values the upstream source cannot tolerate, most
//! importantly the worker-pool concurrency cap.

use std::time::Duration;
use thiserror::Error;

/// Hard cap on concurrent workers; more risks upstream rate limiting
pub const MAX_THREADS: usize = 10;

/// Safety limit on listing pages walked in one run
pub const MAX_LISTING_PAGES: u32 = 100;

/// Safety limit on tool pages walked for one server
pub const MAX_TOOL_PAGES: u32 = 100;

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("thread count must be at least 1, got {0}")]
    ThreadsTooLow(usize),

    #[error("max attempts must be at least 1, got {0}")]
    AttemptsTooLow(u32),

    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// What to do when a whole listing page stays unrenderable after retries
///
/// An entire-page failure usually indicates a systemic outage rather than a
/// per-item fluke, so the default aborts the walk instead of silently
/// truncating the listing. Skip-and-continue is available for operators who
/// prefer resilience over completeness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageFailurePolicy {
    #[default]
    Abort,
    Skip,
}

/// Configuration for a harvest run
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Base URL of the catalog
    pub base_url: String,

    /// Specific listing page to walk; None walks from page 1 until empty
    pub page: Option<u32>,

    /// Limit on listing pages walked; always capped by [`MAX_LISTING_PAGES`]
    pub max_pages: Option<u32>,

    /// Maximum number of servers to harvest
    pub limit: Option<usize>,

    /// Worker-pool concurrency (1..=10)
    pub threads: usize,

    /// Retry attempts per fallible render/extraction step
    pub max_attempts: u32,

    /// Base backoff delay; attempt N waits N times this
    pub base_delay: Duration,

    /// Whole-page failure handling during the listing walk
    pub page_failure_policy: PageFailurePolicy,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            base_url: crate::model::BASE_URL.to_string(),
            page: None,
            max_pages: None,
            limit: None,
            threads: 1,
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            page_failure_policy: PageFailurePolicy::Abort,
        }
    }
}

impl HarvestConfig {
    /// Validates and clamps the configuration
    ///
    /// Thread counts above the hard cap are clamped with a warning, matching
    /// the upstream rate-limit guidance; zero threads or zero attempts are
    /// rejected outright.
    pub fn validate(&mut self) -> ConfigResult<()> {
        if self.threads < 1 {
            return Err(ConfigError::ThreadsTooLow(self.threads));
        }
        if self.threads > MAX_THREADS {
            tracing::warn!(
                "thread count {} exceeds cap, clamping to {}",
                self.threads,
                MAX_THREADS
            );
            self.threads = MAX_THREADS;
        }
        if self.max_attempts < 1 {
            return Err(ConfigError::AttemptsTooLow(self.max_attempts));
        }
        if url::Url::parse(&self.base_url).is_err() {
            return Err(ConfigError::InvalidBaseUrl(self.base_url.clone()));
        }
        Ok(())
    }
}

/// Configuration for an audit run
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Base URL of the catalog
    pub base_url: String,

    /// Limit on listing pages scanned; None scans until an empty page
    pub max_pages: Option<u32>,

    /// Retry attempts per listing-page render
    pub max_attempts: u32,

    /// Base backoff delay between retries
    pub base_delay: Duration,

    /// Concurrency for the optional live tool recount; None disables it
    pub recount_threads: Option<usize>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            base_url: crate::model::BASE_URL.to_string(),
            max_pages: None,
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            recount_threads: None,
        }
    }
}

impl AuditConfig {
    pub fn validate(&mut self) -> ConfigResult<()> {
        if self.max_attempts < 1 {
            return Err(ConfigError::AttemptsTooLow(self.max_attempts));
        }
        if let Some(threads) = self.recount_threads {
            if threads < 1 {
                return Err(ConfigError::ThreadsTooLow(threads));
            }
            if threads > MAX_THREADS {
                tracing::warn!(
                    "recount thread count {} exceeds cap, clamping to {}",
                    threads,
                    MAX_THREADS
                );
                self.recount_threads = Some(MAX_THREADS);
            }
        }
        if url::Url::parse(&self.base_url).is_err() {
            return Err(ConfigError::InvalidBaseUrl(self.base_url.clone()));
        }
        Ok(())
    }

    /// Builds the walker-facing view of this audit configuration
    pub fn walk_config(&self) -> HarvestConfig {
        HarvestConfig {
            base_url: self.base_url.clone(),
            page: None,
            max_pages: self.max_pages,
            limit: None,
            threads: 1,
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            // An audit that silently truncates the listing would report
            // phantom "extra" servers, so page failures are recorded and
            // the walk continues.
            page_failure_policy: PageFailurePolicy::Skip,
        }
    }
}
