//! Smithery-Mirror: a concurrent catalog harvester and reconciler
//!
//! This crate maintains a local mirror of the smithery.ai server catalog.
//! It walks the paginated listing, harvests each server's detail page and
//! nested tool records across a bounded worker pool, persists every record
//! incrementally so a killed run loses nothing, and reconciles a previously
//! captured snapshot against the live listing to detect drift.

pub mod config;
pub mod harvest;
pub mod model;
pub mod reconcile;
pub mod render;
pub mod store;

use thiserror::Error;

/// Main error type for Smithery-Mirror operations
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Render error: {0}")]
    Render(#[from] render::RenderError),

    #[error("Retries exhausted: {0}")]
    Retry(#[from] harvest::RetryExhausted),

    #[error("Listing page {page} unrenderable after retries: {message}")]
    ListingPage { page: u32, message: String },

    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Smithery-Mirror operations
pub type Result<T> = std::result::Result<T, MirrorError>;

// Re-export commonly used types
pub use config::{AuditConfig, HarvestConfig, PageFailurePolicy};
pub use model::{AuditReport, ListingRef, ServerRecord, ToolRecord};
pub use render::{RenderError, RenderedPage, Renderer};
pub use store::IncrementalSink;
