//! Data model for harvested catalog records
//!
//! This module defines the records that flow through the harvester and the
//! reconciliation pass: tool records nested inside server records, ephemeral
//! listing references produced by the pagination walker, and the audit
//! report emitted when a snapshot is compared against the live listing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// Default base URL of the mirrored catalog
pub const BASE_URL: &str = "https://smithery.ai";

/// A single tool exposed by a server, schema passed through unvalidated
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolRecord {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Arbitrary JSON schema document; the harvester never interprets it
    #[serde(rename = "inputSchema", default = "empty_object_schema")]
    pub input_schema: Value,
}

fn empty_object_schema() -> Value {
    serde_json::json!({})
}

impl ToolRecord {
    /// Creates a tool with an empty `{type: object, properties: {}}` schema
    pub fn bare(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({"type": "object", "properties": {}}),
        }
    }
}

/// One server entry in the catalog, keyed by `server_url`
///
/// `total_tools` records the count advertised on the detail page. It is
/// expected to equal `tools.len()`, but upstream rendering failures can
/// leave the two disagreeing; that disagreement is exactly what the
/// reconciliation pass flags, so the harvester preserves the advertised
/// count rather than papering over it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerRecord {
    #[serde(default)]
    pub server_name: String,

    /// Primary key; unique within a snapshot
    #[serde(default)]
    pub server_url: String,

    #[serde(default)]
    pub connection_url: String,

    #[serde(default)]
    pub homepage: String,

    #[serde(default)]
    pub source_code: String,

    #[serde(default)]
    pub authentication_method: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub total_tools: usize,

    #[serde(default)]
    pub tools: Vec<ToolRecord>,
}

impl ServerRecord {
    /// Creates an empty record for the given server URL
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_name: String::new(),
            server_url: server_url.into(),
            connection_url: String::new(),
            homepage: String::new(),
            source_code: String::new(),
            authentication_method: String::new(),
            description: String::new(),
            total_tools: 0,
            tools: Vec::new(),
        }
    }

    /// Fills defaults so every persisted record has a consistent shape
    ///
    /// The advertised `total_tools` is kept as-is when present; it is only
    /// backfilled from the harvested tool list when the page never exposed
    /// a count. Overwriting it would erase the signal the audit pass uses
    /// to detect partially harvested servers.
    pub fn normalize(&mut self) {
        if self.server_name.trim().is_empty() {
            self.server_name = "Unknown".to_string();
        }
        if self.authentication_method.is_empty() {
            self.authentication_method = "OAuth".to_string();
        }
        if self.total_tools == 0 {
            self.total_tools = self.tools.len();
        }
    }

    /// True when the advertised tool count matches the harvested list
    pub fn tool_count_consistent(&self) -> bool {
        self.total_tools == self.tools.len()
    }
}

/// A minimal pointer to one catalog item awaiting detailed harvest
///
/// Created per listing page, consumed once by the worker pool, never
/// persisted standalone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRef {
    /// Normalized detail-page URL
    pub url: String,

    /// Listing page the reference was discovered on (0 for re-harvest lists)
    pub page_index: u32,
}

impl ListingRef {
    pub fn new(url: impl Into<String>, page_index: u32) -> Self {
        Self {
            url: url.into(),
            page_index,
        }
    }
}

/// A page-level failure recorded while walking the listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageError {
    pub page: u32,
    pub error: String,
}

/// A server whose recorded tool count disagrees with the counted one
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Mismatch {
    pub server_url: String,

    /// Tool count the detail page advertised when the record was harvested
    pub recorded_total: usize,

    /// Tools actually held by the snapshot record
    pub actual_total: usize,

    /// Advertised count observed by a live recount, when one ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_total: Option<usize>,
}

/// Result of auditing a snapshot against the live listing
///
/// Drift (non-empty `missing`/`extra`/`mismatched`) is a normal report
/// outcome, not a failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuditReport {
    /// Unique keys found in the snapshot
    pub scraped_count: usize,

    /// Unique keys found in the live listing
    pub current_count: usize,

    /// Keys present live but absent from the snapshot (sorted)
    pub missing: Vec<String>,

    /// Keys present in the snapshot but absent live (sorted)
    pub extra: Vec<String>,

    /// Keys whose recorded tool count disagrees with the actual count
    pub mismatched: Vec<Mismatch>,

    /// Keys appearing more than once in the snapshot; a data-quality
    /// defect reported here, never silently resolved
    pub duplicates: Vec<String>,

    /// Page-level walk errors (populated under the skip policy)
    pub page_errors: Vec<PageError>,
}

/// Normalizes a server URL so snapshot and live keys compare consistently
///
/// Strips query and fragment, strips the trailing slash, and resolves
/// relative `/server/` paths against the base URL. Unparseable input is
/// returned trimmed rather than dropped so defects stay visible downstream.
pub fn normalize_server_url(raw: &str, base_url: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let absolute = if trimmed.starts_with('/') {
        format!("{}{}", base_url.trim_end_matches('/'), trimmed)
    } else {
        trimmed.to_string()
    };

    match Url::parse(&absolute) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            let mut out = url.to_string();
            while out.ends_with('/') {
                out.pop();
            }
            out
        }
        Err(_) => trimmed.trim_end_matches('/').to_string(),
    }
}

/// Extracts the server slug from a detail-page URL
pub fn server_slug(url: &str) -> &str {
    url.split("/server/")
        .nth(1)
        .map(|rest| rest.split('?').next().unwrap_or(rest))
        .unwrap_or("")
}

/// Builds the connection URL advertised for a server slug
pub fn connection_url_for(slug: &str) -> String {
    format!("https://server.smithery.ai/{}/mcp", slug)
}
