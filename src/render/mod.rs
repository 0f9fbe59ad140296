//! Renderer capability consumed by the harvester
//!
//! The catalog is JavaScript-rendered and slow, so page loading sits behind
//! an opaque `Renderer` trait: given a URL it returns rendered text plus the
//! structured pieces the extractors need, or fails. The harvester treats the
//! backend as unreliable and wraps every call in the retry policy.

mod http;

pub use http::HttpRenderer;

use async_trait::async_trait;
use thiserror::Error;

/// Errors a renderer can produce
///
/// Everything except `InteractionUnsupported` is transient and retryable;
/// `InteractionUnsupported` is the capability probe that routes extraction
/// onto the degraded text-fallback path.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render timed out for {url}")]
    Timeout { url: String },

    #[error("navigation failed for {url}: {message}")]
    Navigation { url: String, message: String },

    #[error("HTTP {status} for {url}")]
    Http { url: String, status: u16 },

    #[error("rendered content empty for {url}")]
    EmptyContent { url: String },

    #[error("renderer does not support element interaction")]
    InteractionUnsupported,
}

impl RenderError {
    /// Whether retrying the same call could plausibly succeed
    pub fn is_transient(&self) -> bool {
        !matches!(self, RenderError::InteractionUnsupported)
    }
}

/// Result type for renderer operations
pub type RenderResult<T> = std::result::Result<T, RenderError>;

/// A hyperlink extracted from a rendered page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub href: String,
    pub text: String,
}

/// The rendered content of one page
///
/// `text` approximates what a user would read: text nodes joined one per
/// line, section headers on their own lines. `clickables` carries the text
/// of elements that could be expanded in an interactive renderer.
#[derive(Debug, Clone, Default)]
pub struct RenderedPage {
    /// Final URL of the page
    pub url: String,

    /// First top-level heading, if any
    pub heading: Option<String>,

    /// Content of the description meta tag, if any
    pub meta_description: Option<String>,

    /// Line-oriented rendered text
    pub text: String,

    /// All hyperlinks on the page
    pub links: Vec<Link>,

    /// Text of expandable/clickable elements (headings, buttons)
    pub clickables: Vec<String>,
}

impl RenderedPage {
    /// Whether any link on the page points at the given substring
    pub fn has_link_containing(&self, needle: &str) -> bool {
        self.links.iter().any(|link| link.href.contains(needle))
    }
}

/// Opaque page-rendering backend
///
/// Implementations must be safe to share across workers; renderers that
/// hold exclusive sessions should do their own internal check-out and
/// guarantee release on every exit path.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Loads a URL and returns its rendered content
    async fn render(&self, url: &str) -> RenderResult<RenderedPage>;

    /// Expands a clickable element on a previously rendered page and
    /// returns the page content after the interaction
    ///
    /// Renderers without interaction support return
    /// [`RenderError::InteractionUnsupported`], which callers use as the
    /// probe for selecting the text-fallback extraction variant.
    async fn click(&self, page: &RenderedPage, element_text: &str) -> RenderResult<RenderedPage>;
}
