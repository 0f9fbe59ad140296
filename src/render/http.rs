//! HTTP-backed renderer implementation
//!
//! Renders pages by fetching them over plain HTTP and extracting text,
//! links, and clickable-element candidates from the parsed DOM. It cannot
//! execute scripts or expand elements, so `click` reports
//! `InteractionUnsupported` and callers fall back to text parsing; sites
//! needing a real browser can supply their own `Renderer` implementation.

use crate::render::{Link, RenderError, RenderResult, RenderedPage, Renderer};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;

const USER_AGENT: &str = concat!("smithery-mirror/", env!("CARGO_PKG_VERSION"));

/// Renderer that fetches pages with reqwest and parses them with scraper
pub struct HttpRenderer {
    client: Client,
    selectors: Selectors,
}

struct Selectors {
    content: Selector,
    heading: Selector,
    meta_description: Selector,
    links: Selector,
    clickables: Selector,
}

impl Selectors {
    fn new() -> Self {
        // Static selector strings; parse failure is a programming error
        Self {
            content: Selector::parse("body, body *:not(script):not(style):not(noscript)")
                .expect("static selector"),
            heading: Selector::parse("h1").expect("static selector"),
            meta_description: Selector::parse("meta[name='description']")
                .expect("static selector"),
            links: Selector::parse("a[href]").expect("static selector"),
            clickables: Selector::parse("h3, h4, button, [role='button']")
                .expect("static selector"),
        }
    }
}

impl HttpRenderer {
    /// Builds a renderer with the crate's standard client configuration
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            selectors: Selectors::new(),
        })
    }

    /// Builds a renderer around an existing HTTP client
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            selectors: Selectors::new(),
        }
    }

    /// Parses a fetched HTML body into a rendered page
    fn parse_page(&self, url: &str, body: &str) -> RenderResult<RenderedPage> {
        let html = Html::parse_document(body);

        // Approximate what a user reads: each element's direct text
        // children become lines, script/style subtrees excluded.
        let mut lines = Vec::new();
        for element in html.select(&self.selectors.content) {
            for child in element.children() {
                if let Some(text) = child.value().as_text() {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        lines.push(trimmed.to_string());
                    }
                }
            }
        }
        let text = lines.join("\n");

        if text.trim().is_empty() {
            return Err(RenderError::EmptyContent {
                url: url.to_string(),
            });
        }

        let heading = html.select(&self.selectors.heading).next().map(|el| {
            el.text()
                .collect::<Vec<_>>()
                .join(" ")
                .trim()
                .to_string()
        });

        let meta_description = html
            .select(&self.selectors.meta_description)
            .next()
            .and_then(|el| el.value().attr("content"))
            .map(|content| content.trim().to_string());

        let links = html
            .select(&self.selectors.links)
            .filter_map(|el| {
                el.value().attr("href").map(|href| Link {
                    href: href.to_string(),
                    text: el.text().collect::<String>().trim().to_string(),
                })
            })
            .collect();

        let mut clickables = Vec::new();
        for el in html.select(&self.selectors.clickables) {
            let label = el.text().collect::<String>().trim().to_string();
            if !label.is_empty() && !clickables.contains(&label) {
                clickables.push(label);
            }
        }

        Ok(RenderedPage {
            url: url.to_string(),
            heading,
            meta_description,
            text,
            links,
            clickables,
        })
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn render(&self, url: &str) -> RenderResult<RenderedPage> {
        tracing::debug!("Rendering {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                RenderError::Timeout {
                    url: url.to_string(),
                }
            } else {
                RenderError::Navigation {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RenderError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let body = response.text().await.map_err(|e| RenderError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        self.parse_page(&final_url, &body)
    }

    async fn click(&self, _page: &RenderedPage, _element_text: &str) -> RenderResult<RenderedPage> {
        // No script engine, no interaction; callers take the text path
        Err(RenderError::InteractionUnsupported)
    }
}
