//! Integration tests for the harvest pipeline
//!
//! These tests use wiremock to stand in for the catalog and exercise the
//! full cycle end-to-end: listing walk, concurrent detail harvest with
//! retries, incremental persistence, and finalization.

use smithery_mirror::config::{HarvestConfig, PageFailurePolicy};
use smithery_mirror::harvest::{collect_listing, HarvestOutcome, HarvestPool, HarvestStats};
use smithery_mirror::render::HttpRenderer;
use smithery_mirror::store::IncrementalSink;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Builds the listing-page HTML for a set of server slugs
fn listing_html(slugs: &[&str]) -> String {
    let links: String = slugs
        .iter()
        .map(|slug| format!(r#"<a href="/server/{}">{}</a>"#, slug, slug))
        .collect();
    format!(
        r#"<html><body><h1>Servers</h1><div>Browse the catalog</div>{}</body></html>"#,
        links
    )
}

fn empty_listing_html() -> String {
    r#"<html><body><h1>Servers</h1><div>No servers found</div></body></html>"#.to_string()
}

/// Builds a detail page advertising one tool, parseable by the text fallback
fn detail_html(name: &str, homepage: &str) -> String {
    format!(
        r#"<html><head><meta name="description" content="{name} does useful things"></head>
        <body>
        <h1>{name}</h1>
        <div>Details</div>
        <div>Homepage</div><div>{homepage}</div>
        <div>Tools</div><div>1</div>
        <h3>search_engine</h3>
        <p>Searches the web for documents matching the given query.</p>
        <div>Connect</div>
        </body></html>"#
    )
}

async fn mount_listing(server: &MockServer, page: u32, body: String) {
    Mock::given(method("GET"))
        .and(path("/servers"))
        .and(query_param("page", page.to_string()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

async fn mount_detail(server: &MockServer, slug: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(format!("/server/{}", slug)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

fn test_config(base_url: String, threads: usize) -> HarvestConfig {
    HarvestConfig {
        base_url,
        threads,
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_full_harvest_with_flaky_detail_page() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    // Three listing pages of two servers each, then an empty page
    let slugs = [["s1a", "s1b"], ["s2a", "s2b"], ["s3a", "s3b"]];
    for (i, page_slugs) in slugs.iter().enumerate() {
        mount_listing(&mock_server, i as u32 + 1, listing_html(page_slugs)).await;
    }
    mount_listing(&mock_server, 4, empty_listing_html()).await;

    // One detail page fails twice before rendering; the pool's retries
    // must absorb that without losing the record
    Mock::given(method("GET"))
        .and(path("/server/s2b"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;

    for page_slugs in &slugs {
        for slug in page_slugs {
            mount_detail(&mock_server, slug, detail_html(slug, "example.com")).await;
        }
    }

    let config = test_config(base_url, 2);
    let renderer: Arc<dyn smithery_mirror::render::Renderer> =
        Arc::new(HttpRenderer::new().unwrap());

    let listing = collect_listing(renderer.as_ref(), &config).await.unwrap();
    assert_eq!(listing.refs.len(), 6);
    assert!(listing.page_errors.is_empty());

    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(IncrementalSink::create(dir.path().join("partial.jsonl")).unwrap());

    let pool = HarvestPool::new(renderer, config);
    let outcomes = pool.run(listing.refs, Some(sink.clone())).await;

    let stats = HarvestStats::from_outcomes(&outcomes);
    assert_eq!(stats.total, 6);
    assert_eq!(stats.success, 6);
    assert_eq!(stats.failed, 0);

    // Every record reached the durable partial file
    let records = sink.finalize().unwrap();
    assert_eq!(records.len(), 6);
    let flaky = records
        .iter()
        .find(|r| r.server_url.ends_with("/server/s2b"))
        .unwrap();
    assert_eq!(flaky.server_name, "s2b");
    assert_eq!(flaky.total_tools, 1);
    assert_eq!(flaky.tools.len(), 1);
    assert_eq!(flaky.tools[0].name, "search_engine");
}

#[tokio::test]
async fn test_harvested_record_fields() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_listing(&mock_server, 1, listing_html(&["alpha"])).await;
    mount_listing(&mock_server, 2, empty_listing_html()).await;
    mount_detail(&mock_server, "alpha", detail_html("alpha", "alpha.example.com")).await;

    let config = test_config(base_url.clone(), 1);
    let renderer: Arc<dyn smithery_mirror::render::Renderer> =
        Arc::new(HttpRenderer::new().unwrap());

    let listing = collect_listing(renderer.as_ref(), &config).await.unwrap();
    let pool = HarvestPool::new(renderer, config);
    let outcomes = pool.run(listing.refs, None).await;

    let HarvestOutcome::Success(record) = &outcomes[0] else {
        panic!("expected success");
    };
    assert_eq!(record.server_url, format!("{}/server/alpha", base_url));
    assert_eq!(record.server_name, "alpha");
    assert_eq!(record.description, "alpha does useful things");
    assert_eq!(record.homepage, "https://alpha.example.com");
    assert_eq!(record.connection_url, "https://server.smithery.ai/alpha/mcp");
    assert_eq!(record.authentication_method, "OAuth");
    assert!(record.tool_count_consistent());
}

#[tokio::test]
async fn test_dead_detail_page_isolated_from_batch() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_listing(&mock_server, 1, listing_html(&["alive", "dead"])).await;
    mount_listing(&mock_server, 2, empty_listing_html()).await;
    mount_detail(&mock_server, "alive", detail_html("alive", "example.com")).await;
    // "dead" always returns 500; its wiremock fallthrough is a 404 anyway

    let config = test_config(base_url, 2);
    let renderer: Arc<dyn smithery_mirror::render::Renderer> =
        Arc::new(HttpRenderer::new().unwrap());

    let listing = collect_listing(renderer.as_ref(), &config).await.unwrap();
    let pool = HarvestPool::new(renderer, config);
    let outcomes = pool.run(listing.refs, None).await;

    let stats = HarvestStats::from_outcomes(&outcomes);
    assert_eq!(stats.total, 2);
    assert_eq!(stats.success, 1);
    assert_eq!(stats.failed, 1);

    let failure = outcomes
        .iter()
        .find_map(|o| match o {
            HarvestOutcome::Failed(e) => Some(e),
            HarvestOutcome::Success(_) => None,
        })
        .unwrap();
    assert!(failure.url.ends_with("/server/dead"));
    assert_eq!(failure.attempts, 3);
}

#[tokio::test]
async fn test_abort_on_unrenderable_listing_page() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_listing(&mock_server, 1, listing_html(&["alpha"])).await;
    // Page 2 never renders; default policy must abort rather than treat
    // the failure as the end of the listing

    let config = test_config(base_url, 1);
    assert_eq!(config.page_failure_policy, PageFailurePolicy::Abort);

    let renderer = HttpRenderer::new().unwrap();
    let result = collect_listing(&renderer, &config).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_skip_policy_records_page_failure() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_listing(&mock_server, 1, listing_html(&["alpha"])).await;
    mount_listing(&mock_server, 3, listing_html(&["beta"])).await;
    mount_listing(&mock_server, 4, empty_listing_html()).await;

    let mut config = test_config(base_url, 1);
    config.page_failure_policy = PageFailurePolicy::Skip;

    let renderer = HttpRenderer::new().unwrap();
    let listing = collect_listing(&renderer, &config).await.unwrap();

    assert_eq!(listing.refs.len(), 2);
    assert_eq!(listing.page_errors.len(), 1);
    assert_eq!(listing.page_errors[0].page, 2);
}
