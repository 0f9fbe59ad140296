//! Smithery-Mirror main entry point
//!
//! Command-line interface for harvesting the catalog, auditing a stored
//! snapshot against the live listing, rescraping a list of failed URLs,
//! and patching a snapshot with rescraped records.

use clap::{Parser, Subcommand};
use smithery_mirror::config::{AuditConfig, HarvestConfig, PageFailurePolicy};
use smithery_mirror::harvest::{collect_listing, HarvestOutcome, HarvestPool, HarvestStats};
use smithery_mirror::model::{normalize_server_url, ListingRef, BASE_URL};
use smithery_mirror::reconcile::{apply_patch, run_audit};
use smithery_mirror::render::HttpRenderer;
use smithery_mirror::store::{self, IncrementalSink};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Smithery-Mirror: a concurrent catalog harvester and reconciler
#[derive(Parser, Debug)]
#[command(name = "smithery-mirror")]
#[command(version)]
#[command(about = "Mirror and reconcile the smithery.ai server catalog", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Walk the listing and harvest every server into a snapshot
    Harvest {
        /// Final snapshot file (JSON array)
        #[arg(short, long, default_value = "servers.json")]
        output: PathBuf,

        /// Incremental partial file (JSONL, one record per line)
        #[arg(long, default_value = "servers_partial.jsonl")]
        partial: PathBuf,

        /// File receiving URLs that failed terminally
        #[arg(long, default_value = "failed_urls.json")]
        failed_output: PathBuf,

        /// Base URL of the catalog
        #[arg(long, default_value = BASE_URL)]
        base_url: String,

        /// Harvest only this listing page
        #[arg(long)]
        page: Option<u32>,

        /// Stop after this many listing pages
        #[arg(long)]
        max_pages: Option<u32>,

        /// Harvest at most this many servers
        #[arg(long)]
        limit: Option<usize>,

        /// Concurrent workers (1-10)
        #[arg(short, long, default_value_t = 1)]
        threads: usize,

        /// Retry attempts per page
        #[arg(long, default_value_t = 3)]
        max_attempts: u32,

        /// Record unrenderable listing pages and continue instead of aborting
        #[arg(long)]
        skip_failed_pages: bool,
    },

    /// Compare a stored snapshot against the live listing
    Audit {
        /// Snapshot file to audit (JSON array)
        #[arg(short, long, default_value = "servers.json")]
        input: PathBuf,

        /// Write the report as JSON instead of printing it
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Also write the missing server URLs as a rescrape input list
        #[arg(long, value_name = "FILE")]
        missing_output: Option<PathBuf>,

        /// Base URL of the catalog
        #[arg(long, default_value = BASE_URL)]
        base_url: String,

        /// Stop after this many listing pages
        #[arg(long)]
        max_pages: Option<u32>,

        /// Re-render each server and compare its live tool count,
        /// with this many concurrent workers
        #[arg(long, value_name = "THREADS")]
        recount: Option<usize>,

        /// Retry attempts per page
        #[arg(long, default_value_t = 3)]
        max_attempts: u32,
    },

    /// Re-harvest an explicit list of server URLs
    Rescrape {
        /// URL list to re-harvest (JSON array of strings)
        #[arg(short, long, default_value = "failed_urls.json")]
        input: PathBuf,

        /// Output file for the rescraped records (JSON array)
        #[arg(short, long, default_value = "rescraped.json")]
        output: PathBuf,

        /// Incremental partial file
        #[arg(long, default_value = "rescraped_partial.jsonl")]
        partial: PathBuf,

        /// Rescrape at most this many servers
        #[arg(long)]
        limit: Option<usize>,

        /// Base URL of the catalog
        #[arg(long, default_value = BASE_URL)]
        base_url: String,

        /// Concurrent workers (1-10)
        #[arg(short, long, default_value_t = 1)]
        threads: usize,

        /// Retry attempts per page
        #[arg(long, default_value_t = 3)]
        max_attempts: u32,
    },

    /// Fold rescraped records into a snapshot by server URL
    Patch {
        /// Snapshot to patch (JSON array)
        #[arg(short, long, default_value = "servers.json")]
        input: PathBuf,

        /// Rescraped records to apply (JSON array)
        #[arg(short, long, default_value = "rescraped.json")]
        updates: PathBuf,

        /// Where to write the patched snapshot; defaults to the input file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Base URL used to normalize record keys
        #[arg(long, default_value = BASE_URL)]
        base_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Harvest {
            output,
            partial,
            failed_output,
            base_url,
            page,
            max_pages,
            limit,
            threads,
            max_attempts,
            skip_failed_pages,
        } => {
            let mut config = HarvestConfig {
                base_url,
                page,
                max_pages,
                limit,
                threads,
                max_attempts,
                page_failure_policy: if skip_failed_pages {
                    PageFailurePolicy::Skip
                } else {
                    PageFailurePolicy::Abort
                },
                ..Default::default()
            };
            config.validate()?;
            handle_harvest(config, output, partial, failed_output).await
        }
        Command::Audit {
            input,
            report,
            missing_output,
            base_url,
            max_pages,
            recount,
            max_attempts,
        } => {
            let mut config = AuditConfig {
                base_url,
                max_pages,
                max_attempts,
                base_delay: Duration::from_secs(2),
                recount_threads: recount,
            };
            config.validate()?;
            handle_audit(config, input, report, missing_output).await
        }
        Command::Rescrape {
            input,
            output,
            partial,
            limit,
            base_url,
            threads,
            max_attempts,
        } => {
            let mut config = HarvestConfig {
                base_url,
                limit,
                threads,
                max_attempts,
                ..Default::default()
            };
            config.validate()?;
            handle_rescrape(config, input, output, partial).await
        }
        Command::Patch {
            input,
            updates,
            output,
            base_url,
        } => handle_patch(input, updates, output, base_url),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("smithery_mirror=info,warn"),
            1 => EnvFilter::new("smithery_mirror=debug,info"),
            2 => EnvFilter::new("smithery_mirror=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the harvest subcommand: walk, harvest, finalize
async fn handle_harvest(
    config: HarvestConfig,
    output: PathBuf,
    partial: PathBuf,
    failed_output: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let renderer: Arc<dyn smithery_mirror::render::Renderer> = Arc::new(HttpRenderer::new()?);

    tracing::info!("Scanning listing at {}", config.base_url);
    let listing = collect_listing(renderer.as_ref(), &config).await?;
    if listing.refs.is_empty() {
        tracing::warn!("Listing yielded no servers, nothing to harvest");
        return Ok(());
    }
    for page_error in &listing.page_errors {
        tracing::warn!("Listing page {} skipped: {}", page_error.page, page_error.error);
    }

    let sink = Arc::new(IncrementalSink::create(&partial)?);
    let pool = HarvestPool::new(renderer, config);
    install_stop_handler(&pool);

    let outcomes = pool.run(listing.refs, Some(sink.clone())).await;
    let records = sink.finalize()?;
    store::save_records(&output, &records)?;

    let failed: Vec<String> = outcomes
        .iter()
        .filter_map(|o| match o {
            HarvestOutcome::Failed(e) => Some(e.url.clone()),
            HarvestOutcome::Success(_) => None,
        })
        .collect();
    if !failed.is_empty() {
        store::save_url_list(&failed_output, &failed)?;
        tracing::warn!(
            "{} server(s) failed terminally; URLs saved to {}",
            failed.len(),
            failed_output.display()
        );
    }

    print_stats(&HarvestStats::from_outcomes(&outcomes), &output);
    Ok(())
}

/// Handles the audit subcommand
async fn handle_audit(
    config: AuditConfig,
    input: PathBuf,
    report_path: Option<PathBuf>,
    missing_output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = store::load_records(&input)?;
    tracing::info!("Auditing {} records from {}", snapshot.len(), input.display());

    let renderer: Arc<dyn smithery_mirror::render::Renderer> = Arc::new(HttpRenderer::new()?);
    let report = run_audit(renderer, &config, &snapshot).await?;

    if let Some(path) = missing_output {
        store::save_url_list(&path, &report.missing)?;
        println!(
            "{} missing URL(s) written to {}",
            report.missing.len(),
            path.display()
        );
    }

    match report_path {
        Some(path) => {
            std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
            println!("Report written to {}", path.display());
        }
        None => {
            println!("=== Audit Report ===");
            println!("Snapshot records: {}", report.scraped_count);
            println!("Live servers:     {}", report.current_count);
            print_key_list("Missing (live but not in snapshot)", &report.missing);
            print_key_list("Extra (in snapshot but not live)", &report.extra);
            if !report.mismatched.is_empty() {
                println!("Tool count mismatches ({}):", report.mismatched.len());
                for m in &report.mismatched {
                    match m.live_total {
                        Some(live) => println!(
                            "  - {} (advertised {}, harvested {}, live {})",
                            m.server_url, m.recorded_total, m.actual_total, live
                        ),
                        None => println!(
                            "  - {} (advertised {}, harvested {})",
                            m.server_url, m.recorded_total, m.actual_total
                        ),
                    }
                }
            }
            print_key_list("Duplicate keys", &report.duplicates);
            for page_error in &report.page_errors {
                println!("Page {} unreadable: {}", page_error.page, page_error.error);
            }
            if report.missing.is_empty()
                && report.extra.is_empty()
                && report.mismatched.is_empty()
                && report.duplicates.is_empty()
            {
                println!("Snapshot is in sync with the live listing");
            }
        }
    }
    Ok(())
}

fn print_key_list(label: &str, keys: &[String]) {
    if keys.is_empty() {
        return;
    }
    println!("{} ({}):", label, keys.len());
    for key in keys {
        println!("  - {}", key);
    }
}

/// Handles the rescrape subcommand: re-harvest an explicit URL list
async fn handle_rescrape(
    config: HarvestConfig,
    input: PathBuf,
    output: PathBuf,
    partial: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let urls = store::load_url_list(&input)?;
    if urls.is_empty() {
        tracing::warn!("{} holds no URLs, nothing to rescrape", input.display());
        return Ok(());
    }
    tracing::info!("Rescraping {} server(s) from {}", urls.len(), input.display());

    let mut refs: Vec<ListingRef> = urls
        .iter()
        .map(|url| ListingRef::new(normalize_server_url(url, &config.base_url), 0))
        .filter(|r| !r.url.is_empty())
        .collect();
    if let Some(limit) = config.limit {
        refs.truncate(limit);
    }

    let renderer: Arc<dyn smithery_mirror::render::Renderer> = Arc::new(HttpRenderer::new()?);
    let sink = Arc::new(IncrementalSink::create(&partial)?);
    let pool = HarvestPool::new(renderer, config);
    install_stop_handler(&pool);

    let outcomes = pool.run(refs, Some(sink.clone())).await;
    let records = sink.finalize()?;
    store::save_records(&output, &records)?;

    print_stats(&HarvestStats::from_outcomes(&outcomes), &output);
    Ok(())
}

/// Handles the patch subcommand
fn handle_patch(
    input: PathBuf,
    updates: PathBuf,
    output: Option<PathBuf>,
    base_url: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let current = store::load_records(&input)?;
    let incoming = store::load_records(&updates)?;
    tracing::info!(
        "Patching {} records with {} update(s)",
        current.len(),
        incoming.len()
    );

    let outcome = apply_patch(current, incoming, &base_url);
    let target = output.unwrap_or(input);
    store::save_records(&target, &outcome.records)?;

    println!(
        "Patched {} record(s), added {} new, {} total -> {}",
        outcome.updated,
        outcome.added,
        outcome.records.len(),
        target.display()
    );
    Ok(())
}

/// Lets Ctrl-C finish in-flight items instead of killing the process
fn install_stop_handler(pool: &HarvestPool) {
    let stop = pool.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight servers");
            stop.store(true, Ordering::SeqCst);
        }
    });
}

fn print_stats(stats: &HarvestStats, output: &std::path::Path) {
    println!("=== Harvest Summary ===");
    println!("Attempted: {}", stats.total);
    println!("Complete:  {}", stats.success);
    println!("Partial:   {}", stats.partial);
    println!("Failed:    {}", stats.failed);
    println!("Tools:     {}", stats.total_tools);
    println!("Snapshot:  {}", output.display());
}
