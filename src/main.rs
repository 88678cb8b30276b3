//! # Listing Scrape
//!
//! Command-line front end for the `listing_scrape` library.
//!
//! ## Usage
//!
//! ```sh
//! listing_scrape crawl laptop --pages 5 -o ./out
//! listing_scrape convert ./out/amazon_laptop_products.html --json
//! ```
//!
//! Every run writes an `amazon_scraper_<timestamp>.log` audit trail into the
//! output directory alongside the usual `tracing` output on stderr.

use clap::Parser;
use listing_scrape::audit::{AuditEvent, AuditSink, FileAudit, TracingAudit};
use listing_scrape::outputs::OutputPaths;
use listing_scrape::source::ReplaySource;
use listing_scrape::utils::ensure_writable_dir;
use listing_scrape::{
    CrawlConfig, OutputPlan, SearchQuery, SessionReport, SessionStatus, convert_capture,
    run_session,
};
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;

use cli::{Cli, Command, CrawlArgs};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("listing_scrape starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let common = args.command.common().clone();
    let config = match &common.config {
        Some(path) => {
            let config = CrawlConfig::load(path)?;
            info!(path = %path.display(), "Loaded config");
            config
        }
        None => CrawlConfig::default(),
    };

    // Early check: the capture, table and audit log all live here
    if let Err(e) = ensure_writable_dir(&common.output_dir).await {
        error!(
            path = %common.output_dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let file_audit = FileAudit::timestamped_in(&common.output_dir);
    info!(path = %file_audit.path().display(), "Audit trail");
    let audit = (file_audit, TracingAudit);

    let report = match args.command {
        Command::Crawl(crawl) => {
            let query = SearchQuery::new(crawl.term.clone(), crawl.pages);
            let plan = OutputPlan {
                paths: OutputPaths::for_term(&common.output_dir, &query.term),
                json: common.json,
            };
            crawl_term(&crawl, &query, &config, &plan, &audit).await?
        }
        Command::Convert(convert) => {
            let plan = OutputPlan {
                paths: OutputPaths::for_capture(&common.output_dir, &convert.capture),
                json: common.json,
            };
            convert_capture(&convert.capture, &config, &plan, &audit).await
        }
    };

    summarize(&report);
    info!(elapsed = ?start_time.elapsed(), "listing_scrape finished");

    if report.status == SessionStatus::Aborted {
        return Err("session aborted; see the audit trail for details".into());
    }
    Ok(())
}

/// Pick a backend for the crawl and run the session on it.
async fn crawl_term<A: AuditSink>(
    args: &CrawlArgs,
    query: &SearchQuery,
    config: &CrawlConfig,
    plan: &OutputPlan,
    audit: &A,
) -> Result<SessionReport, Box<dyn Error>> {
    if let Some(dir) = &args.replay {
        let source = match ReplaySource::from_dir(dir) {
            Ok(source) => source,
            Err(e) => return Err(abort_before_session(audit, e.into())),
        };
        return Ok(run_session(source, query, config, plan, audit).await?);
    }
    crawl_live(args, query, config, plan, audit).await
}

#[cfg(feature = "chrome")]
async fn crawl_live<A: AuditSink>(
    args: &CrawlArgs,
    query: &SearchQuery,
    config: &CrawlConfig,
    plan: &OutputPlan,
    audit: &A,
) -> Result<SessionReport, Box<dyn Error>> {
    use listing_scrape::source::ChromeSource;

    let headless = !args.show_browser;
    let launched = tokio::task::block_in_place(|| ChromeSource::launch(&config.start_url, headless));
    let source = match launched {
        Ok(source) => source,
        Err(e) => return Err(abort_before_session(audit, e.into())),
    };
    Ok(run_session(source, query, config, plan, audit).await?)
}

#[cfg(not(feature = "chrome"))]
async fn crawl_live<A: AuditSink>(
    _args: &CrawlArgs,
    _query: &SearchQuery,
    _config: &CrawlConfig,
    _plan: &OutputPlan,
    audit: &A,
) -> Result<SessionReport, Box<dyn Error>> {
    Err(abort_before_session(
        audit,
        "built without the `chrome` feature; rebuild with `--features chrome` or pass --replay DIR"
            .into(),
    ))
}

/// Close the audit trail for a session that never got a page source.
fn abort_before_session<A: AuditSink>(audit: &A, e: Box<dyn Error>) -> Box<dyn Error> {
    error!(error = %e, "No page source available");
    audit.record(&AuditEvent::SessionFailed {
        reason: e.to_string(),
    });
    audit.record(&AuditEvent::SessionEnded {
        status: SessionStatus::Aborted,
    });
    e
}

fn summarize(report: &SessionReport) {
    if let Some(end) = &report.walk_end {
        info!(%end, "Walk ended");
    }
    info!(
        status = %report.status,
        total_pages = report.total_pages,
        pages_captured = report.pages_captured,
        records = report.records.len(),
        extraction_failures = report.extraction_failures,
        "Session summary"
    );
    for path in &report.written {
        info!(path = %path.display(), "Output written");
    }
    for failure in &report.persistence_failures {
        warn!(path = %failure.path().display(), error = %failure, "Output not written");
    }
}
