//! One search session from landing page to output files.
//!
//! The pipeline runs in stages, each handing a concrete value to the next:
//!
//! 1. **Crawl**: entry and walk produce a [`Corpus`]
//! 2. **Capture**: the corpus is saved as a raw HTML document
//! 3. **Extraction**: tiles become [`ProductRecord`]s, bad tiles are skipped
//! 4. **Output**: records are written to CSV (and optionally JSON)
//!
//! The page source is closed as soon as the crawl stage returns, whatever
//! its outcome, and the audit trail always ends with a `session.ended`
//! event. A failed output file is reported but does not stop the others.

use crate::audit::{AuditEvent, AuditSink};
use crate::config::CrawlConfig;
use crate::crawler::{self, WalkEnd};
use crate::error::{PersistenceError, SessionError};
use crate::extract::ProductExtractor;
use crate::models::{Corpus, ProductRecord, SearchQuery, SessionStatus};
use crate::outputs::{OutputPaths, capture, csv, json};
use crate::source::RenderedPageSource;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, instrument};

/// Where a session writes its files.
#[derive(Debug, Clone)]
pub struct OutputPlan {
    pub paths: OutputPaths,
    /// Also write the records as JSON.
    pub json: bool,
}

/// What a session produced.
#[derive(Debug)]
pub struct SessionReport {
    pub status: SessionStatus,
    pub total_pages: u32,
    pub pages_captured: usize,
    pub walk_end: Option<WalkEnd>,
    pub records: Vec<ProductRecord>,
    pub extraction_failures: usize,
    pub written: Vec<PathBuf>,
    pub persistence_failures: Vec<PersistenceError>,
}

/// Run a full session against `source`.
///
/// # Errors
///
/// Returns [`SessionError`] when the crawl aborts before any page could be
/// captured (search box never found, no results view). Nothing is extracted
/// or written in that case; the source is still closed and the audit trail
/// still records the failure and the session end.
#[instrument(level = "info", skip_all, fields(term = %query.term, cap = %query.page_cap))]
pub async fn run_session<S, A>(
    mut source: S,
    query: &SearchQuery,
    config: &CrawlConfig,
    plan: &OutputPlan,
    audit: &A,
) -> Result<SessionReport, SessionError>
where
    S: RenderedPageSource,
    A: AuditSink + ?Sized,
{
    let start_time = Instant::now();
    let crawled = crawler::crawl(&mut source, query, config, audit).await;
    source.close().await;

    let outcome = match crawled {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "Session aborted");
            audit.record(&AuditEvent::SessionFailed {
                reason: e.to_string(),
            });
            audit.record(&AuditEvent::SessionEnded {
                status: SessionStatus::Aborted,
            });
            return Err(e);
        }
    };

    let total_pages = outcome.session.total_pages();
    let mut report = SessionReport {
        status: outcome.session.status(),
        total_pages,
        pages_captured: outcome.corpus.len(),
        walk_end: Some(outcome.end),
        records: Vec::new(),
        extraction_failures: 0,
        written: Vec::new(),
        persistence_failures: Vec::new(),
    };

    let saved = capture::write_capture(&plan.paths.capture, &query.term, total_pages, &outcome.corpus).await;
    record_output(&mut report, audit, &plan.paths.capture, "raw capture", saved);

    convert_corpus(&outcome.corpus, config, plan, audit, &mut report).await;

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        pages = report.pages_captured,
        records = report.records.len(),
        failures = report.extraction_failures,
        "Session complete"
    );
    audit.record(&AuditEvent::SessionEnded {
        status: report.status,
    });
    Ok(report)
}

/// Convert a previously saved capture file, without a browser.
///
/// Always returns a report; an unreadable capture shows up as a
/// persistence failure with no records.
#[instrument(level = "info", skip_all, fields(capture = %capture_path.display()))]
pub async fn convert_capture<A: AuditSink + ?Sized>(
    capture_path: &Path,
    config: &CrawlConfig,
    plan: &OutputPlan,
    audit: &A,
) -> SessionReport {
    let mut report = SessionReport {
        status: SessionStatus::Completed,
        total_pages: 0,
        pages_captured: 0,
        walk_end: None,
        records: Vec::new(),
        extraction_failures: 0,
        written: Vec::new(),
        persistence_failures: Vec::new(),
    };

    match capture::read_capture(capture_path).await {
        Ok(capture) => {
            report.pages_captured = capture.corpus.len();
            report.total_pages = capture
                .total_pages
                .unwrap_or(capture.corpus.len() as u32);
            convert_corpus(&capture.corpus, config, plan, audit, &mut report).await;
        }
        Err(e) => {
            audit.record(&AuditEvent::OutputFailed {
                path: capture_path.to_path_buf(),
                reason: e.to_string(),
            });
            report.status = SessionStatus::Aborted;
            report.persistence_failures.push(e);
        }
    }

    audit.record(&AuditEvent::SessionEnded {
        status: report.status,
    });
    report
}

/// Extraction and record outputs, shared by live and offline runs.
async fn convert_corpus<A: AuditSink + ?Sized>(
    corpus: &Corpus,
    config: &CrawlConfig,
    plan: &OutputPlan,
    audit: &A,
    report: &mut SessionReport,
) {
    let extractor = ProductExtractor::new(&config.base_url);
    let extraction = extractor
        .extract_corpus(corpus, config.extraction_concurrency)
        .await;
    for failure in &extraction.failures {
        audit.record(&AuditEvent::ExtractionFailed {
            page: failure.page,
            tile: failure.tile,
            reason: failure.error.to_string(),
        });
    }
    audit.record(&AuditEvent::ExtractionCompleted {
        records: extraction.records.len(),
        failures: extraction.failures.len(),
    });
    report.extraction_failures = extraction.failures.len();
    report.records = extraction.records;

    let saved = csv::write_records(&plan.paths.table, &report.records);
    record_output(report, audit, &plan.paths.table, "product table", saved);

    if plan.json {
        let saved = json::write_records(&plan.paths.json, &report.records).await;
        record_output(report, audit, &plan.paths.json, "JSON records", saved);
    }
}

fn record_output<A: AuditSink + ?Sized>(
    report: &mut SessionReport,
    audit: &A,
    path: &Path,
    description: &str,
    result: Result<(), PersistenceError>,
) {
    match result {
        Ok(()) => {
            audit.record(&AuditEvent::OutputWritten {
                path: path.to_path_buf(),
                description: format!("{description} from {} pages", report.pages_captured),
            });
            report.written.push(path.to_path_buf());
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Output failed");
            audit.record(&AuditEvent::OutputFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
            report.persistence_failures.push(e);
        }
    }
}
