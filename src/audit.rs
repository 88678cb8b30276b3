//! Audit trail of session events.
//!
//! The crawler reports what happened through an injectable [`AuditSink`]
//! rather than writing log files itself. Each [`AuditEvent`] has a stable
//! `kind()` for machine consumers and a human-readable `Display` form.
//!
//! # Events
//!
//! | Event Kind | Description |
//! |------------|-------------|
//! | `entry.retry` | Search box missing, page reloaded |
//! | `entry.failed` | Search box never appeared |
//! | `entry.submitted` | Search term submitted |
//! | `pages.discovered` | Total page count and walk bound |
//! | `page.started` | A results page is being processed |
//! | `page.captured` | Tiles captured from a page |
//! | `walk.ended` | Why the walk stopped |
//! | `extraction.failed` | One tile skipped |
//! | `extraction.completed` | Records and failures for the batch |
//! | `output.completed` | An output file was written |
//! | `output.failed` | An output file could not be written |
//! | `session.failed` | Fatal error; nothing extracted |
//! | `session.ended` | Always the last event of a session |

use crate::crawler::WalkEnd;
use crate::models::SessionStatus;
use chrono::Local;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};

/// Something worth recording about a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEvent {
    EntryRetry { attempt: u32, max: u32 },
    EntryFailed { attempts: u32, reason: String },
    SearchSubmitted { term: String },
    PagesDiscovered { total_pages: u32, walk_bound: u32 },
    PageStarted { page: u32, walk_bound: u32 },
    PageCaptured { page: u32, tiles: usize },
    WalkEnded { end: WalkEnd, pages: usize },
    ExtractionFailed { page: u32, tile: usize, reason: String },
    ExtractionCompleted { records: usize, failures: usize },
    OutputWritten { path: PathBuf, description: String },
    OutputFailed { path: PathBuf, reason: String },
    SessionFailed { reason: String },
    SessionEnded { status: SessionStatus },
}

impl AuditEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::EntryRetry { .. } => "entry.retry",
            AuditEvent::EntryFailed { .. } => "entry.failed",
            AuditEvent::SearchSubmitted { .. } => "entry.submitted",
            AuditEvent::PagesDiscovered { .. } => "pages.discovered",
            AuditEvent::PageStarted { .. } => "page.started",
            AuditEvent::PageCaptured { .. } => "page.captured",
            AuditEvent::WalkEnded { .. } => "walk.ended",
            AuditEvent::ExtractionFailed { .. } => "extraction.failed",
            AuditEvent::ExtractionCompleted { .. } => "extraction.completed",
            AuditEvent::OutputWritten { .. } => "output.completed",
            AuditEvent::OutputFailed { .. } => "output.failed",
            AuditEvent::SessionFailed { .. } => "session.failed",
            AuditEvent::SessionEnded { .. } => "session.ended",
        }
    }

    fn is_failure(&self) -> bool {
        matches!(
            self,
            AuditEvent::EntryFailed { .. }
                | AuditEvent::OutputFailed { .. }
                | AuditEvent::SessionFailed { .. }
        )
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditEvent::EntryRetry { attempt, max } => write!(
                f,
                "Search bar not found, reloading page (attempt {attempt}/{max})"
            ),
            AuditEvent::EntryFailed { attempts, reason } => write!(
                f,
                "Search bar not found after {attempts} attempts: {reason}"
            ),
            AuditEvent::SearchSubmitted { term } => write!(f, "Searching for: {term}"),
            AuditEvent::PagesDiscovered {
                total_pages,
                walk_bound,
            } => write!(
                f,
                "Found {total_pages} pages of results, walking {walk_bound}"
            ),
            AuditEvent::PageStarted { page, walk_bound } => {
                write!(f, "Processing page {page} of {walk_bound}...")
            }
            AuditEvent::PageCaptured { page, tiles } => {
                write!(f, "Captured {tiles} tiles from page {page}")
            }
            AuditEvent::WalkEnded { end, pages } => {
                write!(f, "{end}; captured {pages} pages")
            }
            AuditEvent::ExtractionFailed { page, tile, reason } => write!(
                f,
                "Skipped tile {tile} on page {page}: {reason}"
            ),
            AuditEvent::ExtractionCompleted { records, failures } => write!(
                f,
                "Extracted {records} records ({failures} tiles skipped)"
            ),
            AuditEvent::OutputWritten { path, description } => {
                write!(f, "Saved {description} to {}", path.display())
            }
            AuditEvent::OutputFailed { path, reason } => {
                write!(f, "Could not write {}: {reason}", path.display())
            }
            AuditEvent::SessionFailed { reason } => write!(f, "Error: {reason}"),
            AuditEvent::SessionEnded { status } => {
                write!(f, "Scraping session ended ({status})")
            }
        }
    }
}

/// Destination for audit events.
pub trait AuditSink {
    fn record(&self, event: &AuditEvent);
}

impl<T: AuditSink + ?Sized> AuditSink for &T {
    fn record(&self, event: &AuditEvent) {
        (**self).record(event)
    }
}

/// Fan out to two sinks.
impl<A: AuditSink, B: AuditSink> AuditSink for (A, B) {
    fn record(&self, event: &AuditEvent) {
        self.0.record(event);
        self.1.record(event);
    }
}

/// Mirrors events into `tracing` with an `event_kind` field.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAudit;

impl AuditSink for TracingAudit {
    fn record(&self, event: &AuditEvent) {
        if event.is_failure() {
            error!(event_kind = event.kind(), "{event}");
        } else if matches!(event, AuditEvent::ExtractionFailed { .. } | AuditEvent::EntryRetry { .. }) {
            warn!(event_kind = event.kind(), "{event}");
        } else {
            info!(event_kind = event.kind(), "{event}");
        }
    }
}

/// Append-only, timestamped text file.
///
/// The file is reopened in append mode for every event so that a crash
/// loses at most the event being written.
#[derive(Debug, Clone)]
pub struct FileAudit {
    path: PathBuf,
}

impl FileAudit {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `amazon_scraper_YYYYmmdd_HHMMSS.log` inside `dir`.
    pub fn timestamped_in(dir: impl AsRef<Path>) -> Self {
        let name = format!("amazon_scraper_{}.log", Local::now().format("%Y%m%d_%H%M%S"));
        Self::new(dir.as_ref().join(name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for FileAudit {
    fn record(&self, event: &AuditEvent) {
        let line = format!("[{}] {event}\n", Local::now().format("%Y-%m-%d %H:%M:%S"));
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "Failed to append audit event");
        }
    }
}

/// Keeps events in memory; used by tests and callers that inspect the trail.
#[derive(Debug, Default)]
pub struct MemoryAudit {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(AuditEvent::kind).collect()
    }
}

impl AuditSink for MemoryAudit {
    fn record(&self, event: &AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}
