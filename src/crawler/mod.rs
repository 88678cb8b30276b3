//! Driving a rendered page from the search box to a captured [`Corpus`].
//!
//! A crawl runs in two phases:
//!
//! 1. **Entry** ([`EntryAcquirer`]): find the search box (with reloads between
//!    attempts), submit the term, wait for the first results view.
//! 2. **Walk** ([`PageWalker`]): read the page count off the pagination
//!    strip, then capture every page up to the walk bound, stopping early
//!    when the "next" control is disabled or cannot be used.
//!
//! Failures in phase 1 are fatal. Phase 2 only fails when page 1 shows no
//! results; every other way of stopping is a normal completion described by
//! [`WalkEnd`].
//!
//! [`Corpus`]: crate::models::Corpus

use crate::audit::AuditSink;
use crate::config::CrawlConfig;
use crate::error::SessionError;
use crate::models::SearchQuery;
use crate::source::RenderedPageSource;
use std::fmt;

mod entry;
mod walker;

pub use entry::EntryAcquirer;
pub use walker::{NextPage, PageCountDiscovery, PageWalker, WalkOutcome};

/// Why a walk stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkEnd {
    /// Reached min(page cap, total pages).
    BoundReached,
    /// The next control was disabled on this page.
    LastPage { page: u32 },
    /// The next control could not be found or clicked after this page.
    NextUnreachable { page: u32, reason: String },
    /// This page never showed results after navigating to it.
    PageUnavailable { page: u32, reason: String },
}

impl fmt::Display for WalkEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalkEnd::BoundReached => f.write_str("Reached the requested number of pages"),
            WalkEnd::LastPage { page } => {
                write!(f, "Reached the last page of results at page {page}")
            }
            WalkEnd::NextUnreachable { page, reason } => write!(
                f,
                "Could not find or click next page button after page {page} ({reason})"
            ),
            WalkEnd::PageUnavailable { page, reason } => {
                write!(f, "Page {page} did not load ({reason})")
            }
        }
    }
}

/// Run entry and walk against `source`.
///
/// The source is left open; closing it is the caller's job so that it
/// happens on every path.
pub async fn crawl<S, A>(
    source: &mut S,
    query: &SearchQuery,
    config: &CrawlConfig,
    audit: &A,
) -> Result<WalkOutcome, SessionError>
where
    S: RenderedPageSource,
    A: AuditSink + ?Sized,
{
    EntryAcquirer::new(config, audit)
        .acquire(source, query)
        .await?;
    let outcome = PageWalker::new(source, config, audit).walk(query).await?;
    Ok(outcome)
}
