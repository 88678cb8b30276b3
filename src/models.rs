//! Data models for search sessions, captured pages and extracted products.
//!
//! This module defines the core data structures used throughout the crate:
//! - [`SearchQuery`] and [`PageCap`]: what to search for and how far to walk
//! - [`CrawlSession`]: pagination state owned by the page walker
//! - [`PageResult`] and [`Corpus`]: raw tile markup in visitation order
//! - [`ProductRecord`]: the fixed-schema structured output of extraction

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How many result pages a crawl may visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCap {
    /// Visit at most this many pages (always at least 1).
    Limit(u32),
    /// Visit every page the pagination control advertises.
    All,
}

impl PageCap {
    /// Effective walk bound for a discovered page count.
    ///
    /// `All` resolves to `total_pages`; a numeric cap is clamped to it.
    pub fn bound(self, total_pages: u32) -> u32 {
        match self {
            PageCap::All => total_pages,
            PageCap::Limit(n) => n.min(total_pages),
        }
    }
}

impl FromStr for PageCap {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(PageCap::All);
        }
        match s.parse::<u32>() {
            Ok(0) => Err("page cap must be at least 1".to_string()),
            Ok(n) => Ok(PageCap::Limit(n)),
            Err(_) => Err(format!("expected a positive number or \"all\", got {s:?}")),
        }
    }
}

impl fmt::Display for PageCap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageCap::All => f.write_str("all"),
            PageCap::Limit(n) => write!(f, "{n}"),
        }
    }
}

/// The search a session runs. Immutable once the session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Text typed into the site's search box.
    pub term: String,
    /// Upper bound on pages to visit.
    pub page_cap: PageCap,
}

impl SearchQuery {
    pub fn new(term: impl Into<String>, page_cap: PageCap) -> Self {
        Self {
            term: term.into(),
            page_cap,
        }
    }
}

/// Lifecycle status of a crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Aborted,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Pagination state of one crawl.
///
/// `current_page` only moves forward one page at a time through
/// [`CrawlSession::advance`], and never past `walk_bound`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlSession {
    current_page: u32,
    total_pages: u32,
    walk_bound: u32,
    status: SessionStatus,
}

impl CrawlSession {
    /// Start a session on page 1. Zero counts are lifted to 1.
    pub fn new(total_pages: u32, page_cap: PageCap) -> Self {
        let total_pages = total_pages.max(1);
        Self {
            current_page: 1,
            total_pages,
            walk_bound: page_cap.bound(total_pages).max(1),
            status: SessionStatus::Running,
        }
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn walk_bound(&self) -> u32 {
        self.walk_bound
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Whether another page may be visited after the current one.
    pub fn has_next(&self) -> bool {
        self.status == SessionStatus::Running && self.current_page < self.walk_bound
    }

    /// Move to the next page. Returns `false` (and changes nothing) when the
    /// bound is already reached or the session is no longer running.
    pub fn advance(&mut self) -> bool {
        if !self.has_next() {
            return false;
        }
        self.current_page += 1;
        true
    }

    pub(crate) fn complete(&mut self) {
        if self.status == SessionStatus::Running {
            self.status = SessionStatus::Completed;
        }
    }
}

/// Raw markup of every result tile captured from one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResult {
    /// 1-based page number in visitation order.
    pub page_index: u32,
    /// Outer HTML of each tile, in on-page order.
    pub raw_tiles: Vec<String>,
}

/// Ordered collection of captured pages for one crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus {
    pages: Vec<PageResult>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a page; insertion order is visitation order.
    pub fn push(&mut self, page: PageResult) {
        self.pages.push(page);
    }

    pub fn pages(&self) -> &[PageResult] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Total tiles across all pages.
    pub fn tile_count(&self) -> usize {
        self.pages.iter().map(|p| p.raw_tiles.len()).sum()
    }
}

impl From<Vec<PageResult>> for Corpus {
    fn from(pages: Vec<PageResult>) -> Self {
        Self { pages }
    }
}

/// One product parsed out of a result tile.
///
/// Field order matches the CSV column order written by
/// [`crate::outputs::csv`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub name: Option<String>,
    pub price: Option<String>,
    pub original_price: Option<String>,
    pub rating: Option<String>,
    pub review_count: Option<String>,
    pub is_sponsored: bool,
    pub product_url: Option<String>,
    pub asin: Option<String>,
}
