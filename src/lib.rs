//! # Listing Scrape
//!
//! Walks a retail site's paginated search results, captures the raw product
//! tiles of every visited page, and converts them into [`ProductRecord`]s
//! written to CSV (and optionally JSON).
//!
//! ## Architecture
//!
//! 1. **Entry**: find the search box (reloading on failure) and submit the term
//! 2. **Walk**: discover the page count, then capture tiles page by page
//! 3. **Capture**: save the raw tiles as an HTML document for later re-runs
//! 4. **Extraction**: parse tiles into records, skipping malformed ones
//! 5. **Output**: write the product table
//!
//! The crawler is written against [`source::RenderedPageSource`], so the
//! same walk runs over a live browser (`source::ChromeSource`, `chrome`
//! feature) or saved pages ([`source::ReplaySource`]).

pub mod audit;
pub mod config;
pub mod crawler;
pub mod error;
pub mod extract;
pub mod models;
pub mod outputs;
pub mod session;
pub mod source;
pub mod utils;

pub use config::CrawlConfig;
pub use models::{PageCap, ProductRecord, SearchQuery, SessionStatus};
pub use session::{OutputPlan, SessionReport, convert_capture, run_session};
