//! Output files written by a session.
//!
//! # Submodules
//!
//! - [`capture`]: the raw capture document (tile markup grouped by page)
//! - [`csv`]: the fixed-schema product table
//! - [`json`]: the same records as a JSON array
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── amazon_wireless_headphones_products.html   # raw capture
//! ├── amazon_wireless_headphones_products.csv    # 8-column table
//! ├── amazon_wireless_headphones_products.json   # optional
//! └── amazon_scraper_20250506_101500.log          # audit trail
//! ```

use crate::utils::file_stem_for_term;
use std::path::{Path, PathBuf};

pub mod capture;
pub mod csv;
pub mod json;

/// File locations for one search term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub capture: PathBuf,
    pub table: PathBuf,
    pub json: PathBuf,
}

impl OutputPaths {
    /// `amazon_<term>_products.{html,csv,json}` inside `dir`.
    pub fn for_term(dir: impl AsRef<Path>, term: &str) -> Self {
        let stem = format!("amazon_{}_products", file_stem_for_term(term));
        Self::for_stem(dir, &stem)
    }

    /// Outputs named after an existing capture file, for re-conversion.
    pub fn for_capture(dir: impl AsRef<Path>, capture: &Path) -> Self {
        let stem = capture
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "capture".to_string());
        Self::for_stem(dir, &stem)
    }

    fn for_stem(dir: impl AsRef<Path>, stem: &str) -> Self {
        let dir = dir.as_ref();
        Self {
            capture: dir.join(format!("{stem}.html")),
            table: dir.join(format!("{stem}.csv")),
            json: dir.join(format!("{stem}.json")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_for_term() {
        let paths = OutputPaths::for_term("/out", "wireless headphones");
        assert_eq!(
            paths.capture,
            PathBuf::from("/out/amazon_wireless_headphones_products.html")
        );
        assert_eq!(
            paths.table,
            PathBuf::from("/out/amazon_wireless_headphones_products.csv")
        );
        assert_eq!(
            paths.json,
            PathBuf::from("/out/amazon_wireless_headphones_products.json")
        );
    }

    #[test]
    fn test_paths_for_capture() {
        let paths = OutputPaths::for_capture("/out", Path::new("/in/amazon_desk_products.html"));
        assert_eq!(paths.table, PathBuf::from("/out/amazon_desk_products.csv"));
    }
}
