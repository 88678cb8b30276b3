//! Crawl configuration loaded from an optional YAML file.
//!
//! Every field has a default matching the live site, so an empty file (or no
//! file at all) yields a working configuration.
//!
//! ```yaml
//! start_url: https://www.amazon.com
//! entry_retries: 3
//! settle_delay_ms: 2000
//! selectors:
//!   next_page: .s-pagination-next
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

/// Timing, retry and selector settings for a crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Page the rendering backend opens before looking for the search box.
    pub start_url: String,
    /// Base used to resolve relative product links.
    pub base_url: String,
    /// Attempts at locating the search box, with a reload between attempts.
    pub entry_retries: u32,
    pub entry_timeout_secs: u64,
    pub results_timeout_secs: u64,
    pub next_timeout_secs: u64,
    /// Pause after clicking "next" so the following page can render.
    pub settle_delay_ms: u64,
    /// Extra lookups of a missing "next" control before calling it the end.
    pub next_control_retries: u32,
    /// Pages extracted concurrently.
    pub extraction_concurrency: usize,
    pub selectors: PageSelectors,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            start_url: "https://www.amazon.com".to_string(),
            base_url: "https://www.amazon.com".to_string(),
            entry_retries: 3,
            entry_timeout_secs: 10,
            results_timeout_secs: 15,
            next_timeout_secs: 10,
            settle_delay_ms: 2000,
            next_control_retries: 1,
            extraction_concurrency: 4,
            selectors: PageSelectors::default(),
        }
    }
}

impl CrawlConfig {
    pub fn entry_timeout(&self) -> Duration {
        Duration::from_secs(self.entry_timeout_secs)
    }

    pub fn results_timeout(&self) -> Duration {
        Duration::from_secs(self.results_timeout_secs)
    }

    pub fn next_timeout(&self) -> Duration {
        Duration::from_secs(self.next_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Load a config file, falling back to defaults for missing keys.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(?config, "Loaded crawl configuration");
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }
}

/// CSS selectors for the page-level controls the crawler interacts with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSelectors {
    pub search_box: String,
    /// Presence means a results view has rendered.
    pub result_marker: String,
    /// Every element captured as a tile.
    pub result_tiles: String,
    pub pagination_items: String,
    pub next_page: String,
    /// Class carried by the next control on the last page.
    pub disabled_class: String,
}

impl Default for PageSelectors {
    fn default() -> Self {
        Self {
            search_box: "#twotabsearchtextbox".to_string(),
            result_marker: "[data-component-type='s-search-result']".to_string(),
            result_tiles: "[role='listitem'], [data-component-type='s-search-result']".to_string(),
            pagination_items: ".s-pagination-item".to_string(),
            next_page: ".s-pagination-next".to_string(),
            disabled_class: "s-pagination-disabled".to_string(),
        }
    }
}
