//! Offline backend that replays saved result pages.
//!
//! A replay starts on a landing page holding the search box. Submitting a
//! search moves to the first saved page, and every click moves one page
//! forward, so "next" clicks walk the recording in order. A click past the
//! last recorded page fails the way an unclickable control would.
//!
//! Pages can be loaded from a directory: every `*.html` file, sorted by
//! name, except `landing.html`, which (if present) replaces the default
//! landing page.

use super::{ElementSnapshot, RenderedPageSource, select_snapshots};
use crate::error::SourceError;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Landing page containing the site's default search box.
pub const DEFAULT_LANDING: &str = r#"<html><body><form action="/s"><input type="text" id="twotabsearchtextbox" name="field-keywords"></form></body></html>"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Landing,
    Results(usize),
}

/// Replays a fixed list of rendered result pages.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    landing: String,
    pages: Vec<String>,
    position: Position,
    searched: Option<String>,
    reloads: u32,
    closed: bool,
}

impl ReplaySource {
    pub fn new(pages: Vec<String>) -> Self {
        Self {
            landing: DEFAULT_LANDING.to_string(),
            pages,
            position: Position::Landing,
            searched: None,
            reloads: 0,
            closed: false,
        }
    }

    pub fn with_landing(mut self, landing: impl Into<String>) -> Self {
        self.landing = landing.into();
        self
    }

    /// Load every `*.html` file in `dir`, in file-name order.
    #[instrument(level = "info", skip_all, fields(dir = %dir.as_ref().display()))]
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, SourceError> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("html")) {
                files.push(path);
            }
        }
        files.sort();

        let mut landing = None;
        let mut pages = Vec::new();
        for path in files {
            let markup = std::fs::read_to_string(&path)?;
            if path.file_name().is_some_and(|name| name == "landing.html") {
                landing = Some(markup);
            } else {
                pages.push(markup);
            }
        }
        info!(pages = pages.len(), custom_landing = landing.is_some(), "Loaded replay pages");

        let source = Self::new(pages);
        Ok(match landing {
            Some(landing) => source.with_landing(landing),
            None => source,
        })
    }

    /// Term most recently submitted, if any.
    pub fn searched(&self) -> Option<&str> {
        self.searched.as_deref()
    }

    pub fn reloads(&self) -> u32 {
        self.reloads
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// 1-based index of the page being shown; `None` on the landing page.
    pub fn current_page(&self) -> Option<usize> {
        match self.position {
            Position::Landing => None,
            Position::Results(i) => Some(i + 1),
        }
    }

    fn markup(&self) -> &str {
        match self.position {
            Position::Landing => &self.landing,
            Position::Results(i) => self.pages.get(i).map(String::as_str).unwrap_or(""),
        }
    }

    fn ensure_open(&self) -> Result<(), SourceError> {
        if self.closed {
            Err(SourceError::Backend("replay session is closed".to_string()))
        } else {
            Ok(())
        }
    }
}

impl RenderedPageSource for ReplaySource {
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), SourceError> {
        self.ensure_open()?;
        // Recorded pages never change, so an absent element times out at once.
        if select_snapshots(self.markup(), selector)?.is_empty() {
            return Err(SourceError::Timeout {
                selector: selector.to_string(),
                timeout,
            });
        }
        Ok(())
    }

    async fn find_all(&mut self, selector: &str) -> Result<Vec<ElementSnapshot>, SourceError> {
        self.ensure_open()?;
        select_snapshots(self.markup(), selector)
    }

    async fn click(&mut self, selector: &str) -> Result<(), SourceError> {
        self.ensure_open()?;
        if select_snapshots(self.markup(), selector)?.is_empty() {
            return Err(SourceError::ElementNotFound(selector.to_string()));
        }
        match self.position {
            Position::Results(i) if i + 1 < self.pages.len() => {
                self.position = Position::Results(i + 1);
                debug!(page = i + 2, "Replay advanced");
                Ok(())
            }
            _ => Err(SourceError::Interaction {
                selector: selector.to_string(),
                reason: "no further page recorded".to_string(),
            }),
        }
    }

    async fn submit_search(&mut self, selector: &str, term: &str) -> Result<(), SourceError> {
        self.ensure_open()?;
        if self.position != Position::Landing {
            return Err(SourceError::Interaction {
                selector: selector.to_string(),
                reason: "search box is only on the landing page".to_string(),
            });
        }
        if select_snapshots(self.markup(), selector)?.is_empty() {
            return Err(SourceError::ElementNotFound(selector.to_string()));
        }
        self.searched = Some(term.to_string());
        self.position = Position::Results(0);
        Ok(())
    }

    async fn reload(&mut self) -> Result<(), SourceError> {
        self.ensure_open()?;
        self.reloads += 1;
        Ok(())
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::testing::listing_pages;
    use crate::utils::scratch_dir;

    const NEXT: &str = ".s-pagination-next";

    #[tokio::test]
    async fn test_search_then_click_through() {
        let mut source = ReplaySource::new(listing_pages(3, 2));
        assert_eq!(source.current_page(), None);

        source
            .submit_search("#twotabsearchtextbox", "laptop")
            .await
            .unwrap();
        assert_eq!(source.searched(), Some("laptop"));
        assert_eq!(source.current_page(), Some(1));

        source.click(NEXT).await.unwrap();
        source.click(NEXT).await.unwrap();
        assert_eq!(source.current_page(), Some(3));

        let err = source.click(NEXT).await.unwrap_err();
        assert!(matches!(err, SourceError::Interaction { .. }));
        assert_eq!(source.current_page(), Some(3));
    }

    #[tokio::test]
    async fn test_wait_for_missing_selector_times_out() {
        let mut source = ReplaySource::new(Vec::new());
        let err = source
            .wait_for(".s-result-item", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Timeout { .. }));
        assert!(
            source
                .wait_for("#twotabsearchtextbox", Duration::from_secs(1))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_closed_source_refuses_calls() {
        let mut source = ReplaySource::new(listing_pages(1, 1));
        source.close().await;
        assert!(source.is_closed());
        assert!(source.find_all("div").await.is_err());
    }

    #[tokio::test]
    async fn test_from_dir_orders_pages_and_picks_landing() {
        let dir = scratch_dir("replay");
        let pages = listing_pages(2, 1);
        std::fs::write(dir.join("page-002.html"), &pages[1]).unwrap();
        std::fs::write(dir.join("page-001.html"), &pages[0]).unwrap();
        std::fs::write(
            dir.join("landing.html"),
            r#"<html><body><input id="nav-search"></body></html>"#,
        )
        .unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let mut source = ReplaySource::from_dir(&dir).unwrap();
        source.submit_search("#nav-search", "desk").await.unwrap();
        let selected = source.find_all(".s-pagination-selected").await.unwrap();
        assert_eq!(selected[0].text(), "1");
        source.click(NEXT).await.unwrap();
        let selected = source.find_all(".s-pagination-selected").await.unwrap();
        assert_eq!(selected[0].text(), "2");
    }
}
