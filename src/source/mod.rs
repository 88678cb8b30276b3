//! Rendering backends the crawler drives.
//!
//! The crawler never talks to a browser directly. It drives a
//! [`RenderedPageSource`], which exposes the handful of DOM capabilities a
//! results walk needs: wait for a selector, find elements, read their markup
//! and text, click, type a search and reload.
//!
//! # Backends
//!
//! | Backend | Module | Notes |
//! |---------|--------|-------|
//! | Replay | [`replay`] | Saved result pages, offline and deterministic |
//! | Chrome | `chrome` | Live browser via `headless_chrome`; `chrome` feature |
//!
//! A source is owned by exactly one session and is never shared, so every
//! method takes `&mut self`.

use crate::error::SourceError;
use itertools::Itertools;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;

#[cfg(feature = "chrome")]
pub mod chrome;
pub mod replay;

#[cfg(feature = "chrome")]
pub use chrome::ChromeSource;
pub use replay::ReplaySource;

/// Markup and visible text of one element, copied out of the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSnapshot {
    outer_html: String,
    text: String,
}

impl ElementSnapshot {
    pub fn new(outer_html: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            outer_html: outer_html.into(),
            text: text.into(),
        }
    }

    /// Build a snapshot from a parsed element, collapsing whitespace in its text.
    pub fn from_element(element: ElementRef<'_>) -> Self {
        let text = element.text().flat_map(str::split_whitespace).join(" ");
        Self::new(element.html(), text)
    }

    pub fn outer_html(&self) -> &str {
        &self.outer_html
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_outer_html(self) -> String {
        self.outer_html
    }

    /// Read an attribute of the snapshot's root element.
    pub fn attr(&self, name: &str) -> Option<String> {
        let fragment = Html::parse_fragment(&self.outer_html);
        fragment
            .root_element()
            .children()
            .filter_map(ElementRef::wrap)
            .next()?
            .value()
            .attr(name)
            .map(str::to_string)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }
}

/// DOM capabilities of a rendered page.
///
/// Waits are bounded by the `timeout` argument; a timeout is reported as
/// [`SourceError::Timeout`] and is the only way a call gives up.
#[allow(async_fn_in_trait)]
pub trait RenderedPageSource {
    /// Wait until at least one element matches `selector`.
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), SourceError>;

    /// All elements currently matching `selector`, in document order.
    /// No match is an empty vector, not an error.
    async fn find_all(&mut self, selector: &str) -> Result<Vec<ElementSnapshot>, SourceError>;

    /// Click the first element matching `selector`.
    async fn click(&mut self, selector: &str) -> Result<(), SourceError>;

    /// Type `term` into the first element matching `selector` and submit it.
    async fn submit_search(&mut self, selector: &str, term: &str) -> Result<(), SourceError>;

    /// Fully reload the current page.
    async fn reload(&mut self) -> Result<(), SourceError>;

    /// Release the underlying session. Safe to call more than once.
    async fn close(&mut self);
}

impl<T: RenderedPageSource + ?Sized> RenderedPageSource for &mut T {
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), SourceError> {
        (**self).wait_for(selector, timeout).await
    }

    async fn find_all(&mut self, selector: &str) -> Result<Vec<ElementSnapshot>, SourceError> {
        (**self).find_all(selector).await
    }

    async fn click(&mut self, selector: &str) -> Result<(), SourceError> {
        (**self).click(selector).await
    }

    async fn submit_search(&mut self, selector: &str, term: &str) -> Result<(), SourceError> {
        (**self).submit_search(selector, term).await
    }

    async fn reload(&mut self) -> Result<(), SourceError> {
        (**self).reload().await
    }

    async fn close(&mut self) {
        (**self).close().await
    }
}

/// Parse a CSS selector, mapping the parse error into a [`SourceError`].
pub(crate) fn parse_selector(selector: &str) -> Result<Selector, SourceError> {
    Selector::parse(selector).map_err(|_| SourceError::InvalidSelector(selector.to_string()))
}

/// Snapshots of every element in `markup` matching `selector`.
pub(crate) fn select_snapshots(
    markup: &str,
    selector: &str,
) -> Result<Vec<ElementSnapshot>, SourceError> {
    let selector = parse_selector(selector)?;
    let document = Html::parse_document(markup);
    Ok(document
        .select(&selector)
        .map(ElementSnapshot::from_element)
        .collect())
}
