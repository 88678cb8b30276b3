//! Live browser backend built on `headless_chrome`.
//!
//! `headless_chrome` is synchronous, so each call runs inside
//! [`tokio::task::block_in_place`]; this requires the multi-threaded runtime.
//! Dropping the source (or calling [`RenderedPageSource::close`]) shuts the
//! browser down.

use super::{ElementSnapshot, RenderedPageSource};
use crate::error::SourceError;
use headless_chrome::browser::tab::NoElementFound;
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::block_in_place;
use tracing::{debug, info, instrument, warn};

/// A Chrome tab driven over the DevTools protocol.
pub struct ChromeSource {
    browser: Option<Browser>,
    tab: Arc<Tab>,
}

impl std::fmt::Debug for ChromeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromeSource")
            .field("open", &self.browser.is_some())
            .finish()
    }
}

fn backend(e: impl Display) -> SourceError {
    SourceError::Backend(e.to_string())
}

/// Whether a query error only means nothing matched the selector.
fn is_no_match(e: &(dyn std::error::Error + Send + Sync + 'static)) -> bool {
    e.downcast_ref::<NoElementFound>().is_some()
}

impl ChromeSource {
    /// Start Chrome and open `start_url` in a fresh tab.
    #[instrument(level = "info", skip_all, fields(%start_url, headless))]
    pub fn launch(start_url: &str, headless: bool) -> Result<Self, SourceError> {
        let options = LaunchOptions::default_builder()
            .headless(headless)
            .build()
            .map_err(backend)?;
        let browser = Browser::new(options).map_err(backend)?;
        let tab = browser.new_tab().map_err(backend)?;
        tab.navigate_to(start_url).map_err(backend)?;
        tab.wait_until_navigated().map_err(backend)?;
        info!("Browser launched");
        Ok(Self {
            browser: Some(browser),
            tab,
        })
    }

    fn snapshot(element: &Element<'_>) -> Result<ElementSnapshot, SourceError> {
        let outer_html = element
            .call_js_fn("function() { return this.outerHTML; }", vec![], false)
            .map_err(backend)?
            .value
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let text = element.get_inner_text().map_err(backend)?;
        Ok(ElementSnapshot::new(outer_html, text))
    }
}

impl RenderedPageSource for ChromeSource {
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), SourceError> {
        let tab = &self.tab;
        block_in_place(|| {
            tab.wait_for_element_with_custom_timeout(selector, timeout)
                .map(|_| ())
                .map_err(|e| {
                    debug!(selector, error = %e, "Wait failed");
                    SourceError::Timeout {
                        selector: selector.to_string(),
                        timeout,
                    }
                })
        })
    }

    async fn find_all(&mut self, selector: &str) -> Result<Vec<ElementSnapshot>, SourceError> {
        let tab = &self.tab;
        block_in_place(|| {
            // headless_chrome reports "no match" as an error.
            let elements = match tab.find_elements(selector) {
                Ok(elements) => elements,
                Err(e) if is_no_match(&*e) => {
                    debug!(selector, "No elements found");
                    return Ok(Vec::new());
                }
                Err(e) => return Err(backend(e)),
            };
            elements.iter().map(Self::snapshot).collect()
        })
    }

    async fn click(&mut self, selector: &str) -> Result<(), SourceError> {
        let tab = &self.tab;
        block_in_place(|| {
            let element = tab
                .find_element(selector)
                .map_err(|_| SourceError::ElementNotFound(selector.to_string()))?;
            element.click().map_err(|e| SourceError::Interaction {
                selector: selector.to_string(),
                reason: e.to_string(),
            })?;
            Ok(())
        })
    }

    async fn submit_search(&mut self, selector: &str, term: &str) -> Result<(), SourceError> {
        let tab = &self.tab;
        block_in_place(|| {
            let input = tab
                .find_element(selector)
                .map_err(|_| SourceError::ElementNotFound(selector.to_string()))?;
            let interaction = |reason: String| SourceError::Interaction {
                selector: selector.to_string(),
                reason,
            };
            input.click().map_err(|e| interaction(e.to_string()))?;
            input.type_into(term).map_err(|e| interaction(e.to_string()))?;
            tab.press_key("Enter").map_err(|e| interaction(e.to_string()))?;
            Ok(())
        })
    }

    async fn reload(&mut self) -> Result<(), SourceError> {
        let tab = &self.tab;
        block_in_place(|| {
            tab.reload(false, None).map_err(backend)?;
            tab.wait_until_navigated().map_err(backend)?;
            Ok(())
        })
    }

    async fn close(&mut self) {
        if let Some(browser) = self.browser.take() {
            if let Err(e) = block_in_place(|| self.tab.close(true)) {
                warn!(error = %e, "Failed to close tab cleanly");
            }
            drop(browser);
            info!("Browser closed");
        }
    }
}
