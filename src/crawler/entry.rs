//! Getting from the landing page to the first results view.

use crate::audit::{AuditEvent, AuditSink};
use crate::config::CrawlConfig;
use crate::error::{AcquisitionError, NavigationError, SessionError};
use crate::models::SearchQuery;
use crate::source::RenderedPageSource;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// Locates the search box, submits the query and confirms results rendered.
pub struct EntryAcquirer<'a, A: AuditSink + ?Sized> {
    config: &'a CrawlConfig,
    audit: &'a A,
}

impl<'a, A: AuditSink + ?Sized> EntryAcquirer<'a, A> {
    pub fn new(config: &'a CrawlConfig, audit: &'a A) -> Self {
        Self { config, audit }
    }

    /// Run the entry sequence.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Acquisition`] when the search box is still missing
    ///   after `entry_retries` attempts (the page is reloaded between them).
    /// - [`SessionError::Navigation`] when submitting fails or no result
    ///   tile appears within `results_timeout`.
    #[instrument(level = "info", skip_all, fields(term = %query.term))]
    pub async fn acquire<S: RenderedPageSource>(
        &self,
        source: &mut S,
        query: &SearchQuery,
    ) -> Result<(), SessionError> {
        let selectors = &self.config.selectors;
        let max = self.config.entry_retries.max(1);
        let t0 = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match source
                .wait_for(&selectors.search_box, self.config.entry_timeout())
                .await
            {
                Ok(()) => break,
                Err(e) if attempt < max => {
                    warn!(attempt, max, error = %e, "Search box missing; reloading");
                    self.audit.record(&AuditEvent::EntryRetry { attempt, max });
                    if let Err(reload_err) = source.reload().await {
                        warn!(error = %reload_err, "Reload failed");
                    }
                }
                Err(e) => {
                    error!(
                        attempt,
                        max,
                        elapsed_ms_total = t0.elapsed().as_millis(),
                        error = %e,
                        "Search box never appeared"
                    );
                    self.audit.record(&AuditEvent::EntryFailed {
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                    return Err(AcquisitionError {
                        selector: selectors.search_box.clone(),
                        attempts: attempt,
                        last: e,
                    }
                    .into());
                }
            }
        }

        self.audit.record(&AuditEvent::SearchSubmitted {
            term: query.term.clone(),
        });
        source
            .submit_search(&selectors.search_box, &query.term)
            .await
            .map_err(NavigationError::Submit)?;

        source
            .wait_for(&selectors.result_marker, self.config.results_timeout())
            .await
            .map_err(|source| NavigationError::ResultsNotLoaded { page: 1, source })?;

        info!(
            attempts = attempt,
            elapsed_ms_total = t0.elapsed().as_millis(),
            "Results view reached"
        );
        Ok(())
    }
}
