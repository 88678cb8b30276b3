//! Page-count discovery and the results walk.

use super::WalkEnd;
use crate::audit::{AuditEvent, AuditSink};
use crate::config::CrawlConfig;
use crate::error::{NavigationError, SourceError};
use crate::models::{Corpus, CrawlSession, PageResult, SearchQuery};
use crate::source::RenderedPageSource;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// How the total page count was determined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCountDiscovery {
    /// Read from the second-to-last pagination element.
    Found(u32),
    /// Fewer than two pagination elements; a single page is assumed.
    NoPagination,
    /// The label was not a positive number, or the query failed.
    Unreadable(String),
}

impl PageCountDiscovery {
    pub fn total_pages(&self) -> u32 {
        match self {
            PageCountDiscovery::Found(n) => *n,
            _ => 1,
        }
    }
}

/// Result of trying to move past the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextPage {
    Advanced,
    /// The control carries the disabled marker.
    Disabled,
    /// The control could not be found or clicked.
    Unreachable(String),
}

/// Everything the walk produced.
#[derive(Debug, Clone)]
pub struct WalkOutcome {
    pub session: CrawlSession,
    pub corpus: Corpus,
    pub end: WalkEnd,
}

/// Walks result pages, capturing tiles until the bound or the last page.
pub struct PageWalker<'a, S, A: AuditSink + ?Sized> {
    source: &'a mut S,
    config: &'a CrawlConfig,
    audit: &'a A,
}

impl<'a, S: RenderedPageSource, A: AuditSink + ?Sized> PageWalker<'a, S, A> {
    pub fn new(source: &'a mut S, config: &'a CrawlConfig, audit: &'a A) -> Self {
        Self {
            source,
            config,
            audit,
        }
    }

    /// Read the total page count off the pagination strip. Never fails.
    pub async fn discover_total_pages(&mut self) -> PageCountDiscovery {
        let items = match self
            .source
            .find_all(&self.config.selectors.pagination_items)
            .await
        {
            Ok(items) => items,
            Err(e) => return PageCountDiscovery::Unreadable(e.to_string()),
        };
        if items.len() < 2 {
            return PageCountDiscovery::NoPagination;
        }
        // The last item is the "next" control, not a page number.
        let label = items[items.len() - 2].text().trim();
        match label.parse::<u32>() {
            Ok(n) if n >= 1 => PageCountDiscovery::Found(n),
            _ => PageCountDiscovery::Unreadable(format!("label {label:?} is not a page count")),
        }
    }

    /// Discover the page count, then capture pages up to the walk bound.
    ///
    /// Ending early because the next control is disabled or unreachable is a
    /// normal completion. Only a first page that never shows results is an
    /// error; the caller then aborts the session.
    #[instrument(level = "info", skip_all, fields(term = %query.term, cap = %query.page_cap))]
    pub async fn walk(mut self, query: &SearchQuery) -> Result<WalkOutcome, NavigationError> {
        let discovery = self.discover_total_pages().await;
        if let PageCountDiscovery::Unreadable(reason) = &discovery {
            warn!(%reason, "Could not read page count; assuming one page");
        }
        let mut session = CrawlSession::new(discovery.total_pages(), query.page_cap);
        self.audit.record(&AuditEvent::PagesDiscovered {
            total_pages: session.total_pages(),
            walk_bound: session.walk_bound(),
        });

        let mut corpus = Corpus::new();
        let end = loop {
            let page = session.current_page();
            self.audit.record(&AuditEvent::PageStarted {
                page,
                walk_bound: session.walk_bound(),
            });

            let tiles = match self.capture_page().await {
                Ok(tiles) => tiles,
                Err(source) if page == 1 => {
                    return Err(NavigationError::ResultsNotLoaded { page, source });
                }
                Err(e) => {
                    warn!(page, error = %e, "Page did not load; ending walk");
                    break WalkEnd::PageUnavailable {
                        page,
                        reason: e.to_string(),
                    };
                }
            };
            self.audit.record(&AuditEvent::PageCaptured {
                page,
                tiles: tiles.len(),
            });
            corpus.push(PageResult {
                page_index: page,
                raw_tiles: tiles,
            });

            if !session.has_next() {
                break WalkEnd::BoundReached;
            }
            match self.next_page().await {
                NextPage::Advanced => {
                    sleep(self.config.settle_delay()).await;
                    session.advance();
                }
                NextPage::Disabled => break WalkEnd::LastPage { page },
                NextPage::Unreachable(reason) => break WalkEnd::NextUnreachable { page, reason },
            }
        };

        session.complete();
        info!(pages = corpus.len(), tiles = corpus.tile_count(), %end, "Walk finished");
        self.audit.record(&AuditEvent::WalkEnded {
            end: end.clone(),
            pages: corpus.len(),
        });
        Ok(WalkOutcome {
            session,
            corpus,
            end,
        })
    }

    /// Wait for the results marker, then copy out every tile.
    async fn capture_page(&mut self) -> Result<Vec<String>, SourceError> {
        let selectors = &self.config.selectors;
        self.source
            .wait_for(&selectors.result_marker, self.config.results_timeout())
            .await?;
        let tiles = self.source.find_all(&selectors.result_tiles).await?;
        Ok(tiles.into_iter().map(|t| t.into_outer_html()).collect())
    }

    /// Try the next control, retrying a missing one `next_control_retries` times.
    async fn next_page(&mut self) -> NextPage {
        let retries = self.config.next_control_retries;
        let mut attempt = 0;
        loop {
            match self.try_next_page().await {
                Ok(outcome) => return outcome,
                Err(e) if attempt < retries => {
                    attempt += 1;
                    debug!(attempt, retries, error = %e, "Next control unavailable; retrying");
                }
                Err(e) => return NextPage::Unreachable(e.to_string()),
            }
        }
    }

    async fn try_next_page(&mut self) -> Result<NextPage, SourceError> {
        let selectors = &self.config.selectors;
        self.source
            .wait_for(&selectors.next_page, self.config.next_timeout())
            .await?;
        let controls = self.source.find_all(&selectors.next_page).await?;
        let control = controls
            .first()
            .ok_or_else(|| SourceError::ElementNotFound(selectors.next_page.clone()))?;
        if control.has_class(&selectors.disabled_class) {
            return Ok(NextPage::Disabled);
        }
        self.source.click(&selectors.next_page).await?;
        Ok(NextPage::Advanced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAudit;
    use crate::crawler::EntryAcquirer;
    use crate::models::{PageCap, SessionStatus};
    use crate::source::ReplaySource;
    use crate::source::testing::{FlakySource, listing_page, listing_pages};

    fn fast_config() -> CrawlConfig {
        CrawlConfig {
            settle_delay_ms: 0,
            ..CrawlConfig::default()
        }
    }

    async fn walk_pages<S: RenderedPageSource>(
        source: &mut S,
        cap: PageCap,
        audit: &MemoryAudit,
    ) -> WalkOutcome {
        walk_pages_with(source, cap, audit, &fast_config()).await
    }

    async fn walk_pages_with<S: RenderedPageSource>(
        source: &mut S,
        cap: PageCap,
        audit: &MemoryAudit,
        config: &CrawlConfig,
    ) -> WalkOutcome {
        let query = SearchQuery::new("laptop", cap);
        EntryAcquirer::new(config, audit)
            .acquire(source, &query)
            .await
            .unwrap();
        PageWalker::new(source, config, audit)
            .walk(&query)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_cap_below_total_visits_cap_pages() {
        let audit = MemoryAudit::new();
        let mut source = ReplaySource::new(listing_pages(10, 4));

        let outcome = walk_pages(&mut source, PageCap::Limit(5), &audit).await;

        assert_eq!(outcome.corpus.len(), 5);
        assert_eq!(outcome.session.total_pages(), 10);
        assert_eq!(outcome.session.current_page(), 5);
        assert_eq!(outcome.session.status(), SessionStatus::Completed);
        assert_eq!(outcome.end, WalkEnd::BoundReached);
        let indexes: Vec<_> = outcome.corpus.pages().iter().map(|p| p.page_index).collect();
        assert_eq!(indexes, vec![1, 2, 3, 4, 5]);
        assert_eq!(source.current_page(), Some(5));
    }

    #[tokio::test]
    async fn test_cap_all_visits_every_page() {
        let audit = MemoryAudit::new();
        let mut source = ReplaySource::new(listing_pages(3, 2));

        let outcome = walk_pages(&mut source, PageCap::All, &audit).await;

        assert_eq!(outcome.corpus.len(), 3);
        assert_eq!(outcome.corpus.tile_count(), 6);
        assert_eq!(outcome.end, WalkEnd::BoundReached);
        assert!(audit.events().contains(&AuditEvent::PagesDiscovered {
            total_pages: 3,
            walk_bound: 3,
        }));
    }

    #[tokio::test]
    async fn test_cap_above_total_is_clamped() {
        let audit = MemoryAudit::new();
        let mut source = ReplaySource::new(listing_pages(2, 1));

        let outcome = walk_pages(&mut source, PageCap::Limit(50), &audit).await;

        assert_eq!(outcome.corpus.len(), 2);
        assert_eq!(outcome.session.walk_bound(), 2);
    }

    #[tokio::test]
    async fn test_disabled_next_stops_early_as_completed() {
        let audit = MemoryAudit::new();
        // Pagination claims 6 pages, but page 2 is really the last one.
        let pages = vec![
            listing_page(1, 6, 2, false),
            listing_page(2, 6, 2, true),
            listing_page(3, 6, 2, false),
        ];
        let mut source = ReplaySource::new(pages);

        let outcome = walk_pages(&mut source, PageCap::Limit(5), &audit).await;

        assert_eq!(outcome.corpus.len(), 2);
        assert_eq!(outcome.end, WalkEnd::LastPage { page: 2 });
        assert_eq!(outcome.session.status(), SessionStatus::Completed);
        assert_eq!(outcome.session.current_page(), 2);
    }

    #[tokio::test]
    async fn test_unclickable_next_is_completed_not_aborted() {
        let audit = MemoryAudit::new();
        let mut source =
            FlakySource::new(ReplaySource::new(listing_pages(4, 2))).fail_clicks(".s-pagination-next");

        let outcome = walk_pages(&mut source, PageCap::All, &audit).await;

        assert_eq!(outcome.corpus.len(), 1);
        assert!(matches!(outcome.end, WalkEnd::NextUnreachable { page: 1, .. }));
        assert_eq!(outcome.session.status(), SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_missing_next_control_is_retried_once() {
        let audit = MemoryAudit::new();
        let mut source = FlakySource::new(ReplaySource::new(listing_pages(3, 1)))
            .fail_waits(".s-pagination-next", 1);

        let outcome = walk_pages(&mut source, PageCap::All, &audit).await;

        assert_eq!(outcome.corpus.len(), 3);
        assert_eq!(outcome.end, WalkEnd::BoundReached);
    }

    #[tokio::test]
    async fn test_no_pagination_means_single_page() {
        let audit = MemoryAudit::new();
        let page = r#"<html><body>
            <div data-component-type="s-search-result"><h2 aria-label="Only"></h2></div>
            </body></html>"#;
        let mut source = ReplaySource::new(vec![page.to_string()]);

        let outcome = walk_pages(&mut source, PageCap::Limit(10), &audit).await;

        assert_eq!(outcome.session.total_pages(), 1);
        assert_eq!(outcome.corpus.len(), 1);
        assert_eq!(outcome.end, WalkEnd::BoundReached);
    }

    #[tokio::test]
    async fn test_unreadable_page_count_defaults_to_one() {
        let config = fast_config();
        let audit = MemoryAudit::new();
        let page = r#"<html><body>
            <div data-component-type="s-search-result"></div>
            <span class="s-pagination-item">1</span>
            <span class="s-pagination-item">many</span>
            <span class="s-pagination-item s-pagination-next">Next</span>
            </body></html>"#;
        let mut source = ReplaySource::new(vec![page.to_string()]);
        source.submit_search("#twotabsearchtextbox", "x").await.unwrap();

        let discovery = PageWalker::new(&mut source, &config, &audit)
            .discover_total_pages()
            .await;

        assert!(matches!(discovery, PageCountDiscovery::Unreadable(_)));
        assert_eq!(discovery.total_pages(), 1);
    }

    #[tokio::test]
    async fn test_later_page_without_results_ends_walk() {
        let audit = MemoryAudit::new();
        let pages = vec![
            listing_page(1, 3, 2, false),
            "<html><body><p>Something went wrong</p></body></html>".to_string(),
        ];
        let mut source = ReplaySource::new(pages);

        let outcome = walk_pages(&mut source, PageCap::All, &audit).await;

        assert_eq!(outcome.corpus.len(), 1);
        assert!(matches!(outcome.end, WalkEnd::PageUnavailable { page: 2, .. }));
        assert_eq!(outcome.session.status(), SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_progress_events_in_order() {
        let audit = MemoryAudit::new();
        let mut source = ReplaySource::new(listing_pages(2, 1));

        walk_pages(&mut source, PageCap::All, &audit).await;

        assert_eq!(
            audit.kinds(),
            vec![
                "entry.submitted",
                "pages.discovered",
                "page.started",
                "page.captured",
                "page.started",
                "page.captured",
                "walk.ended",
            ]
        );
    }

    #[tokio::test]
    async fn test_results_marker_awaited_on_every_page() {
        let audit = MemoryAudit::new();
        let mut source = FlakySource::new(ReplaySource::new(listing_pages(4, 1)));
        let marker = CrawlConfig::default().selectors.result_marker;

        let outcome = walk_pages(&mut source, PageCap::All, &audit).await;

        let marker_waits = source.wait_calls.iter().filter(|s| **s == marker).count();
        // One wait after submitting the search, then one per captured page.
        assert_eq!(outcome.corpus.len(), 4);
        assert_eq!(marker_waits, 1 + outcome.corpus.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_delay_follows_each_click() {
        let config = CrawlConfig::default();
        let audit = MemoryAudit::new();
        let mut source = ReplaySource::new(listing_pages(3, 1));

        let started = tokio::time::Instant::now();
        let outcome = walk_pages_with(&mut source, PageCap::All, &audit, &config).await;

        assert_eq!(outcome.corpus.len(), 3);
        assert_eq!(started.elapsed(), config.settle_delay() * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_settle_delay_after_disabled_next() {
        let config = CrawlConfig::default();
        let audit = MemoryAudit::new();
        let pages = vec![listing_page(1, 6, 1, false), listing_page(2, 6, 1, true)];
        let mut source = ReplaySource::new(pages);

        let started = tokio::time::Instant::now();
        let outcome = walk_pages_with(&mut source, PageCap::Limit(5), &audit, &config).await;

        assert_eq!(outcome.end, WalkEnd::LastPage { page: 2 });
        assert_eq!(started.elapsed(), config.settle_delay());
    }
}
