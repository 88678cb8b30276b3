//! Converting captured tiles into [`ProductRecord`]s.
//!
//! Every field is looked up independently through an ordered list of
//! selector attempts; the first non-empty hit wins and a miss leaves the
//! field empty. A tile only fails as a whole when its markup is blank or
//! parsing it panics, and such a tile is skipped rather than failing the
//! batch.
//!
//! Selectors target Amazon search-result markup. Update them here when the
//! site's HTML changes.

use crate::error::ExtractionError;
use crate::models::{Corpus, PageResult, ProductRecord};
use crate::utils::truncate_for_log;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::{debug, info, instrument, warn};
use url::Url;

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector {css:?}: {e:?}"))
}

static HEADING: Lazy<Selector> = Lazy::new(|| selector("h2"));
static HEADING_TEXT: Lazy<Selector> = Lazy::new(|| selector("span, a"));
static PRICE_WHOLE: [Lazy<Selector>; 2] = [
    Lazy::new(|| selector(".a-price:not(.a-text-price) .a-price-whole")),
    Lazy::new(|| selector(".a-price-whole")),
];
static ORIGINAL_PRICE_BOX: Lazy<Selector> =
    Lazy::new(|| selector(".a-price.a-text-price, .a-price[data-a-strike='true']"));
static OFFSCREEN: Lazy<Selector> = Lazy::new(|| selector(".a-offscreen"));
static RATING_ALT: [Lazy<Selector>; 3] = [
    Lazy::new(|| selector("i.a-icon-star-small span.a-icon-alt")),
    Lazy::new(|| selector("i.a-icon-star span.a-icon-alt")),
    Lazy::new(|| selector("span.a-icon-alt")),
];
static REVIEW_COUNT: [Lazy<Selector>; 2] = [
    Lazy::new(|| selector("span.a-size-base.s-underline-text")),
    Lazy::new(|| selector("a[href*='customerReviews'] span")),
];
static SECONDARY_LABEL: Lazy<Selector> = Lazy::new(|| selector(".a-color-secondary"));
static PRODUCT_LINKS: [Lazy<Selector>; 3] = [
    Lazy::new(|| selector("h2 a[href]")),
    Lazy::new(|| selector("a.a-link-normal[href]")),
    Lazy::new(|| selector("a[href*='/dp/']")),
];
static ASIN_IN_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/dp/([^/?#]+)").unwrap_or_else(|e| panic!("invalid ASIN pattern: {e}"))
});

const SPONSORED_MARKER: &str = "Sponsored";
const CURRENCY_PREFIX: &str = "$";

/// Collapsed, trimmed text of an element; `None` when blank.
fn text_of(element: ElementRef<'_>) -> Option<String> {
    let text = element.text().flat_map(str::split_whitespace).join(" ");
    (!text.is_empty()).then_some(text)
}

fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope.select(selector).find_map(text_of)
}

/// Try `attempts` in priority order; the first one yielding text wins.
fn first_text_of(scope: ElementRef<'_>, attempts: &[Lazy<Selector>]) -> Option<String> {
    attempts
        .iter()
        .find_map(|attempt| first_text(scope, attempt))
}

/// ASIN embedded in a product URL: the path segment after `/dp/`.
///
/// ```ignore
/// assert_eq!(asin_from_url("https://x.com/Thing/dp/B0ABC123/ref=sr_1").as_deref(), Some("B0ABC123"));
/// assert_eq!(asin_from_url("https://x.com/gp/help"), None);
/// ```
pub fn asin_from_url(url: &str) -> Option<String> {
    ASIN_IN_PATH
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// A tile that produced no record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileFailure {
    pub page: u32,
    /// 0-based position of the tile on its page.
    pub tile: usize,
    pub error: ExtractionError,
}

/// Records and skipped tiles, both in capture order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub records: Vec<ProductRecord>,
    pub failures: Vec<TileFailure>,
}

impl Extraction {
    fn absorb(&mut self, other: Extraction) {
        self.records.extend(other.records);
        self.failures.extend(other.failures);
    }
}

/// Parses result tiles into product records.
#[derive(Debug, Clone)]
pub struct ProductExtractor {
    base_url: Option<Url>,
}

impl ProductExtractor {
    /// Relative product links are resolved against `base_url`. An invalid
    /// base leaves links as found.
    pub fn new(base_url: &str) -> Self {
        let base_url = match Url::parse(base_url) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(base_url, error = %e, "Invalid base URL; product links stay relative");
                None
            }
        };
        Self { base_url }
    }

    /// Extract one tile.
    ///
    /// A tile with none of the fields still yields a record, with every
    /// optional field empty.
    ///
    /// # Errors
    ///
    /// [`ExtractionError::EmptyTile`] for blank markup.
    pub fn extract(&self, markup: &str) -> Result<ProductRecord, ExtractionError> {
        if markup.trim().is_empty() {
            return Err(ExtractionError::EmptyTile);
        }
        let fragment = Html::parse_fragment(markup);
        let tile = fragment.root_element();

        let product_url = self.product_url(tile);
        Ok(ProductRecord {
            name: Self::name(tile),
            price: Self::price(tile),
            original_price: Self::original_price(tile),
            rating: Self::rating(tile),
            review_count: first_text_of(tile, &REVIEW_COUNT),
            is_sponsored: Self::is_sponsored(tile),
            asin: product_url.as_deref().and_then(asin_from_url),
            product_url,
        })
    }

    /// Like [`extract`](Self::extract), but a panic while parsing is caught
    /// and reported as [`ExtractionError::Panicked`].
    pub fn extract_guarded(&self, markup: &str) -> Result<ProductRecord, ExtractionError> {
        match catch_unwind(AssertUnwindSafe(|| self.extract(markup))) {
            Ok(result) => result,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(ExtractionError::Panicked(message))
            }
        }
    }

    /// Extract every tile of one page. Never fails.
    pub fn extract_page(&self, page: &PageResult) -> Extraction {
        let mut out = Extraction::default();
        for (tile, markup) in page.raw_tiles.iter().enumerate() {
            match self.extract_guarded(markup) {
                Ok(record) => out.records.push(record),
                Err(error) => {
                    debug!(
                        page = page.page_index,
                        tile,
                        %error,
                        markup = %truncate_for_log(markup, 160),
                        "Tile skipped"
                    );
                    out.failures.push(TileFailure {
                        page: page.page_index,
                        tile,
                        error,
                    });
                }
            }
        }
        out
    }

    /// Extract a whole corpus, up to `concurrency` pages at a time on
    /// blocking worker threads. Output order is capture order.
    #[instrument(level = "info", skip_all, fields(pages = corpus.len(), concurrency = concurrency))]
    pub async fn extract_corpus(&self, corpus: &Corpus, concurrency: usize) -> Extraction {
        let results: Vec<Extraction> = stream::iter(corpus.pages().iter().cloned())
            .map(|page| {
                let extractor = self.clone();
                let page_index = page.page_index;
                async move {
                    match tokio::task::spawn_blocking(move || extractor.extract_page(&page)).await {
                        Ok(extraction) => extraction,
                        Err(e) => {
                            warn!(page = page_index, error = %e, "Extraction worker failed");
                            Extraction {
                                records: Vec::new(),
                                failures: vec![TileFailure {
                                    page: page_index,
                                    tile: 0,
                                    error: ExtractionError::Panicked(e.to_string()),
                                }],
                            }
                        }
                    }
                }
            })
            .buffered(concurrency.max(1))
            .collect()
            .await;

        let mut all = Extraction::default();
        for extraction in results {
            all.absorb(extraction);
        }
        info!(
            records = all.records.len(),
            failures = all.failures.len(),
            "Extraction finished"
        );
        all
    }

    fn name(tile: ElementRef<'_>) -> Option<String> {
        let heading = tile.select(&HEADING).next()?;
        heading
            .value()
            .attr("aria-label")
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map(str::to_string)
            .or_else(|| first_text(heading, &HEADING_TEXT))
            .or_else(|| text_of(heading))
    }

    fn price(tile: ElementRef<'_>) -> Option<String> {
        let whole = first_text_of(tile, &PRICE_WHOLE)?;
        let whole = whole.trim_end_matches('.');
        (!whole.is_empty()).then(|| format!("{CURRENCY_PREFIX}{whole}"))
    }

    fn original_price(tile: ElementRef<'_>) -> Option<String> {
        tile.select(&ORIGINAL_PRICE_BOX)
            .find_map(|container| first_text(container, &OFFSCREEN))
    }

    fn rating(tile: ElementRef<'_>) -> Option<String> {
        let alt = first_text_of(tile, &RATING_ALT)?;
        alt.split_whitespace().next().map(str::to_string)
    }

    fn is_sponsored(tile: ElementRef<'_>) -> bool {
        tile.select(&SECONDARY_LABEL)
            .filter_map(text_of)
            .any(|text| text.contains(SPONSORED_MARKER))
    }

    fn product_url(&self, tile: ElementRef<'_>) -> Option<String> {
        let href = PRODUCT_LINKS.iter().find_map(|links| {
            tile.select(links)
                .filter_map(|a| a.value().attr("href"))
                .map(str::trim)
                .find(|href| !href.is_empty())
        })?;
        match &self.base_url {
            Some(base) => match base.join(href) {
                Ok(url) => Some(url.to_string()),
                Err(_) => Some(href.to_string()),
            },
            None => Some(href.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_TILE: &str = r#"
<div role="listitem" data-component-type="s-search-result" data-asin="B0CX23V2ZK">
  <h2 aria-label="Acme 15.6 inch Laptop, 16GB RAM" class="a-size-medium">
    <a class="a-link-normal s-link-style" href="/Acme-Laptop/dp/B0CX23V2ZK/ref=sr_1_3?keywords=laptop">
      <span>Acme 15.6 inch Laptop</span>
    </a>
  </h2>
  <div class="a-row"><span class="a-color-secondary">Sponsored</span></div>
  <i class="a-icon a-icon-star-small a-star-small-4-5"><span class="a-icon-alt">4.5 out of 5 stars</span></i>
  <span class="a-size-base s-underline-text">1,234</span>
  <span class="a-price"><span class="a-offscreen">$499.99</span><span class="a-price-whole">499.</span><span class="a-price-fraction">99</span></span>
  <span class="a-price a-text-price" data-a-strike="true"><span class="a-offscreen">$649.99</span></span>
</div>"#;

    fn extractor() -> ProductExtractor {
        ProductExtractor::new("https://www.amazon.com")
    }

    #[test]
    fn test_full_tile() {
        let record = extractor().extract(FULL_TILE).unwrap();
        assert_eq!(record.name.as_deref(), Some("Acme 15.6 inch Laptop, 16GB RAM"));
        assert_eq!(record.price.as_deref(), Some("$499"));
        assert_eq!(record.original_price.as_deref(), Some("$649.99"));
        assert_eq!(record.rating.as_deref(), Some("4.5"));
        assert_eq!(record.review_count.as_deref(), Some("1,234"));
        assert!(record.is_sponsored);
        assert_eq!(
            record.product_url.as_deref(),
            Some("https://www.amazon.com/Acme-Laptop/dp/B0CX23V2ZK/ref=sr_1_3?keywords=laptop")
        );
        assert_eq!(record.asin.as_deref(), Some("B0CX23V2ZK"));
    }

    #[test]
    fn test_missing_price_only_nulls_price() {
        let tile = FULL_TILE
            .replace(r#"<span class="a-price-whole">499.</span>"#, "");
        let record = extractor().extract(&tile).unwrap();
        assert_eq!(record.price, None);
        assert_eq!(record.name.as_deref(), Some("Acme 15.6 inch Laptop, 16GB RAM"));
        assert_eq!(record.original_price.as_deref(), Some("$649.99"));
        assert_eq!(record.rating.as_deref(), Some("4.5"));
        assert_eq!(record.review_count.as_deref(), Some("1,234"));
        assert!(record.is_sponsored);
        assert_eq!(record.asin.as_deref(), Some("B0CX23V2ZK"));
    }

    #[test]
    fn test_absent_secondary_label_is_not_sponsored() {
        let tile = FULL_TILE.replace(
            r#"<div class="a-row"><span class="a-color-secondary">Sponsored</span></div>"#,
            "",
        );
        let record = extractor().extract(&tile).unwrap();
        assert!(!record.is_sponsored);
    }

    #[test]
    fn test_secondary_label_without_marker() {
        let tile = FULL_TILE.replace(">Sponsored<", ">Climate Pledge Friendly<");
        assert!(!extractor().extract(&tile).unwrap().is_sponsored);
    }

    #[test]
    fn test_name_falls_back_to_heading_text() {
        let tile = r#"<div><h2><a href="/x/dp/B000000001"><span>  Plain   Title </span></a></h2></div>"#;
        let record = extractor().extract(tile).unwrap();
        assert_eq!(record.name.as_deref(), Some("Plain Title"));
    }

    #[test]
    fn test_no_original_price_without_strike_container() {
        let tile = FULL_TILE.replace(
            r#"<span class="a-price a-text-price" data-a-strike="true"><span class="a-offscreen">$649.99</span></span>"#,
            "",
        );
        let record = extractor().extract(&tile).unwrap();
        assert_eq!(record.original_price, None);
        assert_eq!(record.price.as_deref(), Some("$499"));
    }

    #[test]
    fn test_url_without_dp_has_no_asin() {
        let tile = r#"<div><h2 aria-label="Gift Card"><a href="/gp/product-gift"><span>Gift</span></a></h2></div>"#;
        let record = extractor().extract(tile).unwrap();
        assert_eq!(
            record.product_url.as_deref(),
            Some("https://www.amazon.com/gp/product-gift")
        );
        assert_eq!(record.asin, None);
    }

    #[test]
    fn test_asin_from_url() {
        for id in ["B0CX23V2ZK", "0596517742", "abc123", "X"] {
            let url = format!("https://www.amazon.com/Some-Item/dp/{id}/ref=sr_1_1");
            assert_eq!(asin_from_url(&url).as_deref(), Some(id));
        }
        assert_eq!(asin_from_url("/dp/B01/").as_deref(), Some("B01"));
        assert_eq!(asin_from_url("/dp/B01?th=1").as_deref(), Some("B01"));
        assert_eq!(asin_from_url("/dp/").as_deref(), None);
        assert_eq!(asin_from_url("/gp/B01/"), None);
    }

    #[test]
    fn test_blank_tile_is_error() {
        let ex = extractor();
        assert_eq!(ex.extract(""), Err(ExtractionError::EmptyTile));
        assert_eq!(ex.extract("  \n "), Err(ExtractionError::EmptyTile));
    }

    #[test]
    fn test_sparse_tile_still_yields_record() {
        let tile = r#"<div role="listitem"><i class="a-icon a-icon-star-small"><span class="a-icon-alt">4.0 out of 5 stars</span></i><span class="a-color-secondary">Sponsored</span></div>"#;
        let record = extractor().extract(tile).unwrap();
        assert_eq!(record.rating.as_deref(), Some("4.0"));
        assert!(record.is_sponsored);
        assert_eq!(record.name, None);
        assert_eq!(record.price, None);
        assert_eq!(record.product_url, None);
        assert_eq!(record.asin, None);
    }

    #[test]
    fn test_tile_without_fields_is_all_empty() {
        let record = extractor().extract("just some text").unwrap();
        assert_eq!(record, ProductRecord::default());
    }

    #[test]
    fn test_specific_selectors_beat_earlier_generic_matches() {
        let tile = r#"<div role="listitem">
  <h2 aria-label="Prime Laptop"><a href="/x/dp/B0PRIME001/"><span>Prime Laptop</span></a></h2>
  <i class="a-icon a-icon-prime"><span class="a-icon-alt">Amazon Prime</span></i>
  <a href="/x/dp/B0PRIME001/#customerReviews"><span>(see all)</span></a>
  <span class="a-price a-text-price"><span class="a-price-whole">699.</span></span>
  <i class="a-icon a-icon-star-small a-star-small-4-5"><span class="a-icon-alt">4.5 out of 5 stars</span></i>
  <span class="a-size-base s-underline-text">2,048</span>
  <span class="a-price"><span class="a-price-whole">549.</span></span>
</div>"#;
        let record = extractor().extract(tile).unwrap();
        assert_eq!(record.rating.as_deref(), Some("4.5"));
        assert_eq!(record.review_count.as_deref(), Some("2,048"));
        assert_eq!(record.price.as_deref(), Some("$549"));
    }

    #[test]
    fn test_unclosed_markup_still_extracts() {
        let tile = r#"<div><h2 aria-label="Broken <b>tile"><a href="/p/dp/B0BROKEN1/"><span>Broken"#;
        let record = extractor().extract(tile).unwrap();
        assert_eq!(record.asin.as_deref(), Some("B0BROKEN1"));
    }

    #[test]
    fn test_bad_tile_does_not_affect_batch() {
        let page = PageResult {
            page_index: 2,
            raw_tiles: vec![
                FULL_TILE.to_string(),
                "".to_string(),
                "<p></p>".to_string(),
                FULL_TILE.replace("B0CX23V2ZK", "B0SECOND00"),
            ],
        };
        let out = extractor().extract_page(&page);
        assert_eq!(out.records.len(), 3);
        assert_eq!(out.records[1], ProductRecord::default());
        assert_eq!(out.records[2].asin.as_deref(), Some("B0SECOND00"));
        assert_eq!(
            out.failures,
            vec![TileFailure {
                page: 2,
                tile: 1,
                error: ExtractionError::EmptyTile,
            }]
        );
    }

    #[tokio::test]
    async fn test_extract_corpus_keeps_capture_order() {
        let pages = (1..=6)
            .map(|p| PageResult {
                page_index: p,
                raw_tiles: vec![FULL_TILE.replace("B0CX23V2ZK", &format!("B0PAGE000{p}"))],
            })
            .collect::<Vec<_>>();
        let corpus = Corpus::from(pages);

        let out = extractor().extract_corpus(&corpus, 3).await;

        let asins: Vec<_> = out.records.iter().filter_map(|r| r.asin.clone()).collect();
        assert_eq!(
            asins,
            (1..=6).map(|p| format!("B0PAGE000{p}")).collect::<Vec<_>>()
        );
        assert!(out.failures.is_empty());
    }

    #[tokio::test]
    async fn test_extract_empty_corpus() {
        let out = extractor().extract_corpus(&Corpus::new(), 4).await;
        assert_eq!(out, Extraction::default());
    }
}
