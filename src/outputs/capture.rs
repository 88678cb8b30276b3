//! The raw capture document.
//!
//! A minimal HTML file holding every captured tile in visitation order, so
//! a crawl can be converted again later without a browser:
//!
//! ```text
//! <html><body><h1>Amazon results for: laptop</h1>
//! <p data-total-pages="20" data-pages-captured="2">Scraped 2 out of 20 available pages</p>
//! <section data-page="1">
//! <div role="listitem">…</div>
//!
//! …
//! </section>
//! </body></html>
//! ```
//!
//! [`parse_capture`] also accepts the older flat layout, where tiles follow
//! the heading directly without page sections; those become a single page.

use crate::error::PersistenceError;
use crate::models::{Corpus, PageResult};
use crate::source::parse_selector;
use crate::utils::escape_html;
use scraper::{ElementRef, Html};
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument, warn};

/// Render the capture document for `corpus`.
pub fn render_capture(term: &str, total_pages: u32, corpus: &Corpus) -> String {
    let mut doc = String::with_capacity(corpus.tile_count() * 4096 + 256);
    doc.push_str(&format!(
        "<html><body><h1>Amazon results for: {}</h1>\n",
        escape_html(term)
    ));
    doc.push_str(&format!(
        "<p data-total-pages=\"{total_pages}\" data-pages-captured=\"{captured}\">Scraped {captured} out of {total_pages} available pages</p>\n",
        captured = corpus.len()
    ));
    for page in corpus.pages() {
        doc.push_str(&format!("<section data-page=\"{}\">\n", page.page_index));
        for tile in &page.raw_tiles {
            doc.push_str(tile);
            doc.push_str("\n\n");
        }
        doc.push_str("</section>\n");
    }
    doc.push_str("</body></html>");
    doc
}

/// Write the capture document to `path`.
#[instrument(level = "info", skip_all, fields(path = %path.display(), pages = corpus.len()))]
pub async fn write_capture(
    path: &Path,
    term: &str,
    total_pages: u32,
    corpus: &Corpus,
) -> Result<(), PersistenceError> {
    let doc = render_capture(term, total_pages, corpus);
    fs::write(path, doc)
        .await
        .map_err(|source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    info!(tiles = corpus.tile_count(), "Wrote raw capture");
    Ok(())
}

/// A capture document read back from disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCapture {
    pub corpus: Corpus,
    /// Page count the site advertised, when the document records it.
    pub total_pages: Option<u32>,
}

/// Rebuild the [`Corpus`] and advertised page count from a capture document.
pub fn parse_capture(markup: &str) -> ParsedCapture {
    let document = Html::parse_document(markup);
    let (Ok(sections), Ok(body), Ok(summary)) = (
        parse_selector("section[data-page]"),
        parse_selector("body"),
        parse_selector("p[data-total-pages]"),
    ) else {
        return ParsedCapture::default();
    };

    let total_pages = document
        .select(&summary)
        .next()
        .and_then(|p| p.value().attr("data-total-pages"))
        .and_then(|n| n.trim().parse().ok());

    let mut pages = Vec::new();
    for (i, section) in document.select(&sections).enumerate() {
        let page_index = section
            .value()
            .attr("data-page")
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(i as u32 + 1);
        pages.push(PageResult {
            page_index,
            raw_tiles: child_markup(section, |_| true),
        });
    }

    if pages.is_empty() {
        if let Some(body) = document.select(&body).next() {
            let raw_tiles = child_markup(body, |el| !matches!(el.value().name(), "h1" | "p"));
            if !raw_tiles.is_empty() {
                pages.push(PageResult {
                    page_index: 1,
                    raw_tiles,
                });
            }
        }
    }
    ParsedCapture {
        corpus: Corpus::from(pages),
        total_pages,
    }
}

fn child_markup(parent: ElementRef<'_>, keep: impl Fn(&ElementRef<'_>) -> bool) -> Vec<String> {
    parent
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|el| keep(el))
        .map(|el| el.html())
        .collect()
}

/// Read and parse a capture file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn read_capture(path: &Path) -> Result<ParsedCapture, PersistenceError> {
    let markup = fs::read_to_string(path)
        .await
        .map_err(|source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let capture = parse_capture(&markup);
    if capture.corpus.is_empty() {
        warn!("Capture file holds no tiles");
    } else {
        info!(
            pages = capture.corpus.len(),
            tiles = capture.corpus.tile_count(),
            total_pages = ?capture.total_pages,
            "Read capture"
        );
    }
    Ok(capture)
}
