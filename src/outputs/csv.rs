//! The product table.
//!
//! One header row with the eight fixed columns, then one row per record in
//! input order. Missing values are empty cells. The header is written even
//! when there are no records.

use crate::error::PersistenceError;
use crate::models::ProductRecord;
use std::path::Path;
use tracing::{info, instrument};

pub const CSV_HEADERS: [&str; 8] = [
    "name",
    "price",
    "original_price",
    "rating",
    "review_count",
    "is_sponsored",
    "product_url",
    "asin",
];

fn cell(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

fn row(record: &ProductRecord) -> [&str; 8] {
    [
        cell(&record.name),
        cell(&record.price),
        cell(&record.original_price),
        cell(&record.rating),
        cell(&record.review_count),
        if record.is_sponsored { "true" } else { "false" },
        cell(&record.product_url),
        cell(&record.asin),
    ]
}

/// Write `records` to a CSV file at `path`, replacing any existing file.
#[instrument(level = "info", skip_all, fields(path = %path.display(), records = records.len()))]
pub fn write_records(path: &Path, records: &[ProductRecord]) -> Result<(), PersistenceError> {
    let csv_err = |source| PersistenceError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    writer.write_record(CSV_HEADERS).map_err(csv_err)?;
    for record in records {
        writer.write_record(row(record)).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    info!("Wrote product table");
    Ok(())
}
