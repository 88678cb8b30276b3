//! JSON copy of the product table.
//!
//! Records are written as a pretty-printed array with `null` for missing
//! fields, in the same order as the CSV rows.

use crate::error::PersistenceError;
use crate::models::ProductRecord;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument};

/// Serialize `records` to `path`.
///
/// # Returns
///
/// `Ok(())` on success, or an error if serialization or writing fails.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_records(path: &Path, records: &[ProductRecord]) -> Result<(), PersistenceError> {
    let json = serde_json::to_string_pretty(records).map_err(|source| PersistenceError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    if let Err(e) = fs::write(path, json).await {
        error!(error = %e, "Failed to write JSON");
        return Err(PersistenceError::Io {
            path: path.to_path_buf(),
            source: e,
        });
    }
    info!(records = records.len(), "Wrote JSON records");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::scratch_dir;

    #[tokio::test]
    async fn test_json_round_trips_nulls() {
        let path = scratch_dir("json").join("records.json");
        let records = vec![ProductRecord {
            name: Some("Desk Lamp".into()),
            is_sponsored: false,
            ..ProductRecord::default()
        }];

        write_records(&path, &records).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"price\": null"));
        let back: Vec<ProductRecord> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, records);
    }
}
