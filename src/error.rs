//! Error types for each stage of a session.
//!
//! Fatal kinds ([`AcquisitionError`], [`NavigationError`]) abort a crawl and
//! are wrapped by [`SessionError`]. [`ExtractionError`] and
//! [`PersistenceError`] are local to one tile or one output file and never
//! stop the rest of the run.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a rendering backend.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("timed out after {timeout:?} waiting for `{selector}`")]
    Timeout { selector: String, timeout: Duration },

    #[error("no element matches `{0}`")]
    ElementNotFound(String),

    #[error("invalid selector `{0}`")]
    InvalidSelector(String),

    #[error("interaction with `{selector}` failed: {reason}")]
    Interaction { selector: String, reason: String },

    #[error("backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The search-entry control could not be obtained.
#[derive(Debug, Error)]
#[error("search entry `{selector}` not found after {attempts} attempts: {last}")]
pub struct AcquisitionError {
    pub selector: String,
    pub attempts: u32,
    #[source]
    pub last: SourceError,
}

/// No results view to walk.
#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("search submission failed: {0}")]
    Submit(#[source] SourceError),

    #[error("results for page {page} never loaded: {source}")]
    ResultsNotLoaded {
        page: u32,
        #[source]
        source: SourceError,
    },
}

/// One tile could not be turned into a record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("tile markup is empty")]
    EmptyTile,

    #[error("extraction panicked: {0}")]
    Panicked(String),
}

/// An output file could not be written.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write CSV {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to serialize {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl PersistenceError {
    pub fn path(&self) -> &Path {
        match self {
            PersistenceError::Io { path, .. }
            | PersistenceError::Csv { path, .. }
            | PersistenceError::Json { path, .. } => path,
        }
    }
}

/// Configuration file problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Fatal outcome of a session. Extraction and output are skipped.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Navigation(#[from] NavigationError),
}
