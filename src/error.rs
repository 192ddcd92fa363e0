//! Error kinds for the panel pipeline.
//!
//! Only `ConfigLoadError` is ever visible to an end user, and even then the
//! dashboard degrades to an empty panel list. Everything else is absorbed at
//! the panel, file, or row level and logged.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The panel layout file could not be read or deserialised.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("cannot read layout {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid layout {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("layout {path} must be a JSON array of panel objects")]
    NotAnArray { path: PathBuf },
}

/// A panel's primary data file is missing or unusable ("cannot load panel").
#[derive(Debug, Error)]
pub enum PanelDataError {
    #[error("cannot load panel: {path} not found")]
    NotFound { path: PathBuf },

    #[error("cannot load panel: failed reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("cannot load panel: i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot load panel: {path} has no DATE column")]
    MissingDateColumn { path: PathBuf },

    #[error("cannot load panel: {path} has no category columns")]
    NoCategories { path: PathBuf },
}

impl PanelDataError {
    pub fn path(&self) -> &PathBuf {
        match self {
            PanelDataError::NotFound { path }
            | PanelDataError::Read { path, .. }
            | PanelDataError::Io { path, .. }
            | PanelDataError::MissingDateColumn { path }
            | PanelDataError::NoCategories { path } => path,
        }
    }
}

/// The trend test could not produce a verdict for a window.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrendComputationError {
    #[error("insufficient data: {n} point(s) in window, need at least 2")]
    InsufficientData { n: usize },

    #[error("non-finite value in window")]
    NonFinite,
}

/// A row's date key matched none of the accepted formats. Row-level only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unparseable date {raw:?}")]
pub struct DateParseError {
    pub raw: String,
}
