//! Error types for sheetcalc
//!
//! Only loading can fail a run. Everything that goes wrong while calculating
//! is reported as a [`Diagnostic`](crate::Diagnostic) instead.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur loading a workbook or engine configuration
#[derive(Debug, Error)]
pub enum Error {
    /// IO error
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The document parsed but describes an impossible workbook
    #[error("Invalid workbook: {0}")]
    InvalidWorkbook(#[from] sheetcalc_core::Error),

    /// Invalid engine configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
