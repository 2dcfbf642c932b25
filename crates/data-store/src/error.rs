//! Error types for the filesystem stores.

use std::path::PathBuf;

use aggregation::AggregationError;
use thiserror::Error;

/// Result type alias using StoreError.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("zarr error: {0}")]
    Zarr(String),

    #[error("CSV error in {}: {message}", path.display())]
    Csv { path: PathBuf, message: String },

    #[error("GeoJSON error in {}: {message}", path.display())]
    GeoJson { path: PathBuf, message: String },

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),
}

impl StoreError {
    /// Create an Io error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a Zarr error.
    pub fn zarr(msg: impl ToString) -> Self {
        Self::Zarr(msg.to_string())
    }

    /// Create a Csv error for `path`.
    pub fn csv(path: impl Into<PathBuf>, msg: impl ToString) -> Self {
        Self::Csv {
            path: path.into(),
            message: msg.to_string(),
        }
    }

    /// Create an InvalidMetadata error.
    pub fn invalid_metadata(msg: impl Into<String>) -> Self {
        Self::InvalidMetadata(msg.into())
    }
}

impl From<StoreError> for AggregationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(path) => AggregationError::MissingInput(path.display().to_string()),
            StoreError::Aggregation(inner) => inner,
            other => AggregationError::Storage(other.to_string()),
        }
    }
}

/// Fail with NotFound unless `path` exists.
pub(crate) fn require_exists(path: &std::path::Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(StoreError::NotFound(path.to_path_buf()))
    }
}
