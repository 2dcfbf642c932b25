//! Error types for aggregation runs.

use climate_common::GridError;
use thiserror::Error;

/// Errors that abort an aggregation run.
///
/// Zero-population locations and empty windows are not errors; they show up
/// as NaN values in the output instead.
#[derive(Error, Debug)]
pub enum AggregationError {
    /// An input file or dataset does not exist.
    #[error("missing input: {0}")]
    MissingInput(String),

    /// The hierarchy name is not part of the configuration.
    #[error("unknown hierarchy: {0}")]
    UnknownHierarchy(String),

    /// A scenario, measure or draw outside the configured lists.
    #[error("unknown {kind} '{value}'")]
    UnknownTag { kind: &'static str, value: String },

    /// An output version that cannot be used as a single directory name.
    #[error("invalid version '{0}'")]
    InvalidVersion(String),

    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The hierarchy table is inconsistent.
    #[error("invalid hierarchy table: {0}")]
    InvalidHierarchy(String),

    /// A location geometry cannot be rasterized.
    #[error("invalid geometry for location {location_id}: {message}")]
    InvalidGeometry { location_id: u32, message: String },

    /// Grids that must share a pixel grid do not.
    #[error("grids are not aligned: {0}")]
    Misaligned(String),

    /// Resampling between different coordinate systems is not supported.
    #[error("CRS mismatch: climate grid is {from_crs}, target grid is {to_crs}")]
    CrsMismatch { from_crs: String, to_crs: String },

    /// Tables that cannot be combined, e.g. different measures.
    #[error("incompatible tables: {0}")]
    IncompatibleTables(String),

    /// More than one row for the same location, year and run.
    #[error("duplicate record: {0}")]
    DuplicateRecord(String),

    #[error(transparent)]
    Grid(#[from] GridError),

    /// Reading or writing a collaborator store failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl AggregationError {
    /// Create a MissingInput error.
    pub fn missing_input(msg: impl Into<String>) -> Self {
        Self::MissingInput(msg.into())
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a Storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a Misaligned error.
    pub fn misaligned(msg: impl Into<String>) -> Self {
        Self::Misaligned(msg.into())
    }
}

/// Result type for aggregation operations.
pub type Result<T> = std::result::Result<T, AggregationError>;
