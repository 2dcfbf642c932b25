//! Error types for grid construction and alignment.

use thiserror::Error;

/// Result type alias using GridError.
pub type GridResult<T> = Result<T, GridError>;

/// Errors raised while building or combining grids.
#[derive(Debug, Error)]
pub enum GridError {
    #[error("data length {actual} does not match {width}x{height} grid")]
    DimensionMismatch {
        width: usize,
        height: usize,
        actual: usize,
    },

    #[error("grids are not aligned: {0}")]
    Misaligned(String),

    #[error("affine transform is not invertible (determinant {0})")]
    SingularTransform(f64),

    #[error("invalid coordinate vector '{axis}': {message}")]
    InvalidCoordinates { axis: String, message: String },

    #[error("coordinate vector '{axis}' is not uniformly spaced (max deviation {deviation:.3e} vs step {step:.3e})")]
    NonUniformCoordinates {
        axis: String,
        step: f64,
        deviation: f64,
    },

    #[error("invalid CRS: {0}")]
    InvalidCrs(String),
}

impl GridError {
    /// Create a Misaligned error.
    pub fn misaligned(msg: impl Into<String>) -> Self {
        Self::Misaligned(msg.into())
    }

    /// Create an InvalidCoordinates error.
    pub fn invalid_coordinates(axis: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidCoordinates {
            axis: axis.into(),
            message: message.into(),
        }
    }
}
