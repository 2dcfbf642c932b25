//! Common geospatial types shared across the climate aggregation crates.

pub mod bbox;
pub mod crs;
pub mod error;
pub mod geo_array;
pub mod grid;
pub mod transform;

pub use bbox::BoundingBox;
pub use crs::Crs;
pub use error::{GridError, GridResult};
pub use geo_array::GeoArray;
pub use grid::Grid;
pub use transform::GeoTransform;
