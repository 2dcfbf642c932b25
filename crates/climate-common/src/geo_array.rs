//! Climate fields indexed by latitude/longitude coordinate vectors.

use crate::{Crs, GridError, GridResult};

/// A 2-D field on a regular lat/lon grid, as stored by climate models.
///
/// `data` is row-major over `(latitude index, longitude index)`. Coordinates
/// are cell centres and may be ascending or descending; latitude is usually
/// stored south to north.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoArray {
    pub latitude: Vec<f64>,
    pub longitude: Vec<f64>,
    pub data: Vec<f32>,
    pub crs: Crs,
}

impl GeoArray {
    /// Build an array in WGS84, validating that the data matches the coordinates.
    pub fn new(latitude: Vec<f64>, longitude: Vec<f64>, data: Vec<f32>) -> GridResult<Self> {
        if data.len() != latitude.len() * longitude.len() {
            return Err(GridError::DimensionMismatch {
                width: longitude.len(),
                height: latitude.len(),
                actual: data.len(),
            });
        }
        Ok(Self {
            latitude,
            longitude,
            data,
            crs: Crs::wgs84(),
        })
    }

    /// Number of latitude rows.
    pub fn n_lat(&self) -> usize {
        self.latitude.len()
    }

    /// Number of longitude columns.
    pub fn n_lon(&self) -> usize {
        self.longitude.len()
    }

    /// Value at (latitude index, longitude index).
    pub fn get(&self, lat_idx: usize, lon_idx: usize) -> Option<f32> {
        if lat_idx >= self.n_lat() || lon_idx >= self.n_lon() {
            return None;
        }
        Some(self.data[lat_idx * self.n_lon() + lon_idx])
    }
}
