//! Georeferenced 2-D grids.

use num_traits::Float;

use crate::{BoundingBox, Crs, GeoTransform, GridError, GridResult};

/// Relative tolerance used when comparing transforms for alignment.
pub const ALIGNMENT_TOLERANCE: f64 = 1e-9;

/// A row-major 2-D array with an affine transform and a CRS tag.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    data: Vec<T>,
    width: usize,
    height: usize,
    transform: GeoTransform,
    crs: Crs,
}

impl<T: Copy> Grid<T> {
    /// Create a grid, checking that `data` holds exactly `width * height` values.
    pub fn new(
        data: Vec<T>,
        width: usize,
        height: usize,
        transform: GeoTransform,
        crs: Crs,
    ) -> GridResult<Self> {
        if data.len() != width * height {
            return Err(GridError::DimensionMismatch {
                width,
                height,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            transform,
            crs,
        })
    }

    /// A grid where every cell holds `value`.
    pub fn filled(value: T, width: usize, height: usize, transform: GeoTransform, crs: Crs) -> Self {
        Self {
            data: vec![value; width * height],
            width,
            height,
            transform,
            crs,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Value at (row, col), or `None` outside the grid.
    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        if row >= self.height || col >= self.width {
            return None;
        }
        Some(self.data[row * self.width + col])
    }

    /// One full row of the grid.
    pub fn row(&self, row: usize) -> &[T] {
        let start = row * self.width;
        &self.data[start..start + self.width]
    }

    /// Extent of the grid in CRS coordinates.
    pub fn bounds(&self) -> BoundingBox {
        self.transform.bounds(self.width, self.height)
    }

    /// Same dimensions, transform and CRS.
    pub fn is_aligned_with<U>(&self, other: &Grid<U>) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.crs == other.crs
            && self.transform.approx_eq(&other.transform, ALIGNMENT_TOLERANCE)
    }

    /// Like [`Grid::is_aligned_with`] but reports what differs.
    pub fn ensure_aligned<U>(&self, other: &Grid<U>) -> GridResult<()> {
        if self.width != other.width || self.height != other.height {
            return Err(GridError::misaligned(format!(
                "shape {}x{} vs {}x{}",
                self.height, self.width, other.height, other.width
            )));
        }
        if self.crs != other.crs {
            return Err(GridError::misaligned(format!(
                "CRS {} vs {}",
                self.crs, other.crs
            )));
        }
        if !self.transform.approx_eq(&other.transform, ALIGNMENT_TOLERANCE) {
            return Err(GridError::misaligned(format!(
                "transform {:?} vs {:?}",
                self.transform.coefficients(),
                other.transform.coefficients()
            )));
        }
        Ok(())
    }
}

impl<T: Float> Grid<T> {
    /// Number of non-NaN cells.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform() -> GeoTransform {
        GeoTransform::north_up(0.0, 4.0, 1.0, 1.0)
    }

    #[test]
    fn test_new_checks_length() {
        let err = Grid::new(vec![0.0f32; 15], 4, 4, transform(), Crs::wgs84()).unwrap_err();
        assert!(matches!(err, GridError::DimensionMismatch { actual: 15, .. }));
    }

    #[test]
    fn test_get_and_row() {
        let data: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let grid = Grid::new(data, 4, 3, transform(), Crs::wgs84()).unwrap();
        assert_eq!(grid.get(1, 2), Some(6.0));
        assert_eq!(grid.get(3, 0), None);
        assert_eq!(grid.row(2), &[8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn test_alignment() {
        let a = Grid::filled(1.0f32, 4, 4, transform(), Crs::wgs84());
        let b = Grid::filled(0u32, 4, 4, transform(), Crs::wgs84());
        assert!(a.is_aligned_with(&b));

        let shifted = Grid::filled(1.0f32, 4, 4, GeoTransform::north_up(1.0, 4.0, 1.0, 1.0), Crs::wgs84());
        assert!(!a.is_aligned_with(&shifted));
        assert!(matches!(a.ensure_aligned(&shifted), Err(GridError::Misaligned(_))));

        let other_crs = Grid::filled(1.0f32, 4, 4, transform(), Crs::epsg(3857));
        assert!(a.ensure_aligned(&other_crs).is_err());

        let smaller = Grid::filled(1.0f32, 3, 4, transform(), Crs::wgs84());
        assert!(a.ensure_aligned(&smaller).is_err());
    }

    #[test]
    fn test_valid_count() {
        let values = Grid::new(vec![f32::NAN, 1.0, 2.0, f32::NAN], 2, 2, transform(), Crs::wgs84()).unwrap();
        assert_eq!(values.valid_count(), 2);
        assert!(values.get(0, 0).unwrap().is_nan());
    }
}
