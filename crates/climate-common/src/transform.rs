//! Affine pixel <-> coordinate transforms.

use serde::{Deserialize, Serialize};

use crate::{BoundingBox, GridError, GridResult};

/// Affine transformation between pixel space (col, row) and CRS coordinates.
///
/// Coefficients follow the rasterio/affine order:
/// ```text
/// x = a * col + b * row + c
/// y = d * col + e * row + f
/// ```
///
/// For north-up rasters `b` and `d` are zero and `e` is negative, so
/// `(c, f)` is the top-left corner of pixel (0, 0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl GeoTransform {
    /// Build from the six coefficients in `[a, b, c, d, e, f]` order.
    pub fn from_coefficients(coeffs: [f64; 6]) -> Self {
        Self {
            a: coeffs[0],
            b: coeffs[1],
            c: coeffs[2],
            d: coeffs[3],
            e: coeffs[4],
            f: coeffs[5],
        }
    }

    /// The six coefficients in `[a, b, c, d, e, f]` order.
    pub fn coefficients(&self) -> [f64; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }

    /// A north-up transform with top-left corner `(origin_x, origin_y)`.
    ///
    /// `dy` is the (positive) cell height; rows advance southwards.
    pub fn north_up(origin_x: f64, origin_y: f64, dx: f64, dy: f64) -> Self {
        Self {
            a: dx,
            b: 0.0,
            c: origin_x,
            d: 0.0,
            e: -dy,
            f: origin_y,
        }
    }

    /// Apply the transform to a (possibly fractional) pixel position.
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.a * col + self.b * row + self.c,
            self.d * col + self.e * row + self.f,
        )
    }

    /// Coordinates of the centre of pixel (col, row).
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        self.apply(col as f64 + 0.5, row as f64 + 0.5)
    }

    fn determinant(&self) -> f64 {
        self.a * self.e - self.b * self.d
    }

    /// The inverse transform, mapping CRS coordinates back to pixel space.
    pub fn inverse(&self) -> GridResult<GeoTransform> {
        let det = self.determinant();
        if det.abs() < f64::EPSILON * f64::EPSILON || !det.is_finite() {
            return Err(GridError::SingularTransform(det));
        }

        let a = self.e / det;
        let b = -self.b / det;
        let d = -self.d / det;
        let e = self.a / det;
        Ok(GeoTransform {
            a,
            b,
            c: -(a * self.c + b * self.f),
            d,
            e,
            f: -(d * self.c + e * self.f),
        })
    }

    /// Coefficient-wise comparison with a relative tolerance.
    pub fn approx_eq(&self, other: &GeoTransform, tol: f64) -> bool {
        self.coefficients()
            .iter()
            .zip(other.coefficients().iter())
            .all(|(l, r)| (l - r).abs() <= tol * l.abs().max(r.abs()).max(1.0))
    }

    /// Extent covered by a `width` x `height` raster using this transform.
    pub fn bounds(&self, width: usize, height: usize) -> BoundingBox {
        let (w, h) = (width as f64, height as f64);
        let corners = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];
        BoundingBox::from_points(corners.iter().map(|&(c, r)| self.apply(c, r)))
            .unwrap_or_else(|| BoundingBox::new(self.c, self.f, self.c, self.f))
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::north_up(0.0, 0.0, 1.0, 1.0)
    }
}
