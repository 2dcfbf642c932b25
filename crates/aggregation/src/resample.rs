//! Nearest-neighbour resampling of lat/lon climate fields onto a raster grid.

use climate_common::{GeoArray, GeoTransform, Grid, GridError};
use rayon::prelude::*;

use crate::error::{AggregationError, Result};

/// Largest allowed deviation of a coordinate step from the mean step,
/// relative to the mean step.
pub const UNIFORMITY_TOLERANCE: f64 = 0.01;

/// Mean step of a coordinate vector, checking that spacing is near uniform.
fn coordinate_step(axis: &str, coords: &[f64]) -> Result<f64> {
    if coords.len() < 2 {
        return Err(GridError::invalid_coordinates(axis, "need at least two values").into());
    }
    if coords.iter().any(|c| !c.is_finite()) {
        return Err(GridError::invalid_coordinates(axis, "non-finite value").into());
    }
    let step = (coords[coords.len() - 1] - coords[0]) / (coords.len() - 1) as f64;
    if step == 0.0 {
        return Err(GridError::invalid_coordinates(axis, "zero spacing").into());
    }
    let deviation = coords
        .windows(2)
        .map(|w| ((w[1] - w[0]) - step).abs())
        .fold(0.0, f64::max);
    if deviation > UNIFORMITY_TOLERANCE * step.abs() {
        return Err(GridError::NonUniformCoordinates {
            axis: axis.to_string(),
            step,
            deviation,
        }
        .into());
    }
    Ok(step)
}

/// Convert a lat/lon field into a north-up grid.
///
/// Coordinates are taken as cell centres, so the origin sits half a step
/// outside the first coordinate rather than on it as a corner convention
/// would place it. Rows are flipped when latitude is
/// stored south to north, so row 0 is always the northernmost. Longitude must
/// be ascending.
pub fn geographic_grid(array: &GeoArray) -> Result<Grid<f32>> {
    if !array.crs.is_geographic() {
        return Err(GridError::invalid_coordinates(
            "latitude",
            format!("{} is not a geographic CRS", array.crs),
        )
        .into());
    }
    let dlat = coordinate_step("latitude", &array.latitude)?;
    let dlon = coordinate_step("longitude", &array.longitude)?;
    if dlon < 0.0 {
        return Err(GridError::invalid_coordinates("longitude", "must be ascending").into());
    }

    let (n_lat, n_lon) = (array.n_lat(), array.n_lon());
    let (north, data) = if dlat > 0.0 {
        let mut flipped = Vec::with_capacity(array.data.len());
        for row in array.data.chunks_exact(n_lon).rev() {
            flipped.extend_from_slice(row);
        }
        (array.latitude[n_lat - 1], flipped)
    } else {
        (array.latitude[0], array.data.clone())
    };

    let dlat = dlat.abs();
    let transform = GeoTransform::north_up(
        array.longitude[0] - dlon / 2.0,
        north + dlat / 2.0,
        dlon,
        dlat,
    );
    Ok(Grid::new(data, n_lon, n_lat, transform, array.crs)?)
}

/// Resample `source` onto the pixel grid of `target` by nearest neighbour.
///
/// Each target pixel takes the value of the source cell containing its
/// centre, or NaN when the centre falls outside the source.
pub fn resample_nearest<T: Copy + Sync>(source: &Grid<f32>, target: &Grid<T>) -> Result<Grid<f32>> {
    if source.crs() != target.crs() {
        return Err(AggregationError::CrsMismatch {
            from_crs: source.crs().to_string(),
            to_crs: target.crs().to_string(),
        });
    }

    let inverse = source.transform().inverse()?;
    let target_transform = *target.transform();
    let (src_width, src_height) = (source.width() as f64, source.height() as f64);
    let width = target.width();

    let mut output = Grid::filled(
        f32::NAN,
        width,
        target.height(),
        target_transform,
        target.crs(),
    );
    if width == 0 {
        return Ok(output);
    }

    output
        .data_mut()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(row, out_row)| {
            for (col, out) in out_row.iter_mut().enumerate() {
                let (x, y) = target_transform.pixel_center(col, row);
                let (sc, sr) = inverse.apply(x, y);
                if sc >= 0.0 && sr >= 0.0 && sc < src_width && sr < src_height {
                    if let Some(v) = source.get(sr as usize, sc as usize) {
                        *out = v;
                    }
                }
            }
        });

    Ok(output)
}

/// Resample a lat/lon climate field onto `target`.
pub fn resample_to_grid<T: Copy + Sync>(array: &GeoArray, target: &Grid<T>) -> Result<Grid<f32>> {
    let source = geographic_grid(array)?;
    resample_nearest(&source, target)
}
