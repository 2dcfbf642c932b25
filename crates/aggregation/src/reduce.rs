//! Windowed population-weighted reduction.
//!
//! Each location is reduced over its own window only, so the cost of a year
//! is proportional to the summed window areas rather than locations times
//! grid size.

use climate_common::Grid;
use rayon::prelude::*;
use tracing::warn;

use crate::error::{AggregationError, Result};
use crate::rasterize::{LocationMasks, LocationWindow};
use crate::types::{DetailedRecord, LocationId, RunTags};

/// Population-weighted sums for one location.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LocationSums {
    /// Sum of `population * climate` over pixels where both are present.
    pub weighted_climate: f64,
    /// Sum of population over pixels where population is present.
    pub population: f64,
}

impl LocationSums {
    pub fn add(&mut self, other: &LocationSums) {
        self.weighted_climate += other.weighted_climate;
        self.population += other.population;
    }
}

/// Sum population and population-weighted climate over the pixels of
/// `window` assigned to `location_id`. Missing values contribute nothing.
///
/// The caller guarantees that the three grids are aligned and the window
/// fits inside them.
pub fn reduce_window(
    population: &Grid<f32>,
    climate: &Grid<f32>,
    ids: &Grid<u32>,
    location_id: LocationId,
    window: &LocationWindow,
) -> LocationSums {
    let mut sums = LocationSums::default();
    for row in window.rows.clone() {
        let id_row = &ids.row(row)[window.cols.clone()];
        let pop_row = &population.row(row)[window.cols.clone()];
        let clim_row = &climate.row(row)[window.cols.clone()];

        for ((&id, &pop), &clim) in id_row.iter().zip(pop_row).zip(clim_row) {
            if id != location_id || pop.is_nan() {
                continue;
            }
            sums.population += pop as f64;
            if !clim.is_nan() {
                sums.weighted_climate += pop as f64 * clim as f64;
            }
        }
    }
    sums
}

/// Reduce every location in `masks` for one year.
///
/// Fails if the population, climate and ID grids are not aligned or a window
/// does not fit the grid. Records come back in ascending location order.
pub fn reduce_locations(
    population: &Grid<f32>,
    climate: &Grid<f32>,
    masks: &LocationMasks,
    year: i32,
    tags: &RunTags,
) -> Result<Vec<DetailedRecord>> {
    population
        .ensure_aligned(climate)
        .map_err(|e| AggregationError::misaligned(format!("climate vs population: {e}")))?;
    population
        .ensure_aligned(&masks.raster)
        .map_err(|e| AggregationError::misaligned(format!("location raster vs population: {e}")))?;

    let (width, height) = (population.width(), population.height());
    let windows: Vec<(&LocationId, &LocationWindow)> = masks.windows.iter().collect();
    if let Some((id, w)) = windows.iter().find(|(_, w)| !w.fits(width, height)) {
        return Err(AggregationError::misaligned(format!(
            "window {:?}x{:?} of location {} exceeds {}x{} grid",
            w.rows, w.cols, id, height, width
        )));
    }

    let records: Vec<DetailedRecord> = windows
        .par_iter()
        .map(|&(&id, window)| {
            let sums = reduce_window(population, climate, &masks.raster, id, window);
            DetailedRecord::new(id, year, tags, sums.weighted_climate, sums.population)
        })
        .collect();

    let unpopulated = records.iter().filter(|r| r.population == 0.0).count();
    if unpopulated > 0 {
        warn!(year, unpopulated, "Locations with zero population");
    }

    Ok(records)
}
