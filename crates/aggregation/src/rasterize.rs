//! Burning administrative polygons into a location-ID raster.
//!
//! Polygons are rasterized by pixel centre with the even-odd rule: a pixel
//! belongs to a polygon when its centre lies inside the exterior ring and
//! outside every hole. Overlaps are resolved by burn order, which callers
//! control through [`LocationShape::priority`].

use std::collections::BTreeMap;
use std::ops::Range;

use climate_common::{BoundingBox, GeoTransform, Grid};
use geo::{BoundingRect, LineString, MultiPolygon};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AggregationError, Result};
use crate::types::{LocationId, NO_LOCATION};

/// One administrative polygon to burn, in the reference grid's CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationShape {
    pub location_id: LocationId,
    pub geometry: MultiPolygon<f64>,
    /// Burn order. Shapes are burned in ascending `(priority, location_id)`
    /// order, so the highest priority wins where shapes overlap.
    pub priority: i64,
}

impl LocationShape {
    pub fn new(location_id: LocationId, geometry: MultiPolygon<f64>) -> Self {
        Self {
            location_id,
            geometry,
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }
}

/// Half-open pixel ranges covering a location, clipped to the grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationWindow {
    pub rows: Range<usize>,
    pub cols: Range<usize>,
}

impl LocationWindow {
    pub fn new(rows: Range<usize>, cols: Range<usize>) -> Self {
        Self { rows, cols }
    }

    /// A window containing no pixels.
    pub fn empty() -> Self {
        Self::new(0..0, 0..0)
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.cols.len()
    }

    pub fn area(&self) -> usize {
        self.height() * self.width()
    }

    pub fn is_empty(&self) -> bool {
        self.area() == 0
    }

    /// Whether the window lies inside a `width` x `height` grid.
    pub fn fits(&self, width: usize, height: usize) -> bool {
        self.rows.start <= self.rows.end
            && self.rows.end <= height
            && self.cols.start <= self.cols.end
            && self.cols.end <= width
    }
}

/// Windows keyed by location, iterated in ascending ID order.
pub type LocationWindows = BTreeMap<LocationId, LocationWindow>;

/// Output of [`rasterize`]: the ID raster and one window per location.
#[derive(Debug, Clone)]
pub struct LocationMasks {
    pub raster: Grid<u32>,
    pub windows: LocationWindows,
}

/// Fractional pixel-space extent of a geometry, x = column and y = row.
fn pixel_extent(geometry: &MultiPolygon<f64>, inverse: &GeoTransform) -> Option<BoundingBox> {
    let rect = geometry.bounding_rect()?;
    let (min, max) = (rect.min(), rect.max());
    BoundingBox::from_points([
        inverse.apply(min.x, min.y),
        inverse.apply(min.x, max.y),
        inverse.apply(max.x, min.y),
        inverse.apply(max.x, max.y),
    ])
}

/// Floor/ceil a fractional range, add `buffer`, clip to `[0, len)`.
///
/// Returns `None` when the unbuffered range misses the grid entirely.
fn clip_range(min: f64, max: f64, buffer: usize, len: usize) -> Option<Range<usize>> {
    let len = len as f64;
    let start = min.floor();
    let end = max.ceil();
    if end < 0.0 || start > len {
        return None;
    }
    let buffer = buffer as f64;
    let start = (start - buffer).clamp(0.0, len) as usize;
    let end = (end + buffer).clamp(0.0, len) as usize;
    Some(start..end.max(start))
}

/// Window for one geometry over a `width` x `height` grid.
///
/// The geometry's bounding box is mapped to pixel space through `inverse`,
/// widened to whole pixels, expanded by `buffer` pixels and clipped to the
/// grid. Geometries with no extent, or whose box misses the grid, get an
/// empty window.
pub fn compute_window(
    geometry: &MultiPolygon<f64>,
    inverse: &GeoTransform,
    width: usize,
    height: usize,
    buffer: usize,
) -> LocationWindow {
    let Some(extent) = pixel_extent(geometry, inverse) else {
        return LocationWindow::empty();
    };
    let rows = clip_range(extent.min_y, extent.max_y, buffer, height);
    let cols = clip_range(extent.min_x, extent.max_x, buffer, width);
    match (rows, cols) {
        (Some(rows), Some(cols)) => LocationWindow::new(rows, cols),
        _ => LocationWindow::empty(),
    }
}

/// Burn `shapes` into a raster aligned to `reference`.
///
/// Shapes are sorted by `(priority, location_id)` and burned in that order,
/// each overwriting earlier ones. Pixels outside every shape hold
/// [`NO_LOCATION`]. Windows are buffered by `pixel_buffer` pixels.
pub fn rasterize<T: Copy>(
    reference: &Grid<T>,
    shapes: &[LocationShape],
    pixel_buffer: usize,
) -> Result<LocationMasks> {
    let (width, height) = (reference.width(), reference.height());
    let inverse = reference.transform().inverse()?;

    let mut ordered: Vec<&LocationShape> = shapes.iter().collect();
    ordered.sort_by_key(|s| (s.priority, s.location_id));

    let mut raster = Grid::filled(
        NO_LOCATION,
        width,
        height,
        *reference.transform(),
        reference.crs(),
    );
    let mut windows = LocationWindows::new();
    let grid_bounds = reference.bounds();

    for shape in ordered {
        validate_shape(shape)?;
        let window = compute_window(&shape.geometry, &inverse, width, height, pixel_buffer);
        if window.is_empty() {
            let outside = shape
                .geometry
                .bounding_rect()
                .map(|r| {
                    let extent = BoundingBox::new(r.min().x, r.min().y, r.max().x, r.max().y);
                    !extent.intersects(&grid_bounds)
                })
                .unwrap_or(true);
            debug!(location_id = shape.location_id, outside, "Location window is empty");
        }
        // A location split across several shapes gets the union of their windows.
        windows
            .entry(shape.location_id)
            .and_modify(|w| *w = union(w, &window))
            .or_insert(window);

        burn(&mut raster, &shape.geometry, &inverse, shape.location_id);
    }

    Ok(LocationMasks { raster, windows })
}

fn validate_shape(shape: &LocationShape) -> Result<()> {
    if shape.location_id == NO_LOCATION {
        return Err(AggregationError::InvalidGeometry {
            location_id: shape.location_id,
            message: "location_id 0 is reserved for unassigned pixels".to_string(),
        });
    }
    let all_finite = shape
        .geometry
        .0
        .iter()
        .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
        .flat_map(|ring| ring.0.iter())
        .all(|c| c.x.is_finite() && c.y.is_finite());
    if !all_finite {
        return Err(AggregationError::InvalidGeometry {
            location_id: shape.location_id,
            message: "non-finite coordinate".to_string(),
        });
    }
    Ok(())
}

fn union(a: &LocationWindow, b: &LocationWindow) -> LocationWindow {
    if a.is_empty() {
        return b.clone();
    }
    if b.is_empty() {
        return a.clone();
    }
    LocationWindow::new(
        a.rows.start.min(b.rows.start)..a.rows.end.max(b.rows.end),
        a.cols.start.min(b.cols.start)..a.cols.end.max(b.cols.end),
    )
}

/// Ring edges in pixel space.
fn pixel_edges(ring: &LineString<f64>, inverse: &GeoTransform, edges: &mut Vec<[(f64, f64); 2]>) {
    let points: Vec<(f64, f64)> = ring.0.iter().map(|c| inverse.apply(c.x, c.y)).collect();
    if points.len() < 2 {
        return;
    }
    for pair in points.windows(2) {
        edges.push([pair[0], pair[1]]);
    }
    // geo closes rings on construction, but be tolerant of open ones.
    let (first, last) = (points[0], points[points.len() - 1]);
    if first != last {
        edges.push([last, first]);
    }
}

fn burn(raster: &mut Grid<u32>, geometry: &MultiPolygon<f64>, inverse: &GeoTransform, id: u32) {
    let (width, height) = (raster.width(), raster.height());
    let mut edges = Vec::new();
    let mut crossings = Vec::new();

    for polygon in &geometry.0 {
        edges.clear();
        pixel_edges(polygon.exterior(), inverse, &mut edges);
        for hole in polygon.interiors() {
            pixel_edges(hole, inverse, &mut edges);
        }
        if edges.is_empty() {
            continue;
        }

        let (row_min, row_max) = edges.iter().flatten().fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), &(_, y)| (lo.min(y), hi.max(y)),
        );
        let first_row = (row_min - 0.5).ceil().max(0.0) as usize;
        let end_row = ((row_max - 0.5).ceil().max(0.0) as usize).min(height);

        for row in first_row..end_row {
            let yc = row as f64 + 0.5;
            crossings.clear();
            for &[(x0, y0), (x1, y1)] in &edges {
                if (y0 <= yc) != (y1 <= yc) {
                    crossings.push(x0 + (yc - y0) * (x1 - x0) / (y1 - y0));
                }
            }
            crossings.sort_by(|a, b| a.total_cmp(b));

            let data = raster.data_mut();
            for span in crossings.chunks_exact(2) {
                let start = (span[0] - 0.5).ceil().clamp(0.0, width as f64) as usize;
                let end = (span[1] - 0.5).ceil().clamp(0.0, width as f64) as usize;
                if start < end {
                    data[row * width + start..row * width + end].fill(id);
                }
            }
        }
    }
}
