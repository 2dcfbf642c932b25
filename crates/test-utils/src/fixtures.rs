//! Small building blocks for aggregation tests.

use aggregation::HierarchyNode;
use climate_common::{Crs, GeoTransform, Grid};
use geo::{Coord, LineString, MultiPolygon, Polygon};

/// Axis-aligned rectangle from `(x0, y0)` to `(x1, y1)`.
pub fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
    let ring: LineString<f64> = vec![
        Coord { x: x0, y: y0 },
        Coord { x: x1, y: y0 },
        Coord { x: x1, y: y1 },
        Coord { x: x0, y: y1 },
        Coord { x: x0, y: y0 },
    ]
    .into();
    MultiPolygon(vec![Polygon::new(ring, vec![])])
}

/// North-up transform with unit pixels whose top-left corner is `(0, height)`.
pub fn unit_transform(height: usize) -> GeoTransform {
    GeoTransform::north_up(0.0, height as f64, 1.0, 1.0)
}

/// A WGS84 grid filled with `value` on [`unit_transform`].
pub fn unit_grid<T: Copy>(value: T, width: usize, height: usize) -> Grid<T> {
    Grid::filled(value, width, height, unit_transform(height), Crs::wgs84())
}

/// A hierarchy row. A node whose parent is itself is a root.
pub fn hierarchy_node(location_id: u32, parent_id: u32, level: u32, most_detailed: bool) -> HierarchyNode {
    HierarchyNode {
        location_id,
        parent_id: Some(parent_id),
        level,
        location_name: Some(format!("Location {location_id}")),
        most_detailed,
    }
}
