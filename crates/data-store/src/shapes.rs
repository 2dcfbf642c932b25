//! GeoJSON shape store and the location tables that filter it.

use std::collections::BTreeSet;
use std::path::Path;

use aggregation::{
    join_most_detailed, LocationId, LocationShape, ShapeHierarchySpec, ShapeSourceKind, ShapeStore,
};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use geojson::{Feature, GeoJson, Value};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{require_exists, Result, StoreError};
use crate::paths::DataPaths;
use crate::tables::{deserialize_flag, read_rows};

fn geojson_error(path: &Path, message: impl ToString) -> StoreError {
    StoreError::GeoJson {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

fn ring(positions: &[Vec<f64>]) -> LineString<f64> {
    positions
        .iter()
        .filter(|p| p.len() >= 2)
        .map(|p| Coord { x: p[0], y: p[1] })
        .collect::<Vec<_>>()
        .into()
}

fn polygon(rings: &[Vec<Vec<f64>>]) -> Option<Polygon<f64>> {
    let (exterior, interiors) = rings.split_first()?;
    Some(Polygon::new(
        ring(exterior),
        interiors.iter().map(|r| ring(r)).collect(),
    ))
}

/// Collect the polygonal parts of a GeoJSON geometry.
///
/// Returns `None` for points and lines, which cannot be rasterized.
fn multi_polygon(value: &Value) -> Option<MultiPolygon<f64>> {
    match value {
        Value::Polygon(rings) => Some(MultiPolygon(polygon(rings).into_iter().collect())),
        Value::MultiPolygon(polygons) => Some(MultiPolygon(
            polygons.iter().filter_map(|p| polygon(p)).collect(),
        )),
        Value::GeometryCollection(geometries) => {
            let parts: Vec<Polygon<f64>> = geometries
                .iter()
                .filter_map(|g| multi_polygon(&g.value))
                .flat_map(|mp| mp.0)
                .collect();
            Some(MultiPolygon(parts))
        }
        _ => None,
    }
}

fn feature_location_id(feature: &Feature) -> Option<LocationId> {
    match feature.property("location_id")? {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
            .and_then(|v| LocationId::try_from(v).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn feature_priority(feature: &Feature) -> i64 {
    feature
        .property("priority")
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(0)
}

/// Read a FeatureCollection of administrative polygons.
///
/// Every feature needs an integer `location_id` property and a polygonal
/// geometry. An optional integer `priority` property sets burn order.
pub fn read_shapes(path: &Path) -> Result<Vec<LocationShape>> {
    require_exists(path)?;
    let text = std::fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    let geojson: GeoJson = text.parse().map_err(|e| geojson_error(path, e))?;
    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(geojson_error(path, "expected a FeatureCollection"));
    };

    let mut shapes = Vec::with_capacity(collection.features.len());
    for (index, feature) in collection.features.iter().enumerate() {
        let location_id = feature_location_id(feature).ok_or_else(|| {
            geojson_error(path, format!("feature {index} has no integer location_id"))
        })?;
        let geometry = match &feature.geometry {
            Some(geometry) => multi_polygon(&geometry.value).ok_or_else(|| {
                geojson_error(
                    path,
                    format!("feature {index} (location {location_id}) is not polygonal"),
                )
            })?,
            None => MultiPolygon(vec![]),
        };
        shapes.push(LocationShape::new(location_id, geometry).with_priority(feature_priority(feature)));
    }
    debug!(path = %path.display(), shapes = shapes.len(), "Read shapes");
    Ok(shapes)
}

#[derive(Debug, Deserialize)]
struct LocationRow {
    location_id: LocationId,
    #[serde(deserialize_with = "deserialize_flag")]
    most_detailed: bool,
}

/// IDs flagged `most_detailed` in a location table.
pub fn read_most_detailed(path: &Path) -> Result<BTreeSet<LocationId>> {
    let rows: Vec<LocationRow> = read_rows(path)?;
    Ok(rows
        .into_iter()
        .filter(|r| r.most_detailed)
        .map(|r| r.location_id)
        .collect())
}

/// Shapes from `<shape_dir>/shapes/<hierarchy>.geojson`, joined with
/// `<shape_dir>/locations/<table>.csv` for joined sources.
#[derive(Debug, Clone)]
pub struct GeoJsonShapeStore {
    paths: DataPaths,
}

impl GeoJsonShapeStore {
    pub fn new(paths: DataPaths) -> Self {
        Self { paths }
    }
}

impl ShapeStore for GeoJsonShapeStore {
    fn load_administrative_shapes(&self, spec: &ShapeHierarchySpec) -> aggregation::Result<Vec<LocationShape>> {
        let shapes = read_shapes(&self.paths.shapes(&spec.name))?;
        let total = shapes.len();
        let shapes = match &spec.source {
            ShapeSourceKind::MostDetailedShapes => shapes,
            ShapeSourceKind::JoinedLocations { locations_table } => {
                let most_detailed = read_most_detailed(&self.paths.locations(locations_table))?;
                join_most_detailed(shapes, &most_detailed)
            }
        };
        info!(hierarchy = %spec.name, total, kept = shapes.len(), "Loaded shapes");
        Ok(shapes)
    }
}
