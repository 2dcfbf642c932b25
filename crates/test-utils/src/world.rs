//! A complete on-disk input tree with known aggregation results.
//!
//! The world is an 8x8 grid of 1-degree pixels covering (0, 0)..(8, 8),
//! split into four 4x4 districts:
//!
//! ```text
//!        x: 0..4   4..8
//! y 4..8   11       12        region 10 (north)
//! y 0..4   21       22        region 20 (south)
//! ```
//!
//! Climate sits on a coarser 4x4 grid of 2-degree cells. Each district's
//! climate value is constant, so every expected result has a closed form.

use std::path::Path;

use aggregation::{AggregationConfig, RunTags, ShapeHierarchySpec, YearRange};
use climate_common::{Crs, GeoArray, GeoTransform, Grid};
use data_store::{DataPaths, ZarrGridWriter};
use serde_json::json;
use tempfile::TempDir;

use crate::generators::{cell_centres, create_quadrant_grid};

pub const WIDTH: usize = 8;
pub const HEIGHT: usize = 8;
pub const ROOT: u32 = 1;
pub const DISTRICTS: [u32; 4] = [11, 12, 21, 22];
pub const START_YEAR: i32 = 2020;
pub const END_YEAR: i32 = 2021;

/// Climate per district before year and draw offsets, in [`DISTRICTS`] order.
const DISTRICT_CLIMATE: [f32; 4] = [1.0, 2.0, 3.0, 4.0];

pub struct SyntheticWorld {
    dir: TempDir,
    pub paths: DataPaths,
    pub config: AggregationConfig,
}

impl SyntheticWorld {
    /// Write the full input tree into a fresh temporary directory.
    pub fn build() -> std::io::Result<Self> {
        let dir = TempDir::new()?;
        let paths = DataPaths::under(dir.path());
        let config = Self::default_config();
        let world = Self { dir, paths, config };
        world.write_inputs().map_err(std::io::Error::other)?;
        Ok(world)
    }

    pub fn default_config() -> AggregationConfig {
        AggregationConfig {
            scenarios: vec!["ssp126".into(), "ssp245".into()],
            measures: vec!["mean_temperature".into()],
            draws: vec!["000".into(), "001".into()],
            years: YearRange::new(START_YEAR, END_YEAR),
            shape_hierarchies: vec![
                ShapeHierarchySpec::joined(
                    "gbd_2021",
                    "gbd_2021",
                    vec!["gbd_2021".into(), "fhs_2021".into()],
                ),
                ShapeHierarchySpec::most_detailed("lsae_1209"),
            ],
            ..AggregationConfig::default()
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Population of one pixel in `year`.
    pub fn pixel_population(year: i32) -> f64 {
        (year - START_YEAR + 1) as f64
    }

    /// Expected population of a district in `year`.
    pub fn district_population(year: i32) -> f64 {
        16.0 * Self::pixel_population(year)
    }

    /// Expected climate value of a district for a unit.
    pub fn district_value(location_id: u32, year: i32, tags: &RunTags) -> Option<f64> {
        let index = DISTRICTS.iter().position(|&d| d == location_id)?;
        Some(DISTRICT_CLIMATE[index] as f64 + Self::offset(year, &tags.draw) as f64)
    }

    fn offset(year: i32, draw: &str) -> f32 {
        let draw_index: f32 = draw.parse::<u16>().map(f32::from).unwrap_or(0.0);
        0.5 * (year - START_YEAR) as f32 + 10.0 * draw_index
    }

    fn write_inputs(&self) -> data_store::Result<()> {
        let writer = ZarrGridWriter::new(4);
        let transform = GeoTransform::north_up(0.0, HEIGHT as f64, 1.0, 1.0);

        for year in self.config.years.iter() {
            let grid = Grid::filled(
                Self::pixel_population(year) as f32,
                WIDTH,
                HEIGHT,
                transform,
                Crs::wgs84(),
            );
            writer.write_f32_grid(&self.paths.population_grid(&self.config.population_time_point(year)), &grid)?;
        }

        let years: Vec<i32> = self.config.years.iter().collect();
        for scenario in &self.config.scenarios {
            for measure in &self.config.measures {
                for draw in &self.config.draws {
                    let fields = years
                        .iter()
                        .map(|&y| climate_field(Self::offset(y, draw)))
                        .collect::<data_store::Result<Vec<GeoArray>>>()?;
                    writer.write_climate_series(&self.paths.climate_series(scenario, measure, draw), &years, &fields)?;
                }
            }
        }

        write_file(&self.paths.shapes("lsae_1209"), &shapes_geojson(false))?;
        write_file(&self.paths.shapes("gbd_2021"), &shapes_geojson(true))?;
        write_file(
            &self.paths.locations("gbd_2021"),
            "location_id,location_name,parent_id,most_detailed\n\
             1,World,1,0\n10,North,1,0\n20,South,1,0\n\
             11,North West,10,1\n12,North East,10,1\n21,South West,20,1\n22,South East,20,1\n",
        )?;

        let admin = "location_id,parent_id,level,location_name,most_detailed\n\
             1,1,0,World,0\n10,1,1,North,0\n20,1,1,South,0\n\
             11,10,2,North West,1\n12,10,2,North East,1\n21,20,2,South West,1\n22,20,2,South East,1\n";
        write_file(&self.paths.hierarchy("gbd_2021"), admin)?;
        write_file(&self.paths.hierarchy("lsae_1209"), admin)?;
        write_file(
            &self.paths.hierarchy("fhs_2021"),
            "location_id,parent_id,level\n1,,0\n30,1,1\n40,1,1\n11,30,2\n21,30,2\n12,40,2\n22,40,2\n",
        )?;
        Ok(())
    }
}

/// Climate on 2-degree cells, latitude ascending as models store it.
fn climate_field(offset: f32) -> data_store::Result<GeoArray> {
    let north_first = create_quadrant_grid(4, 4, DISTRICT_CLIMATE);
    let mut data = Vec::with_capacity(16);
    for row in north_first.chunks_exact(4).rev() {
        data.extend(row.iter().map(|v| v + offset));
    }
    let latitude = cell_centres(0.0, 2.0, 4);
    let longitude = cell_centres(0.0, 2.0, 4);
    GeoArray::new(latitude, longitude, data)
        .map_err(|e| data_store::StoreError::invalid_metadata(e.to_string()))
}

fn district_box(location_id: u32) -> [f64; 4] {
    match location_id {
        11 => [0.0, 4.0, 4.0, 8.0],
        12 => [4.0, 4.0, 8.0, 8.0],
        21 => [0.0, 0.0, 4.0, 4.0],
        _ => [4.0, 0.0, 8.0, 4.0],
    }
}

fn polygon_feature(location_id: u32, [x0, y0, x1, y1]: [f64; 4]) -> serde_json::Value {
    json!({
        "type": "Feature",
        "properties": {"location_id": location_id},
        "geometry": {
            "type": "Polygon",
            "coordinates": [[[x0, y0], [x1, y0], [x1, y1], [x0, y1], [x0, y0]]]
        }
    })
}

fn shapes_geojson(with_regions: bool) -> String {
    let mut features: Vec<_> = DISTRICTS
        .iter()
        .map(|&id| polygon_feature(id, district_box(id)))
        .collect();
    if with_regions {
        // Region outlines are present in joined sources but never rasterized.
        features.push(polygon_feature(10, [0.0, 4.0, 8.0, 8.0]));
        features.push(polygon_feature(20, [0.0, 0.0, 8.0, 4.0]));
    }
    json!({"type": "FeatureCollection", "features": features}).to_string()
}

fn write_file(path: &Path, contents: &str) -> data_store::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| data_store::StoreError::io(parent, e))?;
    }
    std::fs::write(path, contents).map_err(|e| data_store::StoreError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_writes_inputs() {
        let world = SyntheticWorld::build().unwrap();
        assert!(world.paths.population_grid("2020q1").exists());
        assert!(world.paths.population_grid("2021q1").exists());
        assert!(world.paths.climate_series("ssp245", "mean_temperature", "001").exists());
        assert!(world.paths.shapes("gbd_2021").exists());
        assert!(world.paths.hierarchy("fhs_2021").exists());
        world.config.validate().unwrap();
    }

    #[test]
    fn test_climate_field_orientation() {
        let field = climate_field(0.0).unwrap();
        // Southernmost row first: south-west then south-east values.
        assert_eq!(field.get(0, 0), Some(3.0));
        assert_eq!(field.get(0, 3), Some(4.0));
        assert_eq!(field.get(3, 0), Some(1.0));
    }

    #[test]
    fn test_expected_values() {
        let tags = RunTags::new("ssp245", "mean_temperature", "001");
        assert_eq!(SyntheticWorld::district_value(12, 2021, &tags), Some(12.5));
        assert_eq!(SyntheticWorld::district_value(99, 2021, &tags), None);
        assert_eq!(SyntheticWorld::district_population(2021), 32.0);
    }
}
