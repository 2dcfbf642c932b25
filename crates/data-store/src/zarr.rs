//! Zarr V3 grid stores.
//!
//! Population grids are 2-D `[row, col]` float32 arrays carrying their
//! affine transform and CRS as attributes. Climate series are 3-D
//! `[year, lat, lon]` float32 cubes carrying their coordinate vectors, read
//! one year slice at a time.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use aggregation::{ClimateSeries, ClimateStore, PopulationStore};
use climate_common::{Crs, GeoArray, GeoTransform, Grid};
use serde_json::{json, Map, Value};
use tracing::debug;
use zarrs::array::{Array, ArrayBuilder, DataType, Element, ElementOwned, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs_filesystem::FilesystemStore;

use crate::error::{require_exists, Result, StoreError};
use crate::paths::DataPaths;

/// Default chunk edge for written arrays.
pub const DEFAULT_CHUNK_SIZE: usize = 512;

fn open_array(path: &Path) -> Result<Array<FilesystemStore>> {
    require_exists(path)?;
    let store = FilesystemStore::new(path).map_err(StoreError::zarr)?;
    Array::open(Arc::new(store), "/").map_err(StoreError::zarr)
}

fn read_subset<T: ElementOwned>(array: &Array<FilesystemStore>, start: Vec<u64>, shape: Vec<u64>) -> Result<Vec<T>> {
    let subset = ArraySubset::new_with_start_shape(start, shape).map_err(StoreError::zarr)?;
    array
        .retrieve_array_subset_elements::<T>(&subset)
        .map_err(StoreError::zarr)
}

fn attr_f64_vec(attrs: &Map<String, Value>, key: &str) -> Result<Vec<f64>> {
    attrs
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| StoreError::invalid_metadata(format!("missing '{key}' attribute")))?
        .iter()
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| StoreError::invalid_metadata(format!("non-numeric value in '{key}'")))
        })
        .collect()
}

fn attr_crs(attrs: &Map<String, Value>) -> Result<Crs> {
    match attrs.get("crs").and_then(Value::as_str) {
        Some(s) => Crs::from_str(s).map_err(|e| StoreError::invalid_metadata(e.to_string())),
        None => Ok(Crs::wgs84()),
    }
}

fn attr_transform(attrs: &Map<String, Value>) -> Result<GeoTransform> {
    let coeffs = attr_f64_vec(attrs, "transform")?;
    let coeffs: [f64; 6] = coeffs.try_into().map_err(|c: Vec<f64>| {
        StoreError::invalid_metadata(format!("transform has {} coefficients, expected 6", c.len()))
    })?;
    Ok(GeoTransform::from_coefficients(coeffs))
}

/// Read a 2-D georeferenced grid: float32 population or uint32 location IDs.
pub fn read_grid<T: ElementOwned + Copy>(path: &Path) -> Result<Grid<T>> {
    let array = open_array(path)?;
    let shape = array.shape().to_vec();
    if shape.len() != 2 {
        return Err(StoreError::invalid_metadata(format!(
            "{} has {} dimensions, expected 2",
            path.display(),
            shape.len()
        )));
    }
    let attrs = array.attributes();
    let transform = attr_transform(attrs)?;
    let crs = attr_crs(attrs)?;
    let data = read_subset::<T>(&array, vec![0, 0], shape.clone())?;
    let grid = Grid::new(data, shape[1] as usize, shape[0] as usize, transform, crs)
        .map_err(|e| StoreError::invalid_metadata(e.to_string()))?;
    Ok(grid)
}

/// Writes grids and climate cubes as Zarr V3 arrays.
#[derive(Debug, Clone)]
pub struct ZarrGridWriter {
    chunk_size: usize,
}

impl Default for ZarrGridWriter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl ZarrGridWriter {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    fn write_array<T: Element>(
        &self,
        path: &Path,
        shape: Vec<u64>,
        chunk_shape: Vec<u64>,
        data_type: DataType,
        fill_value: FillValue,
        attrs: Map<String, Value>,
        data: &[T],
    ) -> Result<()> {
        if path.exists() {
            std::fs::remove_dir_all(path).map_err(|e| StoreError::io(path, e))?;
        }
        std::fs::create_dir_all(path).map_err(|e| StoreError::io(path, e))?;
        let store = Arc::new(FilesystemStore::new(path).map_err(StoreError::zarr)?);

        let chunk_grid: zarrs::array::ChunkGrid = chunk_shape
            .try_into()
            .map_err(|e| StoreError::zarr(format!("{e:?}")))?;
        let array = ArrayBuilder::new(shape.clone(), data_type, chunk_grid, fill_value)
            .attributes(attrs)
            .build(store, "/")
            .map_err(StoreError::zarr)?;

        array.store_metadata().map_err(StoreError::zarr)?;

        let start = vec![0; shape.len()];
        let subset = ArraySubset::new_with_start_shape(start, shape).map_err(StoreError::zarr)?;
        array
            .store_array_subset_elements(&subset, data)
            .map_err(StoreError::zarr)?;
        debug!(path = %path.display(), values = data.len(), "Wrote zarr array");
        Ok(())
    }

    fn grid_attrs<T: Copy>(grid: &Grid<T>) -> Map<String, Value> {
        let mut attrs = Map::new();
        attrs.insert("transform".to_string(), json!(grid.transform().coefficients()));
        attrs.insert("crs".to_string(), json!(grid.crs().to_string()));
        attrs
    }

    fn chunk(&self, len: usize) -> u64 {
        self.chunk_size.min(len.max(1)) as u64
    }

    /// Write a population (or any float) grid.
    pub fn write_f32_grid(&self, path: &Path, grid: &Grid<f32>) -> Result<()> {
        self.write_array(
            path,
            vec![grid.height() as u64, grid.width() as u64],
            vec![self.chunk(grid.height()), self.chunk(grid.width())],
            DataType::Float32,
            FillValue::from(f32::NAN),
            Self::grid_attrs(grid),
            grid.data(),
        )
    }

    /// Write a location-ID raster. Unassigned pixels hold 0.
    pub fn write_u32_grid(&self, path: &Path, grid: &Grid<u32>) -> Result<()> {
        self.write_array(
            path,
            vec![grid.height() as u64, grid.width() as u64],
            vec![self.chunk(grid.height()), self.chunk(grid.width())],
            DataType::UInt32,
            FillValue::from(0u32),
            Self::grid_attrs(grid),
            grid.data(),
        )
    }

    /// Write a yearly climate cube. All fields must share coordinates.
    pub fn write_climate_series(&self, path: &Path, years: &[i32], fields: &[GeoArray]) -> Result<()> {
        let first = fields
            .first()
            .ok_or_else(|| StoreError::invalid_metadata("climate series has no years"))?;
        if years.len() != fields.len() {
            return Err(StoreError::invalid_metadata(format!(
                "{} years but {} fields",
                years.len(),
                fields.len()
            )));
        }
        if fields
            .iter()
            .any(|f| f.latitude != first.latitude || f.longitude != first.longitude || f.crs != first.crs)
        {
            return Err(StoreError::invalid_metadata("climate fields do not share coordinates"));
        }

        let mut attrs = Map::new();
        attrs.insert("years".to_string(), json!(years));
        attrs.insert("latitude".to_string(), json!(first.latitude));
        attrs.insert("longitude".to_string(), json!(first.longitude));
        attrs.insert("crs".to_string(), json!(first.crs.to_string()));

        let data: Vec<f32> = fields.iter().flat_map(|f| f.data.iter().copied()).collect();
        self.write_array(
            path,
            vec![years.len() as u64, first.n_lat() as u64, first.n_lon() as u64],
            vec![1, self.chunk(first.n_lat()), self.chunk(first.n_lon())],
            DataType::Float32,
            FillValue::from(f32::NAN),
            attrs,
            &data,
        )
    }
}

/// Population grids stored as `<population_dir>/<time_point>.zarr`.
#[derive(Debug, Clone)]
pub struct ZarrPopulationStore {
    paths: DataPaths,
}

impl ZarrPopulationStore {
    pub fn new(paths: DataPaths) -> Self {
        Self { paths }
    }
}

impl PopulationStore for ZarrPopulationStore {
    fn load_population_grid(&self, time_point: &str) -> aggregation::Result<Grid<f32>> {
        let path = self.paths.population_grid(time_point);
        debug!(path = %path.display(), "Loading population grid");
        Ok(read_grid(&path)?)
    }
}

/// Climate cubes stored as `<climate_dir>/<scenario>/<measure>/<draw>.zarr`.
#[derive(Debug, Clone)]
pub struct ZarrClimateStore {
    paths: DataPaths,
}

impl ZarrClimateStore {
    pub fn new(paths: DataPaths) -> Self {
        Self { paths }
    }
}

impl ClimateStore for ZarrClimateStore {
    type Series = ZarrClimateSeries;

    fn load_climate_series(&self, scenario: &str, measure: &str, draw: &str) -> aggregation::Result<ZarrClimateSeries> {
        let path = self.paths.climate_series(scenario, measure, draw);
        Ok(ZarrClimateSeries::open(&path)?)
    }
}

/// An open climate cube. Only the coordinates are read up front.
pub struct ZarrClimateSeries {
    path: PathBuf,
    array: Array<FilesystemStore>,
    years: Vec<i32>,
    latitude: Vec<f64>,
    longitude: Vec<f64>,
    crs: Crs,
}

impl ZarrClimateSeries {
    pub fn open(path: &Path) -> Result<Self> {
        let array = open_array(path)?;
        let shape = array.shape().to_vec();
        let attrs = array.attributes();

        let years: Vec<i32> = attr_f64_vec(attrs, "years")?
            .into_iter()
            .map(|y| y as i32)
            .collect();
        let latitude = attr_f64_vec(attrs, "latitude")?;
        let longitude = attr_f64_vec(attrs, "longitude")?;
        let crs = attr_crs(attrs)?;

        let expected = [years.len() as u64, latitude.len() as u64, longitude.len() as u64];
        if shape != expected {
            return Err(StoreError::invalid_metadata(format!(
                "{} has shape {:?}, coordinates imply {:?}",
                path.display(),
                shape,
                expected
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            array,
            years,
            latitude,
            longitude,
            crs,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ClimateSeries for ZarrClimateSeries {
    fn years(&self) -> Vec<i32> {
        let mut years = self.years.clone();
        years.sort_unstable();
        years
    }

    fn load_year(&self, year: i32) -> aggregation::Result<GeoArray> {
        let index = self.years.iter().position(|&y| y == year).ok_or_else(|| {
            aggregation::AggregationError::missing_input(format!(
                "year {year} in {}",
                self.path.display()
            ))
        })?;
        let (n_lat, n_lon) = (self.latitude.len() as u64, self.longitude.len() as u64);
        let data = read_subset::<f32>(&self.array, vec![index as u64, 0, 0], vec![1, n_lat, n_lon])?;
        let mut field = GeoArray::new(self.latitude.clone(), self.longitude.clone(), data)?;
        field.crs = self.crs;
        Ok(field)
    }
}
