//! Filesystem stores for the aggregation pipeline.
//!
//! Inputs and outputs live under four configurable roots:
//!
//! ```text
//! <population_dir>/<time_point>.zarr                         population grids
//! <climate_dir>/<scenario>/<measure>/<draw>.zarr             climate cubes [year, lat, lon]
//! <shape_dir>/shapes/<hierarchy>.geojson                     administrative polygons
//! <shape_dir>/locations/<table>.csv                          most-detailed flags
//! <shape_dir>/hierarchies/<hierarchy>.csv                    parent/level tables
//! <output_dir>/<version>/raw-results/<h>/<s>/<m>/<draw>.csv  detailed results
//! <output_dir>/<version>/results/<h>/<s>/<m>/<draw>.csv      aggregated results
//! <output_dir>/<version>/results/<h>/population.csv          population rollup
//! <output_dir>/<version>/results/<h>/<m>_<s>.csv             compiled draws
//! <output_dir>/<version>/masks/<h>.zarr                      location-ID rasters
//! ```

pub mod error;
pub mod paths;
pub mod shapes;
pub mod tables;
pub mod zarr;

pub use error::{Result, StoreError};
pub use paths::DataPaths;
pub use shapes::{read_most_detailed, read_shapes, GeoJsonShapeStore};
pub use tables::{
    read_climate_table, read_hierarchy, read_population_table, write_rows, CompileSummary,
    CsvHierarchyStore, CsvResultBatch, CsvResultStore, CLIMATE_COLUMNS, POPULATION_COLUMNS,
};
pub use zarr::{read_grid, ZarrClimateSeries, ZarrClimateStore, ZarrGridWriter, ZarrPopulationStore};

use aggregation::Stores;

/// The filesystem implementation of every store the aggregator needs.
pub type FilesystemStores =
    Stores<ZarrPopulationStore, ZarrClimateStore, GeoJsonShapeStore, CsvHierarchyStore, CsvResultStore>;

/// Build all five stores over `paths`.
pub fn filesystem_stores(paths: &DataPaths) -> FilesystemStores {
    Stores {
        population: ZarrPopulationStore::new(paths.clone()),
        climate: ZarrClimateStore::new(paths.clone()),
        shapes: GeoJsonShapeStore::new(paths.clone()),
        hierarchies: CsvHierarchyStore::new(paths.clone()),
        results: CsvResultStore::new(paths.clone()),
    }
}
