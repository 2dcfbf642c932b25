//! Population-weighted aggregation of gridded climate data over
//! administrative hierarchies.
//!
//! One unit of work is a (scenario, measure, draw) combination. For every
//! configured shape hierarchy the unit:
//!
//! ```text
//! template population grid + shapes
//!      │
//!      ▼
//! rasterize() ──► location-ID raster + per-location windows   (once)
//!      │
//!      ▼  for each year
//! population grid, climate field
//!      │
//!      ├─► resample_to_grid()   climate onto the population grid
//!      │
//!      └─► reduce_locations()   Σ pop·climate, Σ pop per window
//!               │
//!               ▼
//!          detailed records
//!               │
//!               ▼  for each output hierarchy
//!          aggregate_hierarchy() ──► ResultStore
//! ```
//!
//! # Example
//!
//! ```ignore
//! use aggregation::{AggregationConfig, Aggregator, Stores};
//!
//! let aggregator = Aggregator::new(AggregationConfig::default(), Stores::shared(&stores))?;
//! let summary = aggregator.run_unit("2024_10_01", "ssp245", "mean_temperature", "000")?;
//! ```

pub mod compile;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod pipeline;
pub mod rasterize;
pub mod reduce;
pub mod resample;
pub mod store;
pub mod types;

pub use compile::compile_draws;
pub use config::{check_version, AggregationConfig, ShapeHierarchySpec, ShapeSourceKind, YearRange, DEFAULT_PIXEL_BUFFER};
pub use error::{AggregationError, Result};
pub use hierarchy::{aggregate_hierarchy, aggregate_population, population_records, rollup};
pub use pipeline::{Aggregator, HierarchySummary, RunSummary, Stores};
pub use rasterize::{compute_window, rasterize, LocationMasks, LocationShape, LocationWindow, LocationWindows};
pub use reduce::{reduce_locations, reduce_window, LocationSums};
pub use resample::{geographic_grid, resample_nearest, resample_to_grid};
pub use store::{
    join_most_detailed, ClimateSeries, ClimateStore, HierarchyStore, InMemoryBatch,
    InMemoryResults, InMemorySeries, InMemoryStores, PopulationStore, ResultBatch, ResultStore,
    ShapeStore,
};
pub use types::{
    ratio, AggregateRecord, ClimateRecord, DetailedRecord, HierarchyNode, HierarchyTable,
    LocationId, PopulationRecord, RunTags, NO_LOCATION,
};
