//! Interfaces to the stores the aggregator reads from and writes to.
//!
//! Filesystem implementations live in the `data-store` crate. The in-memory
//! versions here back unit tests and small embedded runs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use climate_common::{GeoArray, Grid};

use crate::config::{ShapeHierarchySpec, ShapeSourceKind};
use crate::error::{AggregationError, Result};
use crate::rasterize::LocationShape;
use crate::types::{
    AggregateRecord, DetailedRecord, HierarchyTable, LocationId, PopulationRecord, RunTags,
};

/// Gridded population by time point (e.g. `2020q1`).
pub trait PopulationStore {
    fn load_population_grid(&self, time_point: &str) -> Result<Grid<f32>>;
}

/// A yearly series of one climate variable, read a year at a time.
pub trait ClimateSeries {
    /// Years available in the series, ascending.
    fn years(&self) -> Vec<i32>;

    fn load_year(&self, year: i32) -> Result<GeoArray>;
}

/// Climate series by scenario, measure and draw.
pub trait ClimateStore {
    type Series: ClimateSeries;

    fn load_climate_series(&self, scenario: &str, measure: &str, draw: &str) -> Result<Self::Series>;
}

/// Administrative polygons for a shape hierarchy, already restricted to the
/// locations that should be rasterized.
pub trait ShapeStore {
    fn load_administrative_shapes(&self, spec: &ShapeHierarchySpec) -> Result<Vec<LocationShape>>;
}

/// Parent/child tables by hierarchy name.
pub trait HierarchyStore {
    fn load_hierarchy_table(&self, name: &str) -> Result<HierarchyTable>;
}

/// Persisted result partitions.
///
/// Partitions are staged in a [`ResultBatch`] and only replace existing
/// output when the batch is committed. Dropping a batch discards it.
pub trait ResultStore {
    type Batch: ResultBatch;

    /// Start staging partitions under `version`.
    fn begin(&self, version: &str) -> Result<Self::Batch>;
}

/// Partitions staged for one unit of work.
pub trait ResultBatch {
    /// Most-detailed records of one shape hierarchy, before rollup.
    fn save_raw_table(&mut self, hierarchy: &str, tags: &RunTags, table: &[DetailedRecord]) -> Result<()>;

    /// Aggregated records of one output hierarchy.
    fn save_detailed_table(&mut self, hierarchy: &str, tags: &RunTags, table: &[AggregateRecord]) -> Result<()>;

    fn save_population_table(&mut self, hierarchy: &str, table: &[PopulationRecord]) -> Result<()>;

    /// Replace existing output with every staged partition.
    fn commit(self) -> Result<()>;
}

impl<T: PopulationStore + ?Sized> PopulationStore for &T {
    fn load_population_grid(&self, time_point: &str) -> Result<Grid<f32>> {
        (**self).load_population_grid(time_point)
    }
}

impl<T: ClimateStore + ?Sized> ClimateStore for &T {
    type Series = T::Series;

    fn load_climate_series(&self, scenario: &str, measure: &str, draw: &str) -> Result<Self::Series> {
        (**self).load_climate_series(scenario, measure, draw)
    }
}

impl<T: ShapeStore + ?Sized> ShapeStore for &T {
    fn load_administrative_shapes(&self, spec: &ShapeHierarchySpec) -> Result<Vec<LocationShape>> {
        (**self).load_administrative_shapes(spec)
    }
}

impl<T: HierarchyStore + ?Sized> HierarchyStore for &T {
    fn load_hierarchy_table(&self, name: &str) -> Result<HierarchyTable> {
        (**self).load_hierarchy_table(name)
    }
}

impl<T: ResultStore + ?Sized> ResultStore for &T {
    type Batch = T::Batch;

    fn begin(&self, version: &str) -> Result<T::Batch> {
        (**self).begin(version)
    }
}

/// Keep the shapes whose location is in `most_detailed`, in shape order.
pub fn join_most_detailed(
    shapes: Vec<LocationShape>,
    most_detailed: &BTreeSet<LocationId>,
) -> Vec<LocationShape> {
    shapes
        .into_iter()
        .filter(|s| most_detailed.contains(&s.location_id))
        .collect()
}

/// Results captured by [`InMemoryStores`], keyed by `(version, hierarchy, ..)`.
#[derive(Debug, Default, Clone)]
pub struct InMemoryResults {
    pub raw: BTreeMap<(String, String, RunTags), Vec<DetailedRecord>>,
    pub detailed: BTreeMap<(String, String, RunTags), Vec<AggregateRecord>>,
    pub population: BTreeMap<(String, String), Vec<PopulationRecord>>,
}

/// All five stores backed by maps.
#[derive(Debug, Default)]
pub struct InMemoryStores {
    pub population: BTreeMap<String, Grid<f32>>,
    pub climate: BTreeMap<RunTags, BTreeMap<i32, GeoArray>>,
    pub shapes: BTreeMap<String, Vec<LocationShape>>,
    /// Location tables for joined shape sources, by table name.
    pub locations: BTreeMap<String, HierarchyTable>,
    pub hierarchies: BTreeMap<String, HierarchyTable>,
    results: Arc<Mutex<InMemoryResults>>,
}

impl InMemoryStores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything saved so far.
    pub fn results(&self) -> MutexGuard<'_, InMemoryResults> {
        lock_results(&self.results)
    }
}

// A poisoned lock still holds consistent maps; commits only insert.
fn lock_results(results: &Mutex<InMemoryResults>) -> MutexGuard<'_, InMemoryResults> {
    results.lock().unwrap_or_else(|e| e.into_inner())
}

/// A climate series held in memory.
#[derive(Debug, Clone)]
pub struct InMemorySeries {
    years: BTreeMap<i32, GeoArray>,
}

impl ClimateSeries for InMemorySeries {
    fn years(&self) -> Vec<i32> {
        self.years.keys().copied().collect()
    }

    fn load_year(&self, year: i32) -> Result<GeoArray> {
        self.years
            .get(&year)
            .cloned()
            .ok_or_else(|| AggregationError::missing_input(format!("climate year {year}")))
    }
}

impl PopulationStore for InMemoryStores {
    fn load_population_grid(&self, time_point: &str) -> Result<Grid<f32>> {
        self.population
            .get(time_point)
            .cloned()
            .ok_or_else(|| AggregationError::missing_input(format!("population grid {time_point}")))
    }
}

impl ClimateStore for InMemoryStores {
    type Series = InMemorySeries;

    fn load_climate_series(&self, scenario: &str, measure: &str, draw: &str) -> Result<InMemorySeries> {
        let tags = RunTags::new(scenario, measure, draw);
        self.climate
            .get(&tags)
            .map(|years| InMemorySeries { years: years.clone() })
            .ok_or_else(|| AggregationError::missing_input(format!("climate series {tags}")))
    }
}

impl ShapeStore for InMemoryStores {
    fn load_administrative_shapes(&self, spec: &ShapeHierarchySpec) -> Result<Vec<LocationShape>> {
        let shapes = self
            .shapes
            .get(&spec.name)
            .cloned()
            .ok_or_else(|| AggregationError::missing_input(format!("shapes for {}", spec.name)))?;
        match &spec.source {
            ShapeSourceKind::MostDetailedShapes => Ok(shapes),
            ShapeSourceKind::JoinedLocations { locations_table } => {
                let locations = self.locations.get(locations_table).ok_or_else(|| {
                    AggregationError::missing_input(format!("location table {locations_table}"))
                })?;
                let most_detailed: BTreeSet<_> = locations.most_detailed().into_iter().collect();
                Ok(join_most_detailed(shapes, &most_detailed))
            }
        }
    }
}

impl HierarchyStore for InMemoryStores {
    fn load_hierarchy_table(&self, name: &str) -> Result<HierarchyTable> {
        self.hierarchies
            .get(name)
            .cloned()
            .ok_or_else(|| AggregationError::missing_input(format!("hierarchy table {name}")))
    }
}

/// Partitions staged against [`InMemoryStores`].
#[derive(Debug)]
pub struct InMemoryBatch {
    target: Arc<Mutex<InMemoryResults>>,
    version: String,
    staged: InMemoryResults,
}

impl ResultStore for InMemoryStores {
    type Batch = InMemoryBatch;

    fn begin(&self, version: &str) -> Result<InMemoryBatch> {
        Ok(InMemoryBatch {
            target: Arc::clone(&self.results),
            version: version.to_string(),
            staged: InMemoryResults::default(),
        })
    }
}

impl ResultBatch for InMemoryBatch {
    fn save_raw_table(&mut self, hierarchy: &str, tags: &RunTags, table: &[DetailedRecord]) -> Result<()> {
        self.staged
            .raw
            .insert((self.version.clone(), hierarchy.to_string(), tags.clone()), table.to_vec());
        Ok(())
    }

    fn save_detailed_table(&mut self, hierarchy: &str, tags: &RunTags, table: &[AggregateRecord]) -> Result<()> {
        self.staged
            .detailed
            .insert((self.version.clone(), hierarchy.to_string(), tags.clone()), table.to_vec());
        Ok(())
    }

    fn save_population_table(&mut self, hierarchy: &str, table: &[PopulationRecord]) -> Result<()> {
        self.staged
            .population
            .insert((self.version.clone(), hierarchy.to_string()), table.to_vec());
        Ok(())
    }

    fn commit(self) -> Result<()> {
        let mut results = lock_results(&self.target);
        results.raw.extend(self.staged.raw);
        results.detailed.extend(self.staged.detailed);
        results.population.extend(self.staged.population);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HierarchyNode;
    use geo::MultiPolygon;

    fn loc(id: u32, most_detailed: bool) -> HierarchyNode {
        HierarchyNode {
            location_id: id,
            parent_id: Some(1),
            level: if id == 1 { 0 } else { 1 },
            location_name: None,
            most_detailed,
        }
    }

    #[test]
    fn test_join_keeps_most_detailed_only() {
        let locations = HierarchyTable::from_nodes(vec![loc(1, false), loc(2, true), loc(3, false)]).unwrap();
        let shapes = vec![
            LocationShape::new(1, MultiPolygon(vec![])),
            LocationShape::new(2, MultiPolygon(vec![])),
            LocationShape::new(3, MultiPolygon(vec![])),
            LocationShape::new(4, MultiPolygon(vec![])),
        ];
        let most_detailed: BTreeSet<_> = locations.most_detailed().into_iter().collect();
        let kept: Vec<u32> = join_most_detailed(shapes, &most_detailed)
            .iter()
            .map(|s| s.location_id)
            .collect();
        assert_eq!(kept, vec![2]);
    }

    #[test]
    fn test_batch_is_invisible_until_commit() {
        let stores = InMemoryStores::new();
        let tags = RunTags::new("ssp126", "mean_temperature", "000");
        let mut batch = stores.begin("v1").unwrap();
        batch.save_detailed_table("gbd_2021", &tags, &[]).unwrap();
        batch.save_population_table("gbd_2021", &[]).unwrap();
        assert!(stores.results().detailed.is_empty());

        batch.commit().unwrap();
        let results = stores.results();
        assert!(results.detailed.contains_key(&("v1".to_string(), "gbd_2021".to_string(), tags)));
        assert!(results.population.contains_key(&("v1".to_string(), "gbd_2021".to_string())));
    }

    #[test]
    fn test_dropped_batch_writes_nothing() {
        let stores = InMemoryStores::new();
        {
            let mut batch = stores.begin("v1").unwrap();
            batch
                .save_raw_table("lsae_1209", &RunTags::new("ssp126", "mean_temperature", "000"), &[])
                .unwrap();
        }
        assert!(stores.results().raw.is_empty());
    }

    #[test]
    fn test_missing_inputs() {
        let stores = InMemoryStores::new();
        assert!(matches!(
            stores.load_population_grid("2020q1"),
            Err(AggregationError::MissingInput(_))
        ));
        assert!(stores.load_climate_series("a", "b", "c").is_err());
        assert!(stores.load_hierarchy_table("gbd_2021").is_err());
        assert!(stores
            .load_administrative_shapes(&ShapeHierarchySpec::most_detailed("lsae_1209"))
            .is_err());
    }
}
