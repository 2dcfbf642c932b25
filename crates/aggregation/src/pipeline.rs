//! The per-unit orchestrator.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{check_version, AggregationConfig, ShapeHierarchySpec};
use crate::error::{AggregationError, Result};
use crate::hierarchy::{aggregate_hierarchy, aggregate_population, population_records};
use crate::rasterize::{rasterize, LocationMasks};
use crate::reduce::reduce_locations;
use crate::resample::resample_to_grid;
use crate::store::{
    ClimateSeries, ClimateStore, HierarchyStore, PopulationStore, ResultBatch, ResultStore,
    ShapeStore,
};
use crate::types::{AggregateRecord, DetailedRecord, HierarchyTable, PopulationRecord, RunTags};

/// The stores an [`Aggregator`] reads from and writes to.
#[derive(Debug, Clone)]
pub struct Stores<P, C, S, H, R> {
    pub population: P,
    pub climate: C,
    pub shapes: S,
    pub hierarchies: H,
    pub results: R,
}

impl<'a, T> Stores<&'a T, &'a T, &'a T, &'a T, &'a T> {
    /// Use one value for all five roles.
    pub fn shared(store: &'a T) -> Self {
        Self {
            population: store,
            climate: store,
            shapes: store,
            hierarchies: store,
            results: store,
        }
    }
}

/// What one shape hierarchy produced in a unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HierarchySummary {
    pub shape_hierarchy: String,
    pub locations: usize,
    pub empty_windows: usize,
    pub detailed_records: usize,
    /// Records written per output hierarchy.
    pub outputs: BTreeMap<String, usize>,
    /// Population records written per output hierarchy, when this unit is the
    /// population reference.
    pub population_outputs: BTreeMap<String, usize>,
}

/// What a call to [`Aggregator::run_unit`] did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub version: String,
    pub tags: RunTags,
    pub years: usize,
    pub hierarchies: Vec<HierarchySummary>,
}

/// Computed results for one shape hierarchy, held until everything succeeded.
struct HierarchyResults {
    spec: ShapeHierarchySpec,
    locations: usize,
    empty_windows: usize,
    detailed: Vec<DetailedRecord>,
    outputs: Vec<(String, Vec<AggregateRecord>, Option<Vec<PopulationRecord>>)>,
}

/// Runs one (scenario, measure, draw) unit over every configured hierarchy.
pub struct Aggregator<P, C, S, H, R> {
    config: AggregationConfig,
    stores: Stores<P, C, S, H, R>,
}

impl<P, C, S, H, R> Aggregator<P, C, S, H, R>
where
    P: PopulationStore,
    C: ClimateStore,
    S: ShapeStore,
    H: HierarchyStore,
    R: ResultStore,
{
    /// Create an aggregator, validating the configuration.
    pub fn new(config: AggregationConfig, stores: Stores<P, C, S, H, R>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, stores })
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    /// Rasterize the shapes behind `hierarchy` onto the template population grid.
    ///
    /// `hierarchy` may name a shape hierarchy or any of its outputs.
    pub fn build_location_masks(&self, hierarchy: &str) -> Result<LocationMasks> {
        let spec = self.config.resolve_hierarchy(hierarchy)?;
        self.masks_for(spec)
    }

    fn masks_for(&self, spec: &ShapeHierarchySpec) -> Result<LocationMasks> {
        let template = self
            .stores
            .population
            .load_population_grid(&self.config.template_time_point)?;
        let shapes = self.stores.shapes.load_administrative_shapes(spec)?;
        info!(
            hierarchy = %spec.name,
            shapes = shapes.len(),
            width = template.width(),
            height = template.height(),
            "Rasterizing shapes"
        );
        rasterize(&template, &shapes, self.config.pixel_buffer)
    }

    /// Compute and persist every hierarchy for one unit of work.
    ///
    /// Every partition of the unit is staged in one result batch, which is
    /// committed only after all hierarchies were computed and staged. Each
    /// commit replaces the previous partitions, so re-running a unit is safe.
    pub fn run_unit(&self, version: &str, scenario: &str, measure: &str, draw: &str) -> Result<RunSummary> {
        let start = Instant::now();
        check_version(version)?;
        let tags = RunTags::new(scenario, measure, draw);
        self.config.check_tags(&tags)?;
        let write_population = self.config.is_population_reference(&tags);

        info!(version, %tags, write_population, "Starting aggregation unit");

        let series = self
            .stores
            .climate
            .load_climate_series(scenario, measure, draw)?;
        let available = series.years();
        if let Some(missing) = self.config.years.iter().find(|y| !available.contains(y)) {
            return Err(AggregationError::missing_input(format!(
                "climate series {tags} has no data for year {missing}"
            )));
        }

        // Load every hierarchy table up front so a bad table fails before any
        // grid work.
        let mut tables: BTreeMap<&str, HierarchyTable> = BTreeMap::new();
        for output in self.config.output_hierarchies() {
            tables.insert(output, self.stores.hierarchies.load_hierarchy_table(output)?);
        }

        let mut computed = Vec::with_capacity(self.config.shape_hierarchies.len());
        for spec in &self.config.shape_hierarchies {
            computed.push(self.compute_hierarchy(spec, &series, &tags, &tables, write_population)?);
        }

        let mut batch = self.stores.results.begin(version)?;
        let mut summaries = Vec::with_capacity(computed.len());
        for result in computed {
            summaries.push(stage(&mut batch, &tags, result)?);
        }
        batch.commit()?;

        info!(
            version,
            %tags,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Finished aggregation unit"
        );

        Ok(RunSummary {
            version: version.to_string(),
            tags,
            years: self.config.years.len(),
            hierarchies: summaries,
        })
    }

    fn compute_hierarchy(
        &self,
        spec: &ShapeHierarchySpec,
        series: &C::Series,
        tags: &RunTags,
        tables: &BTreeMap<&str, HierarchyTable>,
        write_population: bool,
    ) -> Result<HierarchyResults> {
        let masks = self.masks_for(spec)?;
        let empty_windows = masks.windows.values().filter(|w| w.is_empty()).count();
        if empty_windows > 0 {
            warn!(hierarchy = %spec.name, empty_windows, "Locations with empty windows");
        }

        let mut detailed = Vec::with_capacity(masks.windows.len() * self.config.years.len());
        for year in self.config.years.iter() {
            let time_point = self.config.population_time_point(year);
            let population = self.stores.population.load_population_grid(&time_point)?;
            let climate = series.load_year(year)?;
            let resampled = resample_to_grid(&climate, &population)?;
            let records = reduce_locations(&population, &resampled, &masks, year, tags)?;
            debug!(
                hierarchy = %spec.name,
                year,
                climate_cells = resampled.valid_count(),
                records = records.len(),
                "Reduced year"
            );
            detailed.extend(records);
        }

        let mut outputs = Vec::with_capacity(spec.outputs.len());
        for output in &spec.outputs {
            let table = tables
                .get(output.as_str())
                .ok_or_else(|| AggregationError::UnknownHierarchy(output.clone()))?;
            let aggregated = aggregate_hierarchy(&detailed, table)?;
            let population = if write_population {
                Some(aggregate_population(&population_records(&detailed)?, table)?)
            } else {
                None
            };
            info!(
                hierarchy = %output,
                records = aggregated.len(),
                "Aggregated hierarchy"
            );
            outputs.push((output.clone(), aggregated, population));
        }

        Ok(HierarchyResults {
            spec: spec.clone(),
            locations: masks.windows.len(),
            empty_windows,
            detailed,
            outputs,
        })
    }
}

fn stage<B: ResultBatch>(batch: &mut B, tags: &RunTags, result: HierarchyResults) -> Result<HierarchySummary> {
    batch.save_raw_table(&result.spec.name, tags, &result.detailed)?;

    let mut outputs = BTreeMap::new();
    let mut population_outputs = BTreeMap::new();
    for (name, aggregated, population) in &result.outputs {
        batch.save_detailed_table(name, tags, aggregated)?;
        outputs.insert(name.clone(), aggregated.len());
        if let Some(population) = population {
            batch.save_population_table(name, population)?;
            population_outputs.insert(name.clone(), population.len());
        }
    }

    Ok(HierarchySummary {
        shape_hierarchy: result.spec.name,
        locations: result.locations,
        empty_windows: result.empty_windows,
        detailed_records: result.detailed.len(),
        outputs,
        population_outputs,
    })
}
