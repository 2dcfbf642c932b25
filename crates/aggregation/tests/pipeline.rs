//! End-to-end runs of the aggregator against in-memory stores.

use std::collections::BTreeMap;

use aggregation::{
    AggregateRecord, AggregationConfig, AggregationError, Aggregator, DetailedRecord, HierarchyNode,
    HierarchyTable, InMemoryBatch, InMemoryStores, LocationShape, PopulationRecord, ResultBatch,
    ResultStore, RunTags, ShapeHierarchySpec, Stores, YearRange,
};
use climate_common::{Crs, GeoArray, GeoTransform, Grid};
use test_utils::{hierarchy_node as node, square, unit_grid};

const VERSION: &str = "2024_test";

fn population_grid(value: f32) -> Grid<f32> {
    unit_grid(value, 4, 4)
}

/// 4x4 climate field: 2.0 in the north-west quarter, 3.0 in the south-east.
#[rustfmt::skip]
fn climate_field(offset: f32) -> GeoArray {
    let lat = vec![0.5, 1.5, 2.5, 3.5];
    let lon = vec![0.5, 1.5, 2.5, 3.5];
    let data = vec![
        0.0, 0.0, 3.0, 3.0,
        0.0, 0.0, 3.0, 3.0,
        2.0, 2.0, 0.0, 0.0,
        2.0, 2.0, 0.0, 0.0,
    ];
    GeoArray::new(lat, lon, data.into_iter().map(|v| v + offset).collect()).unwrap()
}

fn config() -> AggregationConfig {
    AggregationConfig {
        scenarios: vec!["ssp245".into()],
        measures: vec!["mean_temperature".into()],
        draws: vec!["000".into(), "001".into()],
        years: YearRange::new(2020, 2021),
        shape_hierarchies: vec![ShapeHierarchySpec::most_detailed("lsae_1209")],
        ..AggregationConfig::default()
    }
}

fn stores() -> InMemoryStores {
    let mut stores = InMemoryStores::new();
    stores.population.insert("2020q1".into(), population_grid(1.0));
    stores.population.insert("2021q1".into(), population_grid(1.0));

    for draw in ["000", "001"] {
        let mut years = BTreeMap::new();
        years.insert(2020, climate_field(0.0));
        years.insert(2021, climate_field(0.0));
        stores
            .climate
            .insert(RunTags::new("ssp245", "mean_temperature", draw), years);
    }

    stores.shapes.insert(
        "lsae_1209".into(),
        vec![
            LocationShape::new(1, square(0.0, 2.0, 2.0, 4.0)),
            LocationShape::new(2, square(2.0, 0.0, 4.0, 2.0)),
        ],
    );
    stores.hierarchies.insert(
        "lsae_1209".into(),
        HierarchyTable::from_nodes(vec![
            HierarchyNode {
                location_id: 0,
                parent_id: None,
                level: 0,
                location_name: Some("Root".into()),
                most_detailed: false,
            },
            node(1, 0, 1, true),
            node(2, 0, 1, true),
        ])
        .unwrap(),
    );
    stores
}

fn tags(draw: &str) -> RunTags {
    RunTags::new("ssp245", "mean_temperature", draw)
}

/// Results backed by in-memory stores whose aggregated tables cannot be saved.
struct DiskFull<'a>(&'a InMemoryStores);

struct DiskFullBatch(InMemoryBatch);

impl ResultStore for DiskFull<'_> {
    type Batch = DiskFullBatch;

    fn begin(&self, version: &str) -> aggregation::Result<DiskFullBatch> {
        Ok(DiskFullBatch(self.0.begin(version)?))
    }
}

impl ResultBatch for DiskFullBatch {
    fn save_raw_table(&mut self, hierarchy: &str, tags: &RunTags, table: &[DetailedRecord]) -> aggregation::Result<()> {
        self.0.save_raw_table(hierarchy, tags, table)
    }

    fn save_detailed_table(&mut self, _: &str, _: &RunTags, _: &[AggregateRecord]) -> aggregation::Result<()> {
        Err(AggregationError::storage("disk full"))
    }

    fn save_population_table(&mut self, hierarchy: &str, table: &[PopulationRecord]) -> aggregation::Result<()> {
        self.0.save_population_table(hierarchy, table)
    }

    fn commit(self) -> aggregation::Result<()> {
        self.0.commit()
    }
}

#[test]
fn two_locations_roll_up_to_root() {
    let stores = stores();
    let aggregator = Aggregator::new(config(), Stores::shared(&stores)).unwrap();
    let summary = aggregator
        .run_unit(VERSION, "ssp245", "mean_temperature", "000")
        .unwrap();

    assert_eq!(summary.years, 2);
    assert_eq!(summary.hierarchies[0].locations, 2);
    assert_eq!(summary.hierarchies[0].detailed_records, 4);
    assert_eq!(summary.hierarchies[0].outputs["lsae_1209"], 6);

    let results = stores.results();
    let key = (VERSION.to_string(), "lsae_1209".to_string(), tags("000"));
    let table = &results.detailed[&key];
    for year in [2020, 2021] {
        let get = |id: u32| {
            table
                .iter()
                .find(|r| r.location_id == id && r.year == year)
                .unwrap()
        };
        assert_eq!((get(1).weighted_climate, get(1).population, get(1).value), (8.0, 4.0, 2.0));
        assert_eq!((get(2).weighted_climate, get(2).population, get(2).value), (12.0, 4.0, 3.0));
        assert_eq!((get(0).weighted_climate, get(0).population, get(0).value), (20.0, 8.0, 2.5));
    }

    let raw = &results.raw[&key];
    assert_eq!(raw.len(), 4);
    assert!(raw.iter().all(|r| r.location_id != 0));
}

#[test]
fn location_outside_grid_is_nan_not_error() {
    let mut stores = stores();
    stores
        .shapes
        .get_mut("lsae_1209")
        .unwrap()
        .push(LocationShape::new(3, square(40.0, 40.0, 41.0, 41.0)));
    let hierarchy = HierarchyTable::from_nodes(vec![
        node(0, 0, 0, false),
        node(1, 0, 1, true),
        node(2, 0, 1, true),
        node(3, 0, 1, true),
    ])
    .unwrap();
    stores.hierarchies.insert("lsae_1209".into(), hierarchy);

    let aggregator = Aggregator::new(config(), Stores::shared(&stores)).unwrap();
    let summary = aggregator
        .run_unit(VERSION, "ssp245", "mean_temperature", "000")
        .unwrap();
    assert_eq!(summary.hierarchies[0].empty_windows, 1);

    let results = stores.results();
    let table = &results.detailed[&(VERSION.to_string(), "lsae_1209".to_string(), tags("000"))];
    let outside = table.iter().find(|r| r.location_id == 3).unwrap();
    assert_eq!(outside.population, 0.0);
    assert_eq!(outside.weighted_climate, 0.0);
    assert!(outside.value.is_nan());
    let root = table.iter().find(|r| r.location_id == 0).unwrap();
    assert_eq!(root.value, 2.5);
}

#[test]
fn population_is_written_by_reference_unit_only() {
    let stores = stores();
    let aggregator = Aggregator::new(config(), Stores::shared(&stores)).unwrap();

    let other = aggregator
        .run_unit(VERSION, "ssp245", "mean_temperature", "001")
        .unwrap();
    assert!(other.hierarchies[0].population_outputs.is_empty());
    assert!(stores.results().population.is_empty());

    aggregator
        .run_unit(VERSION, "ssp245", "mean_temperature", "000")
        .unwrap();
    let results = stores.results();
    let population = &results.population[&(VERSION.to_string(), "lsae_1209".to_string())];
    assert_eq!(population.len(), 6);
    let root_2020 = population
        .iter()
        .find(|r| r.location_id == 0 && r.year == 2020)
        .unwrap();
    assert_eq!(root_2020.population, 8.0);
}

#[test]
fn rerun_is_identical() {
    let stores = stores();
    let aggregator = Aggregator::new(config(), Stores::shared(&stores)).unwrap();
    aggregator
        .run_unit(VERSION, "ssp245", "mean_temperature", "000")
        .unwrap();
    let first = format!("{:?}", stores.results().detailed);
    aggregator
        .run_unit(VERSION, "ssp245", "mean_temperature", "000")
        .unwrap();
    let second = format!("{:?}", stores.results().detailed);
    assert_eq!(first, second);
}

#[test]
fn unknown_tags_fail_before_any_write() {
    let stores = stores();
    let aggregator = Aggregator::new(config(), Stores::shared(&stores)).unwrap();
    let err = aggregator
        .run_unit(VERSION, "ssp999", "mean_temperature", "000")
        .unwrap_err();
    assert!(matches!(err, AggregationError::UnknownTag { kind: "scenario", .. }));
    assert!(stores.results().raw.is_empty());
}

#[test]
fn missing_climate_year_fails_before_any_write() {
    let mut stores = stores();
    stores
        .climate
        .get_mut(&tags("000"))
        .unwrap()
        .remove(&2021);
    let aggregator = Aggregator::new(config(), Stores::shared(&stores)).unwrap();
    let err = aggregator
        .run_unit(VERSION, "ssp245", "mean_temperature", "000")
        .unwrap_err();
    assert!(matches!(err, AggregationError::MissingInput(_)));
    assert!(stores.results().raw.is_empty());
}

#[test]
fn misaligned_population_year_is_fatal() {
    let mut stores = stores();
    stores.population.insert(
        "2021q1".into(),
        Grid::filled(1.0, 2, 2, GeoTransform::north_up(0.0, 4.0, 2.0, 2.0), Crs::wgs84()),
    );
    let aggregator = Aggregator::new(config(), Stores::shared(&stores)).unwrap();
    let err = aggregator
        .run_unit(VERSION, "ssp245", "mean_temperature", "000")
        .unwrap_err();
    assert!(matches!(err, AggregationError::Misaligned(_)));
    assert!(stores.results().detailed.is_empty());
}

#[test]
fn joined_source_rasterizes_most_detailed_only() {
    let mut stores = stores();
    let shapes = stores.shapes.remove("lsae_1209").unwrap();
    let mut gbd_shapes = shapes.clone();
    // A country outline covering both districts must not be burned.
    gbd_shapes.push(LocationShape::new(10, square(0.0, 0.0, 4.0, 4.0)).with_priority(5));
    stores.shapes.insert("gbd_2021".into(), gbd_shapes);

    let locations = HierarchyTable::from_nodes(vec![
        node(10, 10, 0, false),
        node(1, 10, 1, true),
        node(2, 10, 1, true),
    ])
    .unwrap();
    stores.locations.insert("gbd_2021".into(), locations.clone());
    stores.hierarchies.insert("gbd_2021".into(), locations);
    // The forecasting hierarchy groups the same districts differently.
    stores.hierarchies.insert(
        "fhs_2021".into(),
        HierarchyTable::from_nodes(vec![
            node(20, 20, 0, false),
            node(21, 20, 1, false),
            node(1, 21, 2, true),
            node(2, 20, 1, true),
        ])
        .unwrap(),
    );

    let mut config = config();
    config.shape_hierarchies = vec![ShapeHierarchySpec::joined(
        "gbd_2021",
        "gbd_2021",
        vec!["gbd_2021".into(), "fhs_2021".into()],
    )];
    let aggregator = Aggregator::new(config, Stores::shared(&stores)).unwrap();

    let masks = aggregator.build_location_masks("fhs_2021").unwrap();
    assert!(!masks.windows.contains_key(&10));
    assert_eq!(masks.raster.get(0, 0), Some(1));

    aggregator
        .run_unit(VERSION, "ssp245", "mean_temperature", "000")
        .unwrap();
    let results = stores.results();
    let fhs = &results.detailed[&(VERSION.to_string(), "fhs_2021".to_string(), tags("000"))];
    let get = |id: u32| fhs.iter().find(|r| r.location_id == id && r.year == 2020).unwrap();
    assert_eq!(get(21).weighted_climate, 8.0);
    assert_eq!(get(20).population, 8.0);
    assert_eq!(get(20).value, 2.5);

    let gbd = &results.detailed[&(VERSION.to_string(), "gbd_2021".to_string(), tags("000"))];
    assert_eq!(gbd.iter().filter(|r| r.location_id == 10).count(), 2);
}

#[test]
fn unknown_hierarchy_is_rejected() {
    let stores = stores();
    let aggregator = Aggregator::new(config(), Stores::shared(&stores)).unwrap();
    assert!(matches!(
        aggregator.build_location_masks("gbd_2019"),
        Err(AggregationError::UnknownHierarchy(_))
    ));
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    let stores = stores();
    let mut config = config();
    config.draws.clear();
    assert!(matches!(
        Aggregator::new(config, Stores::shared(&stores)),
        Err(AggregationError::InvalidConfig(_))
    ));
}

#[test]
fn failed_save_leaves_no_partial_results() {
    let stores = stores();
    let aggregator = Aggregator::new(
        config(),
        Stores {
            population: &stores,
            climate: &stores,
            shapes: &stores,
            hierarchies: &stores,
            results: DiskFull(&stores),
        },
    )
    .unwrap();

    let err = aggregator
        .run_unit(VERSION, "ssp245", "mean_temperature", "000")
        .unwrap_err();
    assert!(matches!(err, AggregationError::Storage(_)));

    let results = stores.results();
    assert!(results.raw.is_empty());
    assert!(results.detailed.is_empty());
    assert!(results.population.is_empty());
}

#[test]
fn version_must_be_a_plain_directory_name() {
    let stores = stores();
    let aggregator = Aggregator::new(config(), Stores::shared(&stores)).unwrap();
    let err = aggregator
        .run_unit("../elsewhere", "ssp245", "mean_temperature", "000")
        .unwrap_err();
    assert!(matches!(err, AggregationError::InvalidVersion(_)));
    assert!(stores.results().raw.is_empty());
}
