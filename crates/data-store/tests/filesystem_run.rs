//! Full aggregation units against the on-disk stores.

use aggregation::{AggregationError, Aggregator, RunTags};
use data_store::{
    filesystem_stores, read_climate_table, read_grid, read_population_table, CsvResultStore,
    ZarrGridWriter,
};
use test_utils::world::{DISTRICTS, ROOT, START_YEAR};
use test_utils::SyntheticWorld;

const VERSION: &str = "2024_10_01";

fn run(world: &SyntheticWorld, scenario: &str, draw: &str) {
    let aggregator = Aggregator::new(world.config.clone(), filesystem_stores(&world.paths)).unwrap();
    aggregator
        .run_unit(VERSION, scenario, "mean_temperature", draw)
        .unwrap();
}

#[test]
fn unit_writes_every_partition() {
    let world = SyntheticWorld::build().unwrap();
    run(&world, "ssp245", "001");
    let tags = RunTags::new("ssp245", "mean_temperature", "001");

    for hierarchy in ["gbd_2021", "lsae_1209"] {
        let raw = read_climate_table(&world.paths.raw_results(VERSION, hierarchy, &tags)).unwrap();
        assert_eq!(raw.len(), DISTRICTS.len() * 2, "{hierarchy}");
    }

    for hierarchy in ["gbd_2021", "fhs_2021", "lsae_1209"] {
        let table = read_climate_table(&world.paths.results(VERSION, hierarchy, &tags)).unwrap();
        for year in [2020, 2021] {
            for &district in &DISTRICTS {
                let row = table
                    .iter()
                    .find(|r| r.location_id == district && r.year == year)
                    .unwrap();
                let expected = SyntheticWorld::district_value(district, year, &tags).unwrap();
                assert_eq!(row.value, expected);
                assert_eq!(row.population, SyntheticWorld::district_population(year));
            }
            let root = table
                .iter()
                .find(|r| r.location_id == ROOT && r.year == year)
                .unwrap();
            let mean: f64 = DISTRICTS
                .iter()
                .map(|&d| SyntheticWorld::district_value(d, year, &tags).unwrap())
                .sum::<f64>()
                / 4.0;
            assert!((root.value - mean).abs() < 1e-9);
            assert_eq!(root.population, 4.0 * SyntheticWorld::district_population(year));
        }
    }

    // Draw 001 is not the population reference.
    assert!(!world.paths.population_results(VERSION, "gbd_2021").exists());
}

#[test]
fn fhs_regroups_the_same_districts() {
    let world = SyntheticWorld::build().unwrap();
    run(&world, "ssp126", "000");
    let tags = RunTags::new("ssp126", "mean_temperature", "000");
    let table = read_climate_table(&world.paths.results(VERSION, "fhs_2021", &tags)).unwrap();

    // West region 30 holds districts 11 (1.0) and 21 (3.0).
    let west = table
        .iter()
        .find(|r| r.location_id == 30 && r.year == START_YEAR)
        .unwrap();
    assert_eq!(west.value, 2.0);
    assert!(table.iter().all(|r| r.location_id != 10 && r.location_id != 20));
}

#[test]
fn population_reference_writes_population() {
    let world = SyntheticWorld::build().unwrap();
    run(&world, "ssp126", "000");
    for hierarchy in ["gbd_2021", "fhs_2021", "lsae_1209"] {
        let population = read_population_table(&world.paths.population_results(VERSION, hierarchy)).unwrap();
        let root_2021 = population
            .iter()
            .find(|r| r.location_id == ROOT && r.year == 2021)
            .unwrap();
        assert_eq!(root_2021.population, 128.0);
    }
}

#[test]
fn rerun_produces_identical_files() {
    let world = SyntheticWorld::build().unwrap();
    let tags = RunTags::new("ssp245", "mean_temperature", "000");
    let path = world.paths.results(VERSION, "gbd_2021", &tags);

    run(&world, "ssp245", "000");
    let first = std::fs::read(&path).unwrap();
    run(&world, "ssp245", "000");
    let second = std::fs::read(&path).unwrap();
    assert_eq!(first, second);
}

#[test]
fn missing_population_year_is_missing_input() {
    let world = SyntheticWorld::build().unwrap();
    std::fs::remove_dir_all(world.paths.population_grid("2021q1")).unwrap();
    let aggregator = Aggregator::new(world.config.clone(), filesystem_stores(&world.paths)).unwrap();
    let err = aggregator
        .run_unit(VERSION, "ssp245", "mean_temperature", "000")
        .unwrap_err();
    assert!(matches!(err, AggregationError::MissingInput(_)));
    assert!(!world.paths.version_dir(VERSION).exists());
}

#[test]
fn compile_after_all_draws() {
    let world = SyntheticWorld::build().unwrap();
    run(&world, "ssp245", "000");
    run(&world, "ssp245", "001");

    let store = CsvResultStore::new(world.paths.clone());
    let summary = store
        .compile(VERSION, "lsae_1209", "ssp245", "mean_temperature")
        .unwrap();
    assert_eq!(summary.draws, 2);
    // 7 locations x 2 years x 2 draws
    assert_eq!(summary.records, 28);
    assert_eq!(
        summary.output,
        world.paths.compiled_results(VERSION, "lsae_1209", "ssp245", "mean_temperature")
    );
}

#[test]
fn masks_round_trip_through_zarr() {
    let world = SyntheticWorld::build().unwrap();
    let aggregator = Aggregator::new(world.config.clone(), filesystem_stores(&world.paths)).unwrap();
    let masks = aggregator.build_location_masks("lsae_1209").unwrap();
    assert_eq!(masks.windows.len(), 4);
    assert_eq!(masks.raster.get(0, 0), Some(11));
    assert_eq!(masks.raster.get(7, 7), Some(22));

    let path = world.paths.masks(VERSION, "lsae_1209");
    ZarrGridWriter::default()
        .write_u32_grid(&path, &masks.raster)
        .unwrap();
    let stored = read_grid::<u32>(&path).unwrap();
    assert_eq!(stored.data(), masks.raster.data());
    assert!(stored.transform().approx_eq(masks.raster.transform(), 1e-12));
    // Location rasters are UInt32; reading them as population grids must fail.
    assert!(read_grid::<f32>(&path).is_err());
}
