//! On-disk layout of inputs and outputs.

use std::path::{Path, PathBuf};

use aggregation::RunTags;
use serde::{Deserialize, Serialize};

/// Root directories for every store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataPaths {
    pub population_dir: PathBuf,
    pub climate_dir: PathBuf,
    pub shape_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for DataPaths {
    fn default() -> Self {
        Self {
            population_dir: PathBuf::from("data/population"),
            climate_dir: PathBuf::from("data/climate"),
            shape_dir: PathBuf::from("data/shapes"),
            output_dir: PathBuf::from("data/output"),
        }
    }
}

impl DataPaths {
    /// All four roots under one directory.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            population_dir: root.join("population"),
            climate_dir: root.join("climate"),
            shape_dir: root.join("shapes"),
            output_dir: root.join("output"),
        }
    }

    pub fn population_grid(&self, time_point: &str) -> PathBuf {
        self.population_dir.join(format!("{time_point}.zarr"))
    }

    pub fn climate_series(&self, scenario: &str, measure: &str, draw: &str) -> PathBuf {
        self.climate_dir
            .join(scenario)
            .join(measure)
            .join(format!("{draw}.zarr"))
    }

    pub fn shapes(&self, hierarchy: &str) -> PathBuf {
        self.shape_dir.join("shapes").join(format!("{hierarchy}.geojson"))
    }

    pub fn locations(&self, table: &str) -> PathBuf {
        self.shape_dir.join("locations").join(format!("{table}.csv"))
    }

    pub fn hierarchy(&self, hierarchy: &str) -> PathBuf {
        self.shape_dir.join("hierarchies").join(format!("{hierarchy}.csv"))
    }

    pub fn version_dir(&self, version: &str) -> PathBuf {
        self.output_dir.join(version)
    }

    pub fn raw_results(&self, version: &str, hierarchy: &str, tags: &RunTags) -> PathBuf {
        self.version_dir(version)
            .join("raw-results")
            .join(hierarchy)
            .join(&tags.scenario)
            .join(&tags.measure)
            .join(format!("{}.csv", tags.draw))
    }

    /// Directory holding one CSV per draw for a (hierarchy, scenario, measure).
    pub fn measure_results_dir(&self, version: &str, hierarchy: &str, scenario: &str, measure: &str) -> PathBuf {
        self.version_dir(version)
            .join("results")
            .join(hierarchy)
            .join(scenario)
            .join(measure)
    }

    pub fn results(&self, version: &str, hierarchy: &str, tags: &RunTags) -> PathBuf {
        self.measure_results_dir(version, hierarchy, &tags.scenario, &tags.measure)
            .join(format!("{}.csv", tags.draw))
    }

    pub fn population_results(&self, version: &str, hierarchy: &str) -> PathBuf {
        self.version_dir(version)
            .join("results")
            .join(hierarchy)
            .join("population.csv")
    }

    pub fn compiled_results(&self, version: &str, hierarchy: &str, scenario: &str, measure: &str) -> PathBuf {
        self.version_dir(version)
            .join("results")
            .join(hierarchy)
            .join(format!("{measure}_{scenario}.csv"))
    }

    pub fn masks(&self, version: &str, hierarchy: &str) -> PathBuf {
        self.version_dir(version)
            .join("masks")
            .join(format!("{hierarchy}.zarr"))
    }

    pub fn logs(&self, step: &str) -> PathBuf {
        self.output_dir.join("logs").join(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let paths = DataPaths::under("/data");
        let tags = RunTags::new("ssp245", "mean_temperature", "007");
        assert_eq!(
            paths.population_grid("2020q1"),
            PathBuf::from("/data/population/2020q1.zarr")
        );
        assert_eq!(
            paths.climate_series("ssp245", "mean_temperature", "007"),
            PathBuf::from("/data/climate/ssp245/mean_temperature/007.zarr")
        );
        assert_eq!(
            paths.raw_results("v1", "gbd_2021", &tags),
            PathBuf::from("/data/output/v1/raw-results/gbd_2021/ssp245/mean_temperature/007.csv")
        );
        assert_eq!(
            paths.results("v1", "fhs_2021", &tags),
            PathBuf::from("/data/output/v1/results/fhs_2021/ssp245/mean_temperature/007.csv")
        );
        assert_eq!(
            paths.compiled_results("v1", "fhs_2021", "ssp245", "mean_temperature"),
            PathBuf::from("/data/output/v1/results/fhs_2021/mean_temperature_ssp245.csv")
        );
        assert_eq!(
            paths.population_results("v1", "lsae_1209"),
            PathBuf::from("/data/output/v1/results/lsae_1209/population.csv")
        );
        assert_eq!(paths.locations("gbd_2021"), PathBuf::from("/data/shapes/locations/gbd_2021.csv"));
        assert_eq!(paths.masks("v1", "lsae_1285"), PathBuf::from("/data/output/v1/masks/lsae_1285.zarr"));
        assert_eq!(paths.logs("aggregate"), PathBuf::from("/data/output/logs/aggregate"));
    }
}
