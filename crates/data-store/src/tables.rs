//! CSV hierarchy tables and result partitions.

use std::path::{Path, PathBuf};

use aggregation::{
    compile_draws, AggregateRecord, ClimateRecord, DetailedRecord, HierarchyNode, HierarchyStore,
    HierarchyTable, LocationId, PopulationRecord, ResultBatch, ResultStore, RunTags,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{require_exists, Result, StoreError};
use crate::paths::DataPaths;

/// Column order of climate result tables.
pub const CLIMATE_COLUMNS: [&str; 8] = [
    "location_id",
    "year",
    "scenario",
    "measure",
    "draw",
    "weighted_climate",
    "population",
    "value",
];

/// Column order of population result tables.
pub const POPULATION_COLUMNS: [&str; 3] = ["location_id", "year", "population"];

/// Accept `1`/`0`, `true`/`false` and blanks (false) for boolean columns.
pub(crate) fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(false),
        Some(v) if v == "1" || v.eq_ignore_ascii_case("true") => Ok(true),
        Some(v) if v == "0" || v.eq_ignore_ascii_case("false") => Ok(false),
        Some(v) => Err(serde::de::Error::custom(format!("invalid flag '{v}'"))),
    }
}

/// Deserialize every row of a CSV file with headers.
pub fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    require_exists(path)?;
    let mut reader = csv::Reader::from_path(path).map_err(|e| StoreError::csv(path, e))?;
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<T>, _>>()
        .map_err(|e| StoreError::csv(path, e))
}

/// Write `rows` under `columns` to `path`, replacing it atomically.
///
/// Rows go to a temporary file in the destination directory which is then
/// renamed over `path`, so readers never see a partial table.
pub fn write_rows<T: Serialize>(path: &Path, columns: &[&str], rows: &[T]) -> Result<()> {
    let tmp = stage_rows(path, columns, rows)?;
    tmp.persist(path).map_err(|e| StoreError::io(path, e.error))?;
    debug!(path = %path.display(), rows = rows.len(), "Wrote table");
    Ok(())
}

/// Write `rows` to a temporary file beside `path`, without touching `path`.
///
/// The file is removed when dropped unless it is persisted.
pub fn stage_rows<T: Serialize>(path: &Path, columns: &[&str], rows: &[T]) -> Result<NamedTempFile> {
    let dir = path
        .parent()
        .ok_or_else(|| StoreError::csv(path, "path has no parent directory"))?;
    std::fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(tmp.as_file_mut());
        writer.write_record(columns).map_err(|e| StoreError::csv(path, e))?;
        for row in rows {
            writer.serialize(row).map_err(|e| StoreError::csv(path, e))?;
        }
        writer.flush().map_err(|e| StoreError::io(path, e))?;
    }
    tmp.as_file().sync_all().map_err(|e| StoreError::io(path, e))?;
    Ok(tmp)
}

pub fn read_climate_table(path: &Path) -> Result<Vec<ClimateRecord>> {
    read_rows(path)
}

pub fn read_population_table(path: &Path) -> Result<Vec<PopulationRecord>> {
    read_rows(path)
}

#[derive(Debug, Deserialize)]
struct HierarchyRow {
    location_id: LocationId,
    parent_id: Option<LocationId>,
    level: u32,
    #[serde(default)]
    location_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    most_detailed: bool,
}

/// Read `location_id,parent_id,level[,location_name,most_detailed]`.
pub fn read_hierarchy(path: &Path) -> Result<HierarchyTable> {
    let rows: Vec<HierarchyRow> = read_rows(path)?;
    let nodes = rows.into_iter().map(|r| HierarchyNode {
        location_id: r.location_id,
        parent_id: r.parent_id,
        level: r.level,
        location_name: r.location_name.filter(|n| !n.is_empty()),
        most_detailed: r.most_detailed,
    });
    Ok(HierarchyTable::from_nodes(nodes)?)
}

/// Hierarchy tables under `<shape_dir>/hierarchies/`.
#[derive(Debug, Clone)]
pub struct CsvHierarchyStore {
    paths: DataPaths,
}

impl CsvHierarchyStore {
    pub fn new(paths: DataPaths) -> Self {
        Self { paths }
    }
}

impl HierarchyStore for CsvHierarchyStore {
    fn load_hierarchy_table(&self, name: &str) -> aggregation::Result<HierarchyTable> {
        let table = read_hierarchy(&self.paths.hierarchy(name))?;
        debug!(hierarchy = name, locations = table.len(), levels = table.max_level() + 1, "Loaded hierarchy");
        Ok(table)
    }
}

/// Outcome of compiling per-draw partitions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompileSummary {
    pub output: PathBuf,
    pub draws: usize,
    pub records: usize,
}

/// CSV result partitions under `<output_dir>/<version>/`.
#[derive(Debug, Clone)]
pub struct CsvResultStore {
    paths: DataPaths,
}

impl CsvResultStore {
    pub fn new(paths: DataPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    /// Per-draw partitions for one (hierarchy, scenario, measure), sorted by path.
    pub fn draw_partitions(&self, version: &str, hierarchy: &str, scenario: &str, measure: &str) -> Result<Vec<PathBuf>> {
        let dir = self.paths.measure_results_dir(version, hierarchy, scenario, measure);
        require_exists(&dir)?;
        let mut partitions = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| StoreError::io(&dir, e.into()))?;
            let path = entry.path();
            if entry.file_type().is_file() && path.extension().is_some_and(|e| e == "csv") {
                partitions.push(path.to_path_buf());
            }
        }
        partitions.sort();
        Ok(partitions)
    }

    /// Combine every draw partition into `<measure>_<scenario>.csv`.
    pub fn compile(&self, version: &str, hierarchy: &str, scenario: &str, measure: &str) -> Result<CompileSummary> {
        let partitions = self.draw_partitions(version, hierarchy, scenario, measure)?;
        let tables = partitions
            .iter()
            .map(|p| read_climate_table(p))
            .collect::<Result<Vec<_>>>()?;
        let compiled = compile_draws(tables)?;

        let output = self.paths.compiled_results(version, hierarchy, scenario, measure);
        write_rows(&output, &CLIMATE_COLUMNS, &compiled)?;
        info!(
            output = %output.display(),
            draws = partitions.len(),
            records = compiled.len(),
            "Compiled draws"
        );
        Ok(CompileSummary {
            output,
            draws: partitions.len(),
            records: compiled.len(),
        })
    }
}

/// Tables staged as temporary files beside their destinations.
///
/// Committing renames each one into place. Dropping the batch removes them.
#[derive(Debug)]
pub struct CsvResultBatch {
    paths: DataPaths,
    version: String,
    staged: Vec<(PathBuf, NamedTempFile)>,
}

impl CsvResultBatch {
    fn stage<T: Serialize>(&mut self, path: PathBuf, columns: &[&str], rows: &[T]) -> aggregation::Result<()> {
        let tmp = stage_rows(&path, columns, rows)?;
        self.staged.push((path, tmp));
        Ok(())
    }
}

impl ResultStore for CsvResultStore {
    type Batch = CsvResultBatch;

    fn begin(&self, version: &str) -> aggregation::Result<CsvResultBatch> {
        aggregation::check_version(version)?;
        Ok(CsvResultBatch {
            paths: self.paths.clone(),
            version: version.to_string(),
            staged: Vec::new(),
        })
    }
}

impl ResultBatch for CsvResultBatch {
    fn save_raw_table(&mut self, hierarchy: &str, tags: &RunTags, table: &[DetailedRecord]) -> aggregation::Result<()> {
        let path = self.paths.raw_results(&self.version, hierarchy, tags);
        self.stage(path, &CLIMATE_COLUMNS, table)
    }

    fn save_detailed_table(&mut self, hierarchy: &str, tags: &RunTags, table: &[AggregateRecord]) -> aggregation::Result<()> {
        let path = self.paths.results(&self.version, hierarchy, tags);
        self.stage(path, &CLIMATE_COLUMNS, table)
    }

    fn save_population_table(&mut self, hierarchy: &str, table: &[PopulationRecord]) -> aggregation::Result<()> {
        let path = self.paths.population_results(&self.version, hierarchy);
        self.stage(path, &POPULATION_COLUMNS, table)
    }

    fn commit(self) -> aggregation::Result<()> {
        let tables = self.staged.len();
        for (path, tmp) in self.staged {
            tmp.persist(&path).map_err(|e| StoreError::io(&path, e.error))?;
            debug!(path = %path.display(), "Wrote table");
        }
        info!(version = %self.version, tables, "Committed results");
        Ok(())
    }
}
