//! Subcommand implementations.
//!
//! Every command writes its result to `out` as JSON lines so the binary can be
//! driven by a scheduler or a shell script. Logs go to stderr.

use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use aggregation::{check_version, AggregationError, Aggregator, RunSummary, RunTags};
use anyhow::{Context, Result};
use data_store::{
    filesystem_stores, CompileSummary, CsvHierarchyStore, CsvResultStore, GeoJsonShapeStore,
    ZarrClimateStore, ZarrGridWriter, ZarrPopulationStore,
};
use serde::Serialize;
use tracing::{error, info};

use crate::cli::Command;
use crate::config::ServiceConfig;
use crate::jobs::{job_matrix, Job, JobSelection};

/// Outcome of writing a location-ID raster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaskSummary {
    pub hierarchy: String,
    pub output: PathBuf,
    pub width: usize,
    pub height: usize,
    pub locations: usize,
    pub empty_windows: usize,
}

type FilesystemAggregator = Aggregator<
    ZarrPopulationStore,
    ZarrClimateStore,
    GeoJsonShapeStore,
    CsvHierarchyStore,
    CsvResultStore,
>;

fn aggregator(config: &ServiceConfig) -> Result<FilesystemAggregator> {
    Ok(Aggregator::new(
        config.aggregation.clone(),
        filesystem_stores(&config.paths),
    )?)
}

/// Run a single (scenario, measure, draw) unit.
pub fn run_task(config: &ServiceConfig, version: &str, tags: &RunTags) -> Result<RunSummary> {
    let summary = aggregator(config)?
        .run_unit(version, &tags.scenario, &tags.measure, &tags.draw)
        .with_context(|| format!("aggregation of {tags} failed"))?;
    Ok(summary)
}

/// Run jobs one after another, stopping at the first failure.
pub fn run_jobs(config: &ServiceConfig, jobs: &[Job]) -> Result<Vec<RunSummary>> {
    let aggregator = aggregator(config)?;
    let start = Instant::now();
    let mut summaries = Vec::with_capacity(jobs.len());

    for (i, job) in jobs.iter().enumerate() {
        info!(job = i + 1, total = jobs.len(), tags = %job.tags(), "Running job");
        let summary = aggregator
            .run_unit(&job.version, &job.scenario, &job.measure, &job.draw)
            .map_err(|e| {
                error!(tags = %job.tags(), error = %e, "Job failed, stopping run");
                e
            })
            .with_context(|| format!("job {} of {} ({}) failed", i + 1, jobs.len(), job.tags()))?;
        summaries.push(summary);
    }

    info!(
        jobs = jobs.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Run complete"
    );
    Ok(summaries)
}

/// Combine the draw partitions of one output hierarchy, scenario and measure.
pub fn compile(
    config: &ServiceConfig,
    version: &str,
    hierarchy: &str,
    scenario: &str,
    measure: &str,
) -> Result<CompileSummary> {
    check_version(version)?;
    let settings = &config.aggregation;
    if !settings.output_hierarchies().any(|h| h == hierarchy) {
        return Err(AggregationError::UnknownHierarchy(hierarchy.to_string()).into());
    }
    for (kind, allowed, value) in [
        ("scenario", &settings.scenarios, scenario),
        ("measure", &settings.measures, measure),
    ] {
        if !allowed.iter().any(|a| a == value) {
            return Err(AggregationError::UnknownTag {
                kind,
                value: value.to_string(),
            }
            .into());
        }
    }

    let store = CsvResultStore::new(config.paths.clone());
    let summary = store
        .compile(version, hierarchy, scenario, measure)
        .with_context(|| format!("compiling {hierarchy}/{scenario}/{measure} failed"))?;
    Ok(summary)
}

/// Rasterize a shape hierarchy and store its location-ID raster.
pub fn write_masks(config: &ServiceConfig, version: &str, hierarchy: &str) -> Result<MaskSummary> {
    check_version(version)?;
    let masks = aggregator(config)?.build_location_masks(hierarchy)?;
    let output = config.paths.masks(version, hierarchy);
    ZarrGridWriter::default()
        .write_u32_grid(&output, &masks.raster)
        .with_context(|| format!("writing masks for {hierarchy} failed"))?;

    let summary = MaskSummary {
        hierarchy: hierarchy.to_string(),
        output,
        width: masks.raster.width(),
        height: masks.raster.height(),
        locations: masks.windows.len(),
        empty_windows: masks.windows.values().filter(|w| w.is_empty()).count(),
    };
    info!(
        hierarchy = %summary.hierarchy,
        output = %summary.output.display(),
        locations = summary.locations,
        "Wrote location masks"
    );
    Ok(summary)
}

fn emit<T: Serialize>(out: &mut impl Write, value: &T) -> Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Dispatch a parsed subcommand.
pub fn execute(config: &ServiceConfig, command: &Command, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Task {
            version,
            scenario,
            measure,
            draw,
        } => {
            let summary = run_task(config, version, &RunTags::new(scenario, measure, draw))?;
            emit(out, &summary)
        }
        Command::Run {
            version,
            scenarios,
            measures,
            draws,
            dry_run,
        } => {
            let selection = JobSelection {
                scenarios: scenarios.clone(),
                measures: measures.clone(),
                draws: draws.clone(),
            };
            let jobs = job_matrix(&config.aggregation, version, &selection)?;
            info!(jobs = jobs.len(), dry_run = *dry_run, "Expanded job matrix");

            if *dry_run {
                for job in &jobs {
                    emit(out, &job.scheduled(config))?;
                }
                return Ok(());
            }
            for summary in run_jobs(config, &jobs)? {
                emit(out, &summary)?;
            }
            Ok(())
        }
        Command::Compile {
            version,
            hierarchy,
            scenario,
            measure,
        } => {
            let summary = compile(config, version, hierarchy, scenario, measure)?;
            emit(out, &summary)
        }
        Command::Masks { version, hierarchy } => {
            let summary = write_masks(config, version, hierarchy)?;
            emit(out, &summary)
        }
    }
}
