//! Expansion of the (scenario, measure, draw) job matrix.

use std::collections::BTreeMap;
use std::path::PathBuf;

use aggregation::{check_version, AggregationConfig, AggregationError, RunTags};
use serde::Serialize;

use crate::config::{ServiceConfig, ENV_PIXEL_BUFFER};

/// Selects every configured value.
pub const ALL: &str = "all";

/// One unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub version: String,
    pub scenario: String,
    pub measure: String,
    pub draw: String,
}

impl Job {
    pub fn tags(&self) -> RunTags {
        RunTags::new(&self.scenario, &self.measure, &self.draw)
    }

    /// Arguments that run this job through the `task` subcommand against
    /// the same configuration file and directories as `config`.
    pub fn task_args(&self, config: &ServiceConfig) -> Vec<String> {
        let mut args: Vec<String> = [
            "task",
            "--version",
            self.version.as_str(),
            "--scenario",
            self.scenario.as_str(),
            "--measure",
            self.measure.as_str(),
            "--draw",
            self.draw.as_str(),
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        if let Some(source) = &config.source {
            args.push("--config".to_string());
            args.push(source.display().to_string());
        }
        let paths = &config.paths;
        for (flag, dir) in [
            ("--population-dir", &paths.population_dir),
            ("--climate-dir", &paths.climate_dir),
            ("--shape-dir", &paths.shape_dir),
            ("--output-dir", &paths.output_dir),
        ] {
            args.push(flag.to_string());
            args.push(dir.display().to_string());
        }
        args
    }

    /// What an external scheduler needs to submit the job.
    pub fn scheduled(&self, config: &ServiceConfig) -> ScheduledJob {
        let log_dir = config.paths.logs("aggregate");
        let mut env = BTreeMap::new();
        env.insert(
            ENV_PIXEL_BUFFER.to_string(),
            config.aggregation.pixel_buffer.to_string(),
        );
        ScheduledJob {
            job: self.clone(),
            args: self.task_args(config),
            env,
            stdout: log_dir.join(format!("{}_{}_{}.out", self.scenario, self.measure, self.draw)),
            stderr: log_dir.join(format!("{}_{}_{}.err", self.scenario, self.measure, self.draw)),
        }
    }
}

/// A job as emitted by `run --dry-run`, one JSON object per line.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledJob {
    #[serde(flatten)]
    pub job: Job,
    pub args: Vec<String>,
    /// Environment overrides the task must run with.
    pub env: BTreeMap<String, String>,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

/// Values requested on the command line for each axis of the matrix.
#[derive(Debug, Clone, Default)]
pub struct JobSelection {
    pub scenarios: Vec<String>,
    pub measures: Vec<String>,
    pub draws: Vec<String>,
}

/// Resolve one axis. No values, or [`ALL`], means every configured value.
pub fn select(
    kind: &'static str,
    requested: &[String],
    configured: &[String],
) -> Result<Vec<String>, AggregationError> {
    if requested.is_empty() || requested.iter().any(|r| r == ALL) {
        return Ok(configured.to_vec());
    }

    let mut selected: Vec<String> = Vec::with_capacity(requested.len());
    for value in requested {
        if !configured.contains(value) {
            return Err(AggregationError::UnknownTag {
                kind,
                value: value.clone(),
            });
        }
        if !selected.contains(value) {
            selected.push(value.clone());
        }
    }
    Ok(selected)
}

/// Cartesian product of the selection, scenario-major and draw-minor.
pub fn job_matrix(
    config: &AggregationConfig,
    version: &str,
    selection: &JobSelection,
) -> Result<Vec<Job>, AggregationError> {
    check_version(version)?;
    let scenarios = select("scenario", &selection.scenarios, &config.scenarios)?;
    let measures = select("measure", &selection.measures, &config.measures)?;
    let draws = select("draw", &selection.draws, &config.draws)?;

    let mut jobs = Vec::with_capacity(scenarios.len() * measures.len() * draws.len());
    for scenario in &scenarios {
        for measure in &measures {
            for draw in &draws {
                jobs.push(Job {
                    version: version.to_string(),
                    scenario: scenario.clone(),
                    measure: measure.clone(),
                    draw: draw.clone(),
                });
            }
        }
    }
    Ok(jobs)
}
