//! Command line driver for the climate aggregation pipeline.
//!
//! The `climate-aggregates` binary exposes four subcommands:
//!
//! - `task`: one (scenario, measure, draw) unit over every shape hierarchy
//! - `run`: the job matrix, executed in-process or printed for a scheduler
//! - `compile`: every draw of a hierarchy, scenario and measure in one table
//! - `masks`: a shape hierarchy's location-ID raster

pub mod cli;
pub mod commands;
pub mod config;
pub mod jobs;

pub use cli::{Cli, Command, DirArgs};
pub use commands::{compile, execute, run_jobs, run_task, write_masks, MaskSummary};
pub use config::{ConfigError, DirOverrides, ServiceConfig};
pub use jobs::{job_matrix, Job, JobSelection, ScheduledJob};
