//! Command line definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::DirOverrides;

#[derive(Parser, Debug)]
#[command(name = "climate-aggregates")]
#[command(about = "Population-weighted climate aggregates over administrative hierarchies")]
pub struct Cli {
    /// Configuration file path (defaults are used when omitted)
    #[arg(short, long, global = true, env = "CLIMATE_AGG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level or filter directive
    #[arg(long, global = true, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(flatten)]
    pub dirs: DirArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Input and output roots, overriding the config file and environment.
#[derive(Args, Debug, Clone, Default)]
pub struct DirArgs {
    #[arg(long, global = true)]
    pub population_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    pub climate_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    pub shape_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,
}

impl DirArgs {
    pub fn overrides(&self) -> DirOverrides {
        DirOverrides {
            population_dir: self.population_dir.clone(),
            climate_dir: self.climate_dir.clone(),
            shape_dir: self.shape_dir.clone(),
            output_dir: self.output_dir.clone(),
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Aggregate one scenario, measure and draw over every shape hierarchy
    Task {
        /// Output version directory
        #[arg(long)]
        version: String,

        #[arg(long)]
        scenario: String,

        #[arg(long)]
        measure: String,

        #[arg(long)]
        draw: String,
    },

    /// Expand the scenario x measure x draw matrix and run or print it
    Run {
        #[arg(long)]
        version: String,

        /// Scenario to include, repeatable; `all` or none selects every one
        #[arg(long = "scenario")]
        scenarios: Vec<String>,

        /// Measure to include, repeatable
        #[arg(long = "measure")]
        measures: Vec<String>,

        /// Draw to include, repeatable
        #[arg(long = "draw")]
        draws: Vec<String>,

        /// Print one JSON job description per line instead of running
        #[arg(long)]
        dry_run: bool,
    },

    /// Combine every draw of one hierarchy, scenario and measure
    Compile {
        #[arg(long)]
        version: String,

        /// Output hierarchy
        #[arg(long)]
        hierarchy: String,

        #[arg(long)]
        scenario: String,

        #[arg(long)]
        measure: String,
    },

    /// Write the location-ID raster of a shape hierarchy
    Masks {
        #[arg(long)]
        version: String,

        #[arg(long)]
        hierarchy: String,
    },
}
