//! Population-weighted climate aggregation CLI.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use aggregator::{execute, Cli, ServiceConfig};

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    let mut config = ServiceConfig::load(cli.config.as_deref())?;
    config.apply_dirs(&cli.dirs.overrides());
    config.validate()?;
    info!(
        config = ?cli.config,
        output_dir = %config.paths.output_dir.display(),
        hierarchies = config.aggregation.shape_hierarchies.len(),
        "Loaded configuration"
    );

    let stdout = std::io::stdout();
    execute(&config, &cli.command, &mut stdout.lock())
}
