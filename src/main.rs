//! hearth: rebuild the listings warehouse from the raw CSV file.

use clap::Parser;
use snafu::prelude::*;
use std::path::PathBuf;
use tracing::info;

use hearth::config::Config;
use hearth::error::{ConfigSnafu, DiscoverSnafu, PipelineError};
use hearth::logging::init_tracing;
use hearth::models::ModelRunner;
use hearth::pipeline::{PipelineStats, run_models_only, run_pipeline};

/// Listings CSV to DuckDB star-schema batch pipeline.
#[derive(Parser, Debug)]
#[command(name = "hearth")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Dry run - validate configuration and models without processing.
    #[arg(long)]
    dry_run: bool,

    /// Rerun only the models against the existing staging table.
    #[arg(long, conflicts_with = "dry_run")]
    only_models: bool,
}

#[snafu::report]
fn main() -> Result<(), PipelineError> {
    let args = Args::parse();

    init_tracing();
    info!("hearth starting");

    let config = Config::from_file(&args.config).context(ConfigSnafu)?;

    if args.dry_run {
        info!("Dry run mode - validating configuration");
        info!("Source: {}", config.source.path.display());
        info!("Staged artifact: {}", config.staging.path.display());
        info!("Warehouse: {}", config.warehouse.path.display());
        let runner = ModelRunner::discover(&config.models.path).context(DiscoverSnafu)?;
        for script in runner.scripts() {
            info!(
                "  - {} (depends on: {})",
                script.name(),
                script.depends_on().join(", ")
            );
        }
        info!("Configuration is valid");
        return Ok(());
    }

    let stats = if args.only_models {
        run_models_only(&config)?
    } else {
        run_pipeline(&config)?
    };
    log_stats(&stats);

    Ok(())
}

fn log_stats(stats: &PipelineStats) {
    info!("Pipeline completed successfully");
    info!("  Run: {}", stats.run_id);
    info!("  Records read: {}", stats.rows_read);
    info!("  Records cleaned: {}", stats.rows_cleaned);
    info!("  Coercion failures: {}", stats.coercion_failures);
    info!("  Staged bytes: {}", stats.staged_bytes);
    info!("  Staging rows: {}", stats.staging_rows);
    info!("  Models built: {}", stats.models_built.join(", "));
}
