//! Batch pipeline.
//!
//! One run reads the raw listings, cleans them, writes the staged artifact
//! and rebuilds the warehouse from it:
//!
//! ```text
//! raw CSV -> clean -> staged Parquet -> staging_listings -> models
//! ```
//!
//! Every run is a full rebuild. The rebuild is bracketed by the
//! build-status marker so readers can tell a finished warehouse from a
//! partial one.

use snafu::prelude::*;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clean::{ColumnKind, clean};
use crate::config::Config;
use crate::emit;
use crate::error::{
    CleanSnafu, DiscoverSnafu, LoadSnafu, MissingStagingTableSnafu, PipelineError, ReadSnafu,
    StageSnafu, StoreError, StoreSnafu, TransformSnafu,
};
use crate::metrics::events::{RunCompleted, RunOutcome};
use crate::models::{BuiltModel, ModelRunner};
use crate::sink::StagedWriter;
use crate::source::read_listings;
use crate::store::{STAGING_TABLE, Warehouse};

/// Stage names recorded in the build-status marker.
const STAGE_LOAD: &str = "load";
const STAGE_TRANSFORM: &str = "transform";
const STAGE_FINISH: &str = "finish";

/// Staging columns the dimension models key on. A raw file without one of
/// them still builds: the loader adds it as an all-null column of the type
/// the cleaner would have produced.
pub const DIMENSION_COLUMNS: &[&str] = &[
    "id",
    "host_id",
    "host_name",
    "neighbourhood",
    "latitude",
    "longitude",
    "last_review",
    "calculated_host_listings_count",
];

/// Statistics about a pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub run_id: String,
    pub rows_read: usize,
    pub rows_cleaned: usize,
    pub coercion_failures: u64,
    pub staged_bytes: u64,
    pub staging_rows: u64,
    /// Models in the order they were built.
    pub models_built: Vec<String>,
}

/// Result of one warehouse rebuild.
#[derive(Debug, Clone)]
pub struct Rebuild {
    pub run_id: String,
    /// Rows loaded into the staging table; `None` when the existing staging
    /// table was reused.
    pub staging_rows: Option<u64>,
    pub models: Vec<BuiltModel>,
}

impl Rebuild {
    pub fn model_names(&self) -> Vec<String> {
        self.models.iter().map(|m| m.name.clone()).collect()
    }
}

/// Run the whole pipeline from the raw file to the fact table.
pub fn run_pipeline(config: &Config) -> Result<PipelineStats, PipelineError> {
    // Broken scripts are rejected before anything is written.
    let runner = ModelRunner::discover(&config.models.path).context(DiscoverSnafu)?;

    let raw = read_listings(&config.source).context(ReadSnafu)?;
    let rows_read = raw.num_rows();

    let cleaned = clean(&raw).context(CleanSnafu)?;
    drop(raw);

    let artifact = StagedWriter::new(&config.staging)
        .write(&cleaned.batch)
        .context(StageSnafu)?;

    let store = Warehouse::open(&config.warehouse.path).context(StoreSnafu)?;
    let rebuild = rebuild(&store, Some(&artifact.path), &runner)?;

    Ok(PipelineStats {
        models_built: rebuild.model_names(),
        run_id: rebuild.run_id,
        rows_read,
        rows_cleaned: cleaned.num_rows(),
        coercion_failures: cleaned.total_coercion_failures(),
        staged_bytes: artifact.size,
        staging_rows: rebuild.staging_rows.unwrap_or_default(),
    })
}

/// Rerun the models against the staging table already in the warehouse.
pub fn run_models_only(config: &Config) -> Result<PipelineStats, PipelineError> {
    let runner = ModelRunner::discover(&config.models.path).context(DiscoverSnafu)?;
    let store = Warehouse::open(&config.warehouse.path).context(StoreSnafu)?;

    let present = store.table_exists(STAGING_TABLE).context(StoreSnafu)?;
    ensure!(
        present,
        MissingStagingTableSnafu {
            table: STAGING_TABLE
        }
    );
    let staging_rows = store.row_count(STAGING_TABLE).context(StoreSnafu)?;

    let rebuild = rebuild(&store, None, &runner)?;
    Ok(PipelineStats {
        models_built: rebuild.model_names(),
        run_id: rebuild.run_id,
        staging_rows,
        ..PipelineStats::default()
    })
}

/// Rebuild the warehouse: optionally reload the staging table from
/// `artifact`, then run every model.
///
/// The build-status marker is `running` for the duration and ends as
/// `succeeded` or `failed` with the failing stage and model.
pub fn rebuild(
    store: &Warehouse,
    artifact: Option<&Path>,
    runner: &ModelRunner,
) -> Result<Rebuild, PipelineError> {
    let run_id = Uuid::now_v7().to_string();
    let start = Instant::now();
    store.begin_build(&run_id).context(StoreSnafu)?;
    info!("Rebuild {} started", run_id);

    let staging_rows = match artifact {
        Some(path) => match load(store, path) {
            Ok(rows) => Some(rows),
            Err(e) => {
                error!("Loading {} failed: {}", path.display(), e);
                mark_failed(store, &run_id, STAGE_LOAD, None, &e.to_string());
                finish_run(RunOutcome::Failed, start);
                return Err(e).context(LoadSnafu { run_id });
            }
        },
        None => None,
    };

    let models = match runner.run(store) {
        Ok(models) => models,
        Err(e) => {
            mark_failed(store, &run_id, STAGE_TRANSFORM, e.model(), &e.to_string());
            finish_run(RunOutcome::Failed, start);
            return Err(e).context(TransformSnafu { run_id });
        }
    };

    if let Err(e) = store.finish_build(&run_id) {
        error!("Completing rebuild {} failed: {}", run_id, e);
        mark_failed(store, &run_id, STAGE_FINISH, None, &e.to_string());
        finish_run(RunOutcome::Failed, start);
        return Err(e).context(StoreSnafu);
    }
    finish_run(RunOutcome::Succeeded, start);
    info!(
        "Rebuild {} succeeded: {} model(s) in {:?}",
        run_id,
        models.len(),
        start.elapsed()
    );

    Ok(Rebuild {
        run_id,
        staging_rows,
        models,
    })
}

/// Replace the staging table and add any missing dimension key columns.
fn load(store: &Warehouse, artifact: &Path) -> Result<u64, StoreError> {
    let rows = store.load_staging(artifact, STAGING_TABLE)?;
    let columns: Vec<(&str, &str)> = DIMENSION_COLUMNS
        .iter()
        .map(|name| (*name, ColumnKind::for_column(name).sql_type()))
        .collect();
    for column in store.add_missing_columns(STAGING_TABLE, &columns)? {
        warn!(
            "Column '{}' is absent from the raw listings; loaded as null",
            column
        );
    }
    Ok(rows)
}

fn mark_failed(
    store: &Warehouse,
    run_id: &str,
    stage: &str,
    failed_model: Option<&str>,
    message: &str,
) {
    if let Err(e) = store.fail_build(run_id, stage, failed_model, message) {
        warn!("Failed to mark rebuild {} as failed: {}", run_id, e);
    }
}

fn finish_run(outcome: RunOutcome, start: Instant) {
    emit!(RunCompleted {
        outcome,
        duration: start.elapsed(),
    });
}
