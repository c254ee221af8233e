//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in a pipeline run.

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Raw records read from the listings file.
pub struct RecordsRead {
    pub count: u64,
}

impl InternalEvent for RecordsRead {
    fn emit(self) {
        trace!(count = self.count, "Records read");
        counter!("hearth_records_read_total").increment(self.count);
    }
}

/// Records that passed through the cleaner.
pub struct RecordsCleaned {
    pub count: u64,
}

impl InternalEvent for RecordsCleaned {
    fn emit(self) {
        trace!(count = self.count, "Records cleaned");
        counter!("hearth_records_cleaned_total").increment(self.count);
    }
}

/// Present values in one column that failed type coercion and became null.
pub struct CoercionFailed {
    pub column: String,
    pub count: u64,
}

impl InternalEvent for CoercionFailed {
    fn emit(self) {
        trace!(column = %self.column, count = self.count, "Coercion failed");
        counter!("hearth_coercion_failures_total", "column" => self.column).increment(self.count);
    }
}

/// The staged Parquet artifact was written.
pub struct StagedArtifactWritten {
    pub bytes: u64,
    pub duration: Duration,
}

impl InternalEvent for StagedArtifactWritten {
    fn emit(self) {
        trace!(
            bytes = self.bytes,
            duration_ms = self.duration.as_millis(),
            "Staged artifact written"
        );
        counter!("hearth_staged_bytes_written_total").increment(self.bytes);
        histogram!("hearth_staging_write_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// The staging table was replaced.
pub struct StagingLoaded {
    pub rows: u64,
}

impl InternalEvent for StagingLoaded {
    fn emit(self) {
        trace!(rows = self.rows, "Staging table loaded");
        counter!("hearth_staging_rows_loaded_total").increment(self.rows);
    }
}

/// A model table was materialized.
pub struct ModelBuilt {
    pub model: String,
    pub duration: Duration,
}

impl InternalEvent for ModelBuilt {
    fn emit(self) {
        trace!(
            model = %self.model,
            duration_ms = self.duration.as_millis(),
            "Model built"
        );
        histogram!("hearth_model_build_duration_seconds", "model" => self.model)
            .record(self.duration.as_secs_f64());
    }
}

/// A model failed and aborted the transformation stage.
pub struct ModelFailed {
    pub model: String,
}

impl InternalEvent for ModelFailed {
    fn emit(self) {
        trace!(model = %self.model, "Model failed");
        counter!("hearth_models_failed_total", "model" => self.model).increment(1);
    }
}

/// Outcome of a whole rebuild.
#[derive(Debug, Clone, Copy)]
pub enum RunOutcome {
    Succeeded,
    Failed,
}

impl RunOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Succeeded => "succeeded",
            RunOutcome::Failed => "failed",
        }
    }
}

/// A rebuild finished.
pub struct RunCompleted {
    pub outcome: RunOutcome,
    pub duration: Duration,
}

impl InternalEvent for RunCompleted {
    fn emit(self) {
        trace!(
            outcome = self.outcome.as_str(),
            duration_ms = self.duration.as_millis(),
            "Run completed"
        );
        counter!("hearth_runs_total", "outcome" => self.outcome.as_str()).increment(1);
        histogram!("hearth_run_duration_seconds").record(self.duration.as_secs_f64());
    }
}
