//! Error types for hearth using snafu.
//!
//! Each pipeline component owns one error enum. `PipelineError` aggregates
//! them and names the stage that failed, so an operator can tell whether a
//! run died while reading, cleaning, staging, loading or transforming.

use snafu::prelude::*;
use std::path::PathBuf;

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Source path is empty.
    #[snafu(display("Source path cannot be empty"))]
    EmptySourcePath,

    /// Staged artifact path is empty.
    #[snafu(display("Staging path cannot be empty"))]
    EmptyStagingPath,

    /// Warehouse path is empty.
    #[snafu(display("Warehouse path cannot be empty"))]
    EmptyWarehousePath,

    /// Models directory is empty.
    #[snafu(display("Models path cannot be empty"))]
    EmptyModelsPath,

    /// CSV delimiter must be a single ASCII character.
    #[snafu(display("Delimiter {delimiter:?} is not a single ASCII character"))]
    InvalidDelimiter { delimiter: char },

    /// Row groups must hold at least one row.
    #[snafu(display("Staging row_group_size must be greater than zero"))]
    ZeroRowGroupSize,

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file {}: {source}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ============ Source Errors ============

/// Errors that can occur while reading the raw listing file.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SourceError {
    /// The raw file could not be opened.
    #[snafu(display("Failed to open raw listings {}: {source}", path.display()))]
    OpenRaw { path: PathBuf, source: csv::Error },

    /// The header row could not be read.
    #[snafu(display("Failed to read header of {}: {source}", path.display()))]
    ReadHeader { path: PathBuf, source: csv::Error },

    /// A record has more fields than the header.
    #[snafu(display(
        "Record at line {line} of {} has {found} fields, header has {expected}",
        path.display()
    ))]
    TooManyFields {
        path: PathBuf,
        line: u64,
        expected: usize,
        found: usize,
    },

    /// A record could not be read (invalid UTF-8, I/O, ...).
    #[snafu(display("Malformed record at line {line} of {}: {source}", path.display()))]
    ReadRecord {
        path: PathBuf,
        line: u64,
        source: csv::Error,
    },
}

// ============ Clean Errors ============

/// Errors that can occur while assembling the cleaned batch.
///
/// Field-level parse failures never surface here; they become nulls.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CleanError {
    /// Arrow rejected the assembled columns.
    #[snafu(display("Failed to assemble cleaned batch: {source}"))]
    AssembleBatch { source: arrow::error::ArrowError },
}

// ============ Staging Errors ============

/// Errors that can occur while writing the staged Parquet artifact.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StagingError {
    /// Parent directory for the artifact could not be created.
    #[snafu(display("Failed to create staging directory {}: {source}", path.display()))]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Temporary file next to the artifact could not be created.
    #[snafu(display("Failed to create temporary file in {}: {source}", path.display()))]
    TempFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to create Parquet writer.
    #[snafu(display("Failed to create Parquet writer: {source}"))]
    WriterCreate {
        source: parquet::errors::ParquetError,
    },

    /// Parquet write error.
    #[snafu(display("Parquet write error: {source}"))]
    Write {
        source: parquet::errors::ParquetError,
    },

    /// The finished temporary file could not be moved into place.
    #[snafu(display("Failed to persist staged artifact {}: {source}", path.display()))]
    Persist {
        path: PathBuf,
        source: tempfile::PersistError,
    },

    /// The artifact size could not be read back.
    #[snafu(display("Failed to stat staged artifact {}: {source}", path.display()))]
    Metadata {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ============ Store Errors ============

/// Errors raised by the DuckDB warehouse handle.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// The store file is locked, missing or not permitted.
    #[snafu(display("Warehouse store unavailable at {path}: {source}"))]
    Unavailable {
        path: String,
        source: duckdb::Error,
    },

    /// The staged artifact does not exist.
    #[snafu(display("Staged artifact not found: {}", path.display()))]
    MissingArtifact { path: PathBuf },

    /// DuckDB could not read the staged artifact into the staging table.
    #[snafu(display("Failed to load {} into {table}: {source}", path.display()))]
    LoadStaging {
        table: String,
        path: PathBuf,
        source: duckdb::Error,
    },

    /// A catalog or maintenance statement failed.
    #[snafu(display("Warehouse statement failed: {source}"))]
    Statement { source: duckdb::Error },

    /// Writing the build-status marker failed.
    #[snafu(display("Failed to record build status for run {run_id}: {source}"))]
    StatusWrite {
        run_id: String,
        source: duckdb::Error,
    },

    /// Reading the build-status marker failed.
    #[snafu(display("Failed to read build status: {source}"))]
    StatusRead { source: duckdb::Error },

    /// The marker table holds a status this build does not know.
    #[snafu(display("Unknown build status '{value}'"))]
    UnknownStatus { value: String },
}

// ============ Model Errors ============

/// Errors raised while discovering, ordering or executing model scripts.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ModelError {
    /// The models directory could not be listed.
    #[snafu(display("Failed to read models directory {}: {source}", path.display()))]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A script file could not be read.
    #[snafu(display("Failed to read model script {}: {source}", path.display()))]
    ReadScript {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file stem is not a valid table identifier.
    #[snafu(display("Model name '{name}' ({}) is not a valid table name", path.display()))]
    InvalidModelName { name: String, path: PathBuf },

    /// The script carries no statement.
    #[snafu(display("Model '{model}' has no SELECT statement"))]
    EmptyScript { model: String },

    /// Two scripts define the same output table.
    #[snafu(display("Model '{model}' is defined more than once"))]
    DuplicateModel { model: String },

    /// The declared dependencies form a cycle.
    #[snafu(display("Dependency cycle between models: {}", models.join(", ")))]
    DependencyCycle { models: Vec<String> },

    /// A declared source table is absent from the store.
    #[snafu(display("Model '{model}' depends on table '{table}', which does not exist"))]
    MissingSource { model: String, table: String },

    /// A catalog lookup for the model or its sources failed.
    #[snafu(display("Catalog lookup for model '{model}' failed: {source}"))]
    Catalog { model: String, source: StoreError },

    /// The model's statement failed.
    #[snafu(display("Model '{model}' failed: {source}"))]
    Execution {
        model: String,
        source: duckdb::Error,
    },
}

impl ModelError {
    /// Name of the model this error is attributed to, if any.
    pub fn model(&self) -> Option<&str> {
        match self {
            ModelError::EmptyScript { model }
            | ModelError::DuplicateModel { model }
            | ModelError::MissingSource { model, .. }
            | ModelError::Catalog { model, .. }
            | ModelError::Execution { model, .. } => Some(model),
            _ => None,
        }
    }
}

// ============ Query Errors ============

/// Errors raised by the read-only reporting interface.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum QueryError {
    /// The warehouse has never completed a build.
    #[snafu(display("Warehouse has no recorded build"))]
    NoBuild,

    /// The latest build did not succeed; its tables may be partial.
    #[snafu(display("Latest build {run_id} is {status}, refusing to serve partial data"))]
    IncompleteBuild { run_id: String, status: String },

    /// The queried column is absent from the table.
    #[snafu(display("Column '{column}' does not exist in {table}"))]
    MissingColumn { table: String, column: String },

    /// The store could not be opened or inspected.
    #[snafu(display("Store error: {source}"))]
    QueryStore { source: StoreError },

    /// The aggregate query failed.
    #[snafu(display("Query failed: {source}"))]
    Sql { source: duckdb::Error },
}

// ============ Pipeline Error (top-level) ============

/// Top-level pipeline errors. Each variant names the failing stage.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Reading the raw file failed.
    #[snafu(display("Read stage failed: {source}"))]
    Read { source: SourceError },

    /// Cleaning failed.
    #[snafu(display("Clean stage failed: {source}"))]
    Clean { source: CleanError },

    /// Writing the staged artifact failed.
    #[snafu(display("Staging stage failed: {source}"))]
    Stage { source: StagingError },

    /// Model scripts could not be discovered or ordered.
    #[snafu(display("Model discovery failed: {source}"))]
    Discover { source: ModelError },

    /// The warehouse could not be opened or marked.
    #[snafu(display("Warehouse error: {source}"))]
    Store { source: StoreError },

    /// Loading the staging table failed.
    #[snafu(display("Load stage failed (run {run_id}): {source}"))]
    Load { run_id: String, source: StoreError },

    /// A transformation script failed; remaining models were not built.
    #[snafu(display("Transform stage failed (run {run_id}): {source}"))]
    Transform { run_id: String, source: ModelError },

    /// A models-only rebuild found no staging table to build from.
    #[snafu(display("Staging table '{table}' does not exist; run the full pipeline first"))]
    MissingStagingTable { table: String },
}
