//! hearth: a batch pipeline from raw property listings to a DuckDB star schema.
//!
//! A run reads the raw listings CSV, cleans and types every field, writes
//! the cleaned batch to a staged Parquet artifact, loads it into the
//! warehouse as `staging_listings` and rebuilds the location and host
//! dimensions and the listing fact table from the SQL models.
//!
//! # Example
//!
//! ```ignore
//! use hearth::error::{ConfigSnafu, PipelineError};
//! use hearth::{Config, run_pipeline};
//! use snafu::ResultExt;
//!
//! fn main() -> Result<(), PipelineError> {
//!     let config = Config::from_file("hearth.yaml").context(ConfigSnafu)?;
//!     let stats = run_pipeline(&config)?;
//!     println!("Built {:?} from {} listings", stats.models_built, stats.rows_read);
//!     Ok(())
//! }
//! ```

pub mod clean;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod sink;
pub mod source;
pub mod store;

// Re-export main types
pub use config::Config;
pub use error::PipelineError;
pub use models::ModelRunner;
pub use pipeline::{PipelineStats, rebuild, run_models_only, run_pipeline};
pub use report::Reports;
pub use store::Warehouse;
