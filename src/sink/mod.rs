//! Staged artifact output.
//!
//! The cleaned batch is persisted as a Parquet file before it is loaded
//! into the warehouse, so cleaning and loading can be rerun independently.

pub mod parquet;

pub use self::parquet::{StagedArtifact, StagedWriter};
