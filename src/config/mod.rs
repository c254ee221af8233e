//! Configuration parsing.
//!
//! Loads the pipeline configuration from a YAML file, interpolating
//! environment variables first. Every section except `source` has defaults,
//! so the smallest useful file names only the raw listings path.

mod vars;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::path::{Path, PathBuf};

use crate::error::{
    ConfigError, EmptyModelsPathSnafu, EmptySourcePathSnafu, EmptyStagingPathSnafu,
    EmptyWarehousePathSnafu, EnvInterpolationSnafu, InvalidDelimiterSnafu, ReadFileSnafu,
    YamlParseSnafu, ZeroRowGroupSizeSnafu,
};

pub use vars::interpolate;

/// Main configuration structure for the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub staging: StagingConfig,
    #[serde(default)]
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub models: ModelsConfig,
}

/// Raw listings input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Path to the raw listings CSV file.
    pub path: PathBuf,

    /// Field delimiter (default: ',').
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

fn default_delimiter() -> char {
    ','
}

/// Staged Parquet artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Where the cleaned batch is written.
    #[serde(default = "default_staging_path")]
    pub path: PathBuf,

    /// Parquet compression codec.
    #[serde(default)]
    pub compression: ParquetCompression,

    /// Maximum rows per Parquet row group (default: 65536).
    #[serde(default = "default_row_group_size")]
    pub row_group_size: usize,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            path: default_staging_path(),
            compression: ParquetCompression::default(),
            row_group_size: default_row_group_size(),
        }
    }
}

fn default_staging_path() -> PathBuf {
    PathBuf::from("data/staged/listings_clean.parquet")
}

fn default_row_group_size() -> usize {
    64 * 1024
}

/// DuckDB warehouse file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    #[serde(default = "default_warehouse_path")]
    pub path: PathBuf,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            path: default_warehouse_path(),
        }
    }
}

fn default_warehouse_path() -> PathBuf {
    PathBuf::from("warehouse.db")
}

/// Directory of transformation scripts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_models_path")]
    pub path: PathBuf,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            path: default_models_path(),
        }
    }
}

fn default_models_path() -> PathBuf {
    PathBuf::from("models/sql")
}

/// Parquet compression codec.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    Uncompressed,
    #[default]
    Snappy,
    Gzip,
    Zstd,
    Lz4,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration text, interpolating environment variables.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let content = interpolate(content).map_err(|problems| {
            EnvInterpolationSnafu {
                message: problems.join("\n"),
            }
            .build()
        })?;

        let config: Config = serde_yaml::from_str(&content).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            !self.source.path.as_os_str().is_empty(),
            EmptySourcePathSnafu
        );
        ensure!(
            !self.staging.path.as_os_str().is_empty(),
            EmptyStagingPathSnafu
        );
        ensure!(
            !self.warehouse.path.as_os_str().is_empty(),
            EmptyWarehousePathSnafu
        );
        ensure!(
            !self.models.path.as_os_str().is_empty(),
            EmptyModelsPathSnafu
        );
        ensure!(
            self.source.delimiter.is_ascii(),
            InvalidDelimiterSnafu {
                delimiter: self.source.delimiter
            }
        );
        ensure!(self.staging.row_group_size > 0, ZeroRowGroupSizeSnafu);
        Ok(())
    }
}

impl SourceConfig {
    /// Delimiter as the byte the CSV reader expects.
    pub fn delimiter_byte(&self) -> u8 {
        // validate() guarantees an ASCII delimiter
        self.delimiter as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_yaml("source:\n  path: data/raw/listings.csv\n").unwrap();

        assert_eq!(config.source.path, PathBuf::from("data/raw/listings.csv"));
        assert_eq!(config.source.delimiter, ',');
        assert_eq!(
            config.staging.path,
            PathBuf::from("data/staged/listings_clean.parquet")
        );
        assert_eq!(config.staging.compression, ParquetCompression::Snappy);
        assert_eq!(config.staging.row_group_size, 65536);
        assert_eq!(config.warehouse.path, PathBuf::from("warehouse.db"));
        assert_eq!(config.models.path, PathBuf::from("models/sql"));
    }

    #[test]
    fn test_full_config_yaml_parsing() {
        let yaml = r#"
source:
  path: /data/raw/listings.tsv
  delimiter: "\t"
staging:
  path: /data/staged/clean.parquet
  compression: zstd
  row_group_size: 1024
warehouse:
  path: /data/warehouse.db
models:
  path: /srv/models
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.source.delimiter_byte(), b'\t');
        assert_eq!(config.staging.compression, ParquetCompression::Zstd);
        assert_eq!(config.staging.row_group_size, 1024);
        assert_eq!(config.models.path, PathBuf::from("/srv/models"));
    }

    #[test]
    fn test_empty_source_path_rejected() {
        let err = Config::from_yaml("source:\n  path: \"\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::EmptySourcePath));
    }

    #[test]
    fn test_non_ascii_delimiter_rejected() {
        let err = Config::from_yaml("source:\n  path: a.csv\n  delimiter: \"§\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDelimiter { .. }));
    }

    #[test]
    fn test_zero_row_group_rejected() {
        let yaml = "source:\n  path: a.csv\nstaging:\n  row_group_size: 0\n";
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroRowGroupSize));
    }

    #[test]
    fn test_missing_env_var_fails() {
        let err = Config::from_yaml("source:\n  path: ${HEARTH_TEST_CONFIG_UNSET_VAR}\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::EnvInterpolation { .. }));
    }
}
