//! Transformation script files.
//!
//! A script is a `<table>.sql` file holding a single `SELECT`. The file stem
//! names the output table. Dependencies are declared in header comments:
//!
//! ```sql
//! -- depends_on: staging_listings, dim_location
//! SELECT ...
//! ```
//!
//! Several `depends_on` lines accumulate. A dependency naming another script
//! orders that script first; any other name is a source table that must
//! already exist when the script runs.

use regex::Regex;
use snafu::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::error::{EmptyScriptSnafu, InvalidModelNameSnafu, ModelError, ReadScriptSnafu};

static DEPENDS_ON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*--\s*depends_on\s*:\s*(.*?)\s*$").expect("depends_on pattern is valid")
});

static TABLE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("table name pattern is valid")
});

/// One parsed transformation script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelScript {
    name: String,
    path: PathBuf,
    depends_on: Vec<String>,
    sql: String,
}

impl ModelScript {
    /// Read and parse a script file.
    pub fn from_file(path: &Path) -> Result<Self, ModelError> {
        let text = std::fs::read_to_string(path).context(ReadScriptSnafu { path })?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::parse(name, path, &text)
    }

    /// Parse script text for the model `name`.
    pub fn parse(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        text: &str,
    ) -> Result<Self, ModelError> {
        let name = name.into();
        let path = path.into();
        ensure!(
            TABLE_NAME.is_match(&name),
            InvalidModelNameSnafu {
                name: &name,
                path: &path
            }
        );

        let mut depends_on: Vec<String> = Vec::new();
        for caps in DEPENDS_ON.captures_iter(text) {
            for dep in caps[1].split(',').map(str::trim).filter(|d| !d.is_empty()) {
                if !depends_on.iter().any(|d| d == dep) {
                    depends_on.push(dep.to_string());
                }
            }
        }

        let sql = text.trim_end().trim_end_matches(';').trim_end().to_string();
        let has_statement = sql.lines().any(|line| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with("--")
        });
        ensure!(has_statement, EmptyScriptSnafu { model: &name });

        Ok(Self {
            name,
            path,
            depends_on,
            sql,
        })
    }

    /// Output table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Declared dependencies, in declaration order.
    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    /// The script body without trailing semicolons.
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dependencies() {
        let text = "-- Fact table.\n\
                    -- depends_on: staging_listings, dim_location\n\
                    -- DEPENDS_ON: dim_host , dim_location\n\
                    SELECT 1;\n";
        let script = ModelScript::parse("fact_listing", "fact_listing.sql", text).unwrap();

        assert_eq!(script.name(), "fact_listing");
        assert_eq!(
            script.depends_on(),
            &["staging_listings", "dim_location", "dim_host"]
        );
        assert!(script.sql().ends_with("SELECT 1"));
    }

    #[test]
    fn test_no_dependencies() {
        let script = ModelScript::parse("constants", "constants.sql", "SELECT 42 AS answer").unwrap();
        assert!(script.depends_on().is_empty());
    }

    #[test]
    fn test_comment_only_script_rejected() {
        let err = ModelScript::parse("empty", "empty.sql", "-- depends_on: a\n-- nothing\n")
            .unwrap_err();
        assert!(matches!(err, ModelError::EmptyScript { .. }));
    }

    #[test]
    fn test_invalid_name_rejected() {
        let err = ModelScript::parse("01-dims", "01-dims.sql", "SELECT 1").unwrap_err();
        assert!(matches!(err, ModelError::InvalidModelName { .. }));
    }
}
