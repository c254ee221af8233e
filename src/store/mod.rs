//! DuckDB warehouse handle.
//!
//! A [`Warehouse`] owns one connection. It is passed explicitly to every
//! component that touches the store and closes when dropped, so the
//! connection is released on every exit path. Tests use throwaway
//! in-memory stores.

pub mod status;

pub use status::{BuildRecord, BuildStatus};

use duckdb::{AccessMode, Config, Connection, params};
use snafu::prelude::*;
use std::path::Path;
use tracing::{debug, info};

use crate::emit;
use crate::error::{
    LoadStagingSnafu, MissingArtifactSnafu, StatementSnafu, StoreError, UnavailableSnafu,
};
use crate::metrics::events::StagingLoaded;

/// Name of the full-replace landing table.
pub const STAGING_TABLE: &str = "staging_listings";

/// How the store was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadWrite,
    ReadOnly,
}

/// An open warehouse connection.
pub struct Warehouse {
    conn: Connection,
    location: String,
    access: Access,
}

impl std::fmt::Debug for Warehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Warehouse")
            .field("location", &self.location)
            .field("access", &self.access)
            .finish()
    }
}

impl Warehouse {
    /// Open (or create) a store file for a rebuild.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let location = path.as_ref().display().to_string();
        let conn = Connection::open(path.as_ref()).context(UnavailableSnafu { path: &location })?;
        info!("Opened warehouse {} read-write", location);
        Ok(Self {
            conn,
            location,
            access: Access::ReadWrite,
        })
    }

    /// Open an existing store file for queries only.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let location = path.as_ref().display().to_string();
        let config = Config::default()
            .access_mode(AccessMode::ReadOnly)
            .context(UnavailableSnafu { path: &location })?;
        let conn = Connection::open_with_flags(path.as_ref(), config)
            .context(UnavailableSnafu { path: &location })?;
        debug!("Opened warehouse {} read-only", location);
        Ok(Self {
            conn,
            location,
            access: Access::ReadOnly,
        })
    }

    /// A private in-memory store.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().context(UnavailableSnafu {
            path: ":memory:",
        })?;
        Ok(Self {
            conn,
            location: ":memory:".to_string(),
            access: Access::ReadWrite,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn access(&self) -> Access {
        self.access
    }

    /// Replace `table` with the contents of a staged Parquet artifact.
    ///
    /// The replacement is a single `CREATE OR REPLACE`, so concurrent readers
    /// see either the previous table or the new one, and a rerun never
    /// leaves rows from an earlier batch behind.
    pub fn load_staging(&self, artifact: &Path, table: &str) -> Result<u64, StoreError> {
        ensure!(artifact.is_file(), MissingArtifactSnafu { path: artifact });

        let sql = format!(
            "CREATE OR REPLACE TABLE {} AS SELECT * FROM read_parquet({})",
            quote_ident(table),
            quote_literal(&artifact.display().to_string())
        );
        self.conn
            .execute_batch(&sql)
            .context(LoadStagingSnafu { table, path: artifact })?;

        let rows = self.row_count(table)?;
        emit!(StagingLoaded { rows });
        info!("Loaded {} rows into {}", rows, table);
        Ok(rows)
    }

    /// Whether a table (or view) with this name exists.
    pub fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT count(*) FROM information_schema.tables WHERE table_name = ?",
                params![table],
                |row| row.get(0),
            )
            .context(StatementSnafu)?;
        Ok(count > 0)
    }

    /// Column names of a table in declaration order; empty if it does not exist.
    pub fn table_columns(&self, table: &str) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT column_name FROM information_schema.columns \
                 WHERE table_name = ? ORDER BY ordinal_position",
            )
            .context(StatementSnafu)?;
        let columns = stmt
            .query_map(params![table], |row| row.get::<_, String>(0))
            .context(StatementSnafu)?
            .collect::<Result<Vec<_>, _>>()
            .context(StatementSnafu)?;
        Ok(columns)
    }

    pub fn row_count(&self, table: &str) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .query_row(
                &format!("SELECT count(*) FROM {}", quote_ident(table)),
                [],
                |row| row.get(0),
            )
            .context(StatementSnafu)?;
        Ok(count as u64)
    }

    pub fn drop_table_if_exists(&self, table: &str) -> Result<(), StoreError> {
        self.conn
            .execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)))
            .context(StatementSnafu)
    }

    /// Add each `(name, sql_type)` column that `table` lacks, filled with
    /// nulls. Returns the names of the columns that were added.
    pub fn add_missing_columns(
        &self,
        table: &str,
        columns: &[(&str, &str)],
    ) -> Result<Vec<String>, StoreError> {
        let present = self.table_columns(table)?;
        let mut added = Vec::new();
        for (name, sql_type) in columns {
            if present.iter().any(|c| c == name) {
                continue;
            }
            self.conn
                .execute_batch(&format!(
                    "ALTER TABLE {} ADD COLUMN {} {}",
                    quote_ident(table),
                    quote_ident(name),
                    sql_type
                ))
                .context(StatementSnafu)?;
            added.push(name.to_string());
        }
        Ok(added)
    }
}

/// Quote an identifier for interpolation into SQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal for interpolation into SQL.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
