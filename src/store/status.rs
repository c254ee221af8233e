//! Build-status marker.
//!
//! Every rebuild records a row in `_build_status`. A run starts as
//! `running` and ends as `succeeded` or `failed`; readers refuse to serve
//! data unless the latest run succeeded, so a half-finished or aborted
//! rebuild is never mistaken for a good one.

use chrono::{SecondsFormat, Utc};
use duckdb::{OptionalExt, params};
use snafu::prelude::*;
use std::fmt;
use std::str::FromStr;

use super::Warehouse;
use crate::error::{StatusReadSnafu, StatusWriteSnafu, StoreError, UnknownStatusSnafu};

/// Marker table name.
pub const BUILD_STATUS_TABLE: &str = "_build_status";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    Running,
    Succeeded,
    Failed,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Running => "running",
            BuildStatus::Succeeded => "succeeded",
            BuildStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildStatus {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "running" => Ok(BuildStatus::Running),
            "succeeded" => Ok(BuildStatus::Succeeded),
            "failed" => Ok(BuildStatus::Failed),
            other => UnknownStatusSnafu { value: other }.fail(),
        }
    }
}

/// One row of the marker table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRecord {
    pub run_id: String,
    pub status: BuildStatus,
    /// Stage that failed, for failed runs.
    pub stage: Option<String>,
    /// Model that failed, for transformation failures.
    pub failed_model: Option<String>,
    pub message: Option<String>,
    pub started_at: String,
    pub finished_at: Option<String>,
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Warehouse {
    /// Record the start of a rebuild.
    pub fn begin_build(&self, run_id: &str) -> Result<(), StoreError> {
        let conn = self.connection();
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {BUILD_STATUS_TABLE} (
                seq BIGINT NOT NULL,
                run_id VARCHAR NOT NULL,
                status VARCHAR NOT NULL,
                stage VARCHAR,
                failed_model VARCHAR,
                message VARCHAR,
                started_at VARCHAR NOT NULL,
                finished_at VARCHAR
            )"
        ))
        .context(StatusWriteSnafu { run_id })?;

        let seq: i64 = conn
            .query_row(
                &format!("SELECT coalesce(max(seq), 0) + 1 FROM {BUILD_STATUS_TABLE}"),
                [],
                |row| row.get(0),
            )
            .context(StatusWriteSnafu { run_id })?;
        conn.execute(
            &format!(
                "INSERT INTO {BUILD_STATUS_TABLE} (seq, run_id, status, started_at)
                 VALUES (?, ?, ?, ?)"
            ),
            params![seq, run_id, BuildStatus::Running.as_str(), now()],
        )
        .context(StatusWriteSnafu { run_id })?;
        Ok(())
    }

    /// Mark a rebuild as complete.
    pub fn finish_build(&self, run_id: &str) -> Result<(), StoreError> {
        self.connection()
            .execute(
                &format!(
                    "UPDATE {BUILD_STATUS_TABLE} SET status = ?, finished_at = ? WHERE run_id = ?"
                ),
                params![BuildStatus::Succeeded.as_str(), now(), run_id],
            )
            .context(StatusWriteSnafu { run_id })?;
        Ok(())
    }

    /// Mark a rebuild as failed at `stage`.
    pub fn fail_build(
        &self,
        run_id: &str,
        stage: &str,
        failed_model: Option<&str>,
        message: &str,
    ) -> Result<(), StoreError> {
        self.connection()
            .execute(
                &format!(
                    "UPDATE {BUILD_STATUS_TABLE}
                     SET status = ?, stage = ?, failed_model = ?, message = ?, finished_at = ?
                     WHERE run_id = ?"
                ),
                params![
                    BuildStatus::Failed.as_str(),
                    stage,
                    failed_model,
                    message,
                    now(),
                    run_id
                ],
            )
            .context(StatusWriteSnafu { run_id })?;
        Ok(())
    }

    /// The most recently started rebuild, if any.
    pub fn latest_build(&self) -> Result<Option<BuildRecord>, StoreError> {
        if !self.table_exists(BUILD_STATUS_TABLE)? {
            return Ok(None);
        }

        let row = self
            .connection()
            .query_row(
                &format!(
                    "SELECT run_id, status, stage, failed_model, message, started_at, finished_at
                     FROM {BUILD_STATUS_TABLE} ORDER BY seq DESC LIMIT 1"
                ),
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, Option<String>>(6)?,
                    ))
                },
            )
            .optional()
            .context(StatusReadSnafu)?;

        row.map(
            |(run_id, status, stage, failed_model, message, started_at, finished_at)|
             -> Result<BuildRecord, StoreError> {
                Ok(BuildRecord {
                    run_id,
                    status: status.parse()?,
                    stage,
                    failed_model,
                    message,
                    started_at,
                    finished_at,
                })
            },
        )
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_marker_means_no_build() {
        let store = Warehouse::in_memory().unwrap();
        assert_eq!(store.latest_build().unwrap(), None);
    }

    #[test]
    fn test_build_lifecycle() {
        let store = Warehouse::in_memory().unwrap();

        store.begin_build("run-1").unwrap();
        let record = store.latest_build().unwrap().unwrap();
        assert_eq!(record.run_id, "run-1");
        assert_eq!(record.status, BuildStatus::Running);
        assert_eq!(record.finished_at, None);

        store.finish_build("run-1").unwrap();
        let record = store.latest_build().unwrap().unwrap();
        assert_eq!(record.status, BuildStatus::Succeeded);
        assert!(record.finished_at.is_some());
    }

    #[test]
    fn test_failed_build_is_latest() {
        let store = Warehouse::in_memory().unwrap();
        store.begin_build("run-1").unwrap();
        store.finish_build("run-1").unwrap();

        store.begin_build("run-2").unwrap();
        store
            .fail_build("run-2", "transform", Some("dim_host"), "boom")
            .unwrap();

        let record = store.latest_build().unwrap().unwrap();
        assert_eq!(record.run_id, "run-2");
        assert_eq!(record.status, BuildStatus::Failed);
        assert_eq!(record.stage.as_deref(), Some("transform"));
        assert_eq!(record.failed_model.as_deref(), Some("dim_host"));
        assert_eq!(record.message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("failed".parse::<BuildStatus>().unwrap(), BuildStatus::Failed);
        assert!("exploded".parse::<BuildStatus>().is_err());
    }
}
