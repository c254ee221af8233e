//! Model runner.
//!
//! Discovers the transformation scripts in a directory and materializes
//! each one as a table, in dependency order. The location and host
//! dimensions and the listing fact table are built this way from
//! `models/sql/`.
//!
//! Each model is materialized with one `CREATE OR REPLACE TABLE ... AS`
//! statement, so a reader sees either the previous table or the new one.
//! The first failure aborts the run. The failed model and every model that
//! had not run yet are then dropped, which leaves only tables built by this
//! run next to the failed build-status marker.

pub mod graph;
pub mod script;

pub use script::ModelScript;

use snafu::prelude::*;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::emit;
use crate::error::{CatalogSnafu, ExecutionSnafu, MissingSourceSnafu, ModelError, ReadDirSnafu};
use crate::metrics::events::{ModelBuilt, ModelFailed};
use crate::store::{Warehouse, quote_ident};

/// Scripts in execution order.
#[derive(Debug, Clone)]
pub struct ModelRunner {
    scripts: Vec<ModelScript>,
}

/// One materialized model.
#[derive(Debug, Clone)]
pub struct BuiltModel {
    pub name: String,
    pub rows: u64,
    pub duration: Duration,
}

impl ModelRunner {
    /// Load every `*.sql` file in `dir`.
    pub fn discover(dir: &Path) -> Result<Self, ModelError> {
        let entries = std::fs::read_dir(dir).context(ReadDirSnafu { path: dir })?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry.context(ReadDirSnafu { path: dir })?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "sql") {
                paths.push(path);
            }
        }
        paths.sort();

        let scripts = paths
            .iter()
            .map(|path| ModelScript::from_file(path))
            .collect::<Result<Vec<_>, _>>()?;
        let runner = Self::from_scripts(scripts)?;
        info!(
            "Discovered {} model(s) in {}: {}",
            runner.scripts.len(),
            dir.display(),
            runner.model_names().join(" -> ")
        );
        Ok(runner)
    }

    /// Order already parsed scripts.
    pub fn from_scripts(scripts: Vec<ModelScript>) -> Result<Self, ModelError> {
        let order = graph::execution_order(&scripts)?;
        let mut slots: Vec<Option<ModelScript>> = scripts.into_iter().map(Some).collect();
        let scripts = order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect();
        Ok(Self { scripts })
    }

    /// Scripts in the order they run.
    pub fn scripts(&self) -> &[ModelScript] {
        &self.scripts
    }

    pub fn model_names(&self) -> Vec<&str> {
        self.scripts.iter().map(ModelScript::name).collect()
    }

    /// Declared dependencies that are not models themselves.
    pub fn sources(&self) -> BTreeSet<&str> {
        let models: BTreeSet<&str> = self.scripts.iter().map(ModelScript::name).collect();
        self.scripts
            .iter()
            .flat_map(|s| s.depends_on().iter().map(String::as_str))
            .filter(|dep| !models.contains(dep))
            .collect()
    }

    /// Build every model, aborting on the first failure.
    pub fn run(&self, store: &Warehouse) -> Result<Vec<BuiltModel>, ModelError> {
        let mut built = Vec::with_capacity(self.scripts.len());
        for (position, script) in self.scripts.iter().enumerate() {
            match self.build(store, script) {
                Ok(model) => built.push(model),
                Err(e) => {
                    error!("Model '{}' failed, aborting: {}", script.name(), e);
                    emit!(ModelFailed {
                        model: script.name().to_string()
                    });
                    self.discard_unbuilt(store, position);
                    return Err(e);
                }
            }
        }
        Ok(built)
    }

    fn build(&self, store: &Warehouse, script: &ModelScript) -> Result<BuiltModel, ModelError> {
        let model = script.name();
        let models: BTreeSet<&str> = self.scripts.iter().map(ModelScript::name).collect();
        for dep in script.depends_on() {
            if models.contains(dep.as_str()) {
                continue;
            }
            let exists = store
                .table_exists(dep)
                .context(CatalogSnafu { model })?;
            ensure!(exists, MissingSourceSnafu { model, table: dep });
        }

        let start = Instant::now();
        let sql = format!(
            "CREATE OR REPLACE TABLE {} AS\n{}",
            quote_ident(model),
            script.sql()
        );
        debug!("Running model '{}' from {}", model, script.path().display());
        store
            .connection()
            .execute_batch(&sql)
            .context(ExecutionSnafu { model })?;
        let duration = start.elapsed();

        let rows = store
            .row_count(model)
            .context(CatalogSnafu { model })?;
        emit!(ModelBuilt {
            model: model.to_string(),
            duration,
        });
        info!("Built {} ({} rows) in {:?}", model, rows, duration);

        Ok(BuiltModel {
            name: model.to_string(),
            rows,
            duration,
        })
    }

    /// Drop the models from `position` onwards; they were not built by
    /// this run and must not be read alongside the ones that were.
    fn discard_unbuilt(&self, store: &Warehouse, position: usize) {
        for script in &self.scripts[position..] {
            if let Err(e) = store.drop_table_if_exists(script.name()) {
                warn!("Failed to drop unbuilt model '{}': {}", script.name(), e);
            }
        }
    }
}
