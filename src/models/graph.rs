//! Dependency ordering for model scripts.

use snafu::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

use super::ModelScript;
use crate::error::{DependencyCycleSnafu, DuplicateModelSnafu, ModelError};

/// Order scripts so every script runs after the scripts it depends on.
///
/// Among scripts whose dependencies are satisfied, the lexicographically
/// smallest name runs first, so the order is fully determined by the
/// declared graph and never by directory enumeration. Dependencies that
/// name no script are sources and do not constrain the order.
pub fn execution_order(scripts: &[ModelScript]) -> Result<Vec<usize>, ModelError> {
    let mut index_of: BTreeMap<&str, usize> = BTreeMap::new();
    for (i, script) in scripts.iter().enumerate() {
        ensure!(
            index_of.insert(script.name(), i).is_none(),
            DuplicateModelSnafu {
                model: script.name()
            }
        );
    }

    // Number of unbuilt model dependencies per script, and reverse edges.
    let mut pending: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for script in scripts {
        let model_deps: BTreeSet<&str> = script
            .depends_on()
            .iter()
            .map(String::as_str)
            .filter(|dep| index_of.contains_key(dep))
            .collect();
        pending.insert(script.name(), model_deps.len());
        for dep in model_deps {
            dependents.entry(dep).or_default().push(script.name());
        }
    }

    let mut ready: BTreeSet<&str> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut order = Vec::with_capacity(scripts.len());

    while let Some(name) = ready.pop_first() {
        order.push(index_of[name]);
        for dependent in dependents.get(name).into_iter().flatten() {
            if let Some(count) = pending.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if order.len() < scripts.len() {
        let models: Vec<String> = pending
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(name, _)| name.to_string())
            .collect();
        return DependencyCycleSnafu { models }.fail();
    }

    Ok(order)
}
