// src/engine/task/registry.rs

use std::sync::Arc;

use tracing::debug;

use crate::config::model::{LoginTask, Registry};
use crate::engine::registry::RegistrySet;
use crate::environment::Environment;
use crate::errors::{IjError, Result};

use super::TaskRunner;

fn registry_set(runner: &TaskRunner, registries: Vec<Registry>, env: &Environment) -> Arc<RegistrySet> {
    let state = &runner.state;
    Arc::new(RegistrySet::new(
        registries,
        env.clone(),
        Arc::clone(state.runner()),
        state.scratch().project_dir(),
    ))
}

/// Configured registries whose server is named in `wanted`, in declared
/// order. An empty `wanted` selects all of them.
fn select_registries(all: &[Registry], wanted: &[String], env: &Environment) -> Result<Vec<Registry>> {
    if wanted.is_empty() {
        return Ok(all.to_vec());
    }

    let wanted = env.expand_slice(wanted)?;
    let mut selected = Vec::new();
    let mut found = Vec::new();
    for registry in all {
        let server = registry.server(env)?;
        if wanted.contains(&server) {
            selected.push(registry.clone());
            found.push(server);
        }
    }

    let missing: Vec<&String> = wanted.iter().filter(|w| !found.contains(w)).collect();
    if !missing.is_empty() {
        return Err(IjError::Execution(format!(
            "login task names unconfigured registries: {missing:?}"
        )));
    }
    Ok(selected)
}

/// Log in to the selected registries; sessions are closed at cleanup.
pub(super) async fn login(runner: &TaskRunner, task: &LoginTask, env: &Environment) -> Result<()> {
    let state = &runner.state;
    let registries = select_registries(&state.config().registries, &task.registries, env)?;
    if registries.is_empty() {
        debug!(prefix = %runner.prefix, "no registries configured");
        return Ok(());
    }

    let set = registry_set(runner, registries, env);
    set.login(state.cancel(), Some(state.cleanup().as_ref())).await
}

pub(super) async fn logout(runner: &TaskRunner, env: &Environment) -> Result<()> {
    registry_set(runner, runner.state.config().registries.clone(), env)
        .logout_all()
        .await
}
