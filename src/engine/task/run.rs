// src/engine/task/run.rs

//! Container run tasks.
//!
//! Attached containers stream their output into the task's log files and may
//! export environment files on success. Detached containers are left running
//! until cleanup, optionally after waiting for their healthcheck to pass.

use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::model::RunTask;
use crate::environment::Environment;
use crate::errors::{IjError, Result};
use crate::exec::command::{RunContainer, health_status_args, run_args};

use super::TaskRunner;

pub(super) async fn run(runner: &TaskRunner, task: &RunTask, env: &Environment) -> Result<()> {
    let state = &runner.state;
    let container = format!("{}-{}", state.run_id(), Uuid::new_v4().simple());

    let script_path = match task.script.as_deref() {
        Some(script) => Some(state.scratch().write_script(&container, script)?),
        None => None,
    };

    let workspace_dir = state.scratch().workspace();
    let args = run_args(&RunContainer {
        task,
        environment: env,
        container_name: &container,
        network: state.network(),
        workspace_dir: &workspace_dir,
        workspace_mount: &state.config().workspace,
        script_path: script_path.as_deref(),
    })?;

    // Tracked before start so cleanup can always find it.
    state.stop_list().add(&container);

    if task.detach {
        run_detached(runner, task, &container, args).await
    } else {
        let output = state.scratch().log_files(&runner.prefix);
        let result = state
            .runner()
            .run(state.cancel(), args, None, &runner.prefix, output)
            .await;
        // A cancelled client leaves the container running; cleanup stops it.
        if !state.cancel().is_cancelled() {
            state.stop_list().remove(&container);
        }
        result?;

        if !task.export_environment_files.is_empty() {
            let files = env.expand_slice(&task.export_environment_files)?;
            for line in read_export_files(&workspace_dir, &files)? {
                debug!(prefix = %runner.prefix, line = %line, "exporting environment");
                runner.context.export_env(line);
            }
        }
        Ok(())
    }
}

async fn run_detached(
    runner: &TaskRunner,
    task: &RunTask,
    container: &str,
    args: Vec<String>,
) -> Result<()> {
    let state = &runner.state;
    state.disconnect_list().add(container);

    let (stdout, _) = state.runner().run_for_output(state.cancel(), args, None).await?;
    info!(prefix = %runner.prefix, container = %stdout.trim(), "started detached container");

    if task.healthcheck.is_declared() {
        wait_healthy(runner, container).await?;
    }
    Ok(())
}

async fn wait_healthy(runner: &TaskRunner, container: &str) -> Result<()> {
    let state = &runner.state;
    let cancel = state.cancel();

    loop {
        let (stdout, _) = state
            .runner()
            .run_for_output(cancel, health_status_args(container), None)
            .await?;

        match stdout.trim() {
            "healthy" => {
                info!(prefix = %runner.prefix, container, "container is healthy");
                return Ok(());
            }
            "unhealthy" => {
                return Err(IjError::Execution(format!(
                    "container '{container}' reported unhealthy"
                )));
            }
            status => debug!(prefix = %runner.prefix, status, "waiting for healthcheck"),
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(IjError::Execution(format!(
                    "cancelled while waiting for container '{container}' to become healthy"
                )));
            }
            _ = tokio::time::sleep(state.healthcheck_interval()) => {}
        }
    }
}

/// Read `KEY=VALUE` lines from export files under `workspace`.
///
/// Every file must resolve (after following symlinks) to a path inside the
/// workspace. Blank lines and `#` comments are skipped.
pub fn read_export_files(workspace: &Path, files: &[String]) -> Result<Vec<String>> {
    let root = workspace
        .canonicalize()
        .with_context(|| format!("resolving workspace {}", workspace.display()))?;

    let mut lines = Vec::new();
    for file in files {
        let path = root
            .join(file)
            .canonicalize()
            .with_context(|| format!("resolving export file '{file}'"))?;
        if !path.starts_with(&root) {
            return Err(IjError::Execution(format!(
                "export file '{file}' resolves outside the workspace"
            )));
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("reading export file {}", path.display()))?;
        for line in contents.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if !line.contains('=') {
                return Err(IjError::Execution(format!(
                    "export file '{file}' has a line without '=': {line}"
                )));
            }
            lines.push(line.to_string());
        }
    }
    Ok(lines)
}
