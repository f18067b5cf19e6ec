// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod environment;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod workspace;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::{CliArgs, Command, GlobalArgs, RunArgs};
use crate::config::loader::load_and_validate;
use crate::config::model::{Config, parse_duration};
use crate::engine::registry::RegistrySet;
use crate::engine::runtime::{RunOptions, Runtime};
use crate::engine::scratch::{clean, rotate_logs};
use crate::environment::Environment;
use crate::errors::IjError;
use crate::exec::{ProcessRunner, TokioProcessRunner};

/// High-level entry point used by `main.rs`.
///
/// Returns `Ok(false)` when the command ran but failed (a plan failed), and
/// an error when it could not run at all.
pub async fn run(args: CliArgs) -> Result<bool> {
    let global = &args.global;
    let project_dir = project_dir(&global.config);

    match args.command() {
        Command::Run(run_args) => {
            let config = load_and_validate(&global.config, &global.overrides)?;
            let options = run_options(global, &run_args, project_dir)?;
            let runner: Arc<dyn ProcessRunner> = Arc::new(TokioProcessRunner::new());
            Ok(Runtime::new(Arc::new(config), runner, options).run().await?)
        }
        Command::Clean => {
            clean(&project_dir)?;
            Ok(true)
        }
        Command::RotateLogs { keep } => {
            let removed = rotate_logs(&project_dir, keep)?;
            info!(count = removed.len(), keep, "rotated run directories");
            Ok(true)
        }
        Command::Login => {
            let config = load_and_validate(&global.config, &global.overrides)?;
            let registries = registry_set(&config, global, &project_dir)?;
            // Sessions outlive this command, so no cleanup is registered.
            registries.login(&CancellationToken::new(), None).await?;
            Ok(true)
        }
        Command::Logout => {
            let config = load_and_validate(&global.config, &global.overrides)?;
            registry_set(&config, global, &project_dir)?
                .logout_all()
                .await?;
            Ok(true)
        }
    }
}

fn run_options(global: &GlobalArgs, args: &RunArgs, project_dir: PathBuf) -> Result<RunOptions> {
    Ok(RunOptions {
        plans: args.plans.clone(),
        project_dir,
        environment: cli_environment(global)?,
        force_sequential: args.force_sequential,
        healthcheck_interval: args
            .healthcheck_interval
            .as_deref()
            .map(parse_cli_duration)
            .transpose()?,
        keep_workspace: args.keep_workspace,
        login: args.login,
        ssh_identities: args.ssh_identity.clone(),
        timeout: args.timeout.as_deref().map(parse_cli_duration).transpose()?,
        run_id: None,
    })
}

fn parse_cli_duration(s: &str) -> Result<std::time::Duration> {
    parse_duration(s).map_err(|e| IjError::Config(e).into())
}

/// `--env-file` lines followed by `--env` values, so explicit values win.
fn cli_environment(global: &GlobalArgs) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for path in &global.env_file {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading env file {}", path.display()))?;
        lines.extend(
            contents
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string),
        );
    }
    lines.extend(global.env.iter().cloned());
    Ok(lines)
}

fn registry_set(config: &Config, global: &GlobalArgs, project_dir: &Path) -> Result<Arc<RegistrySet>> {
    let environment = Environment::from_lines(
        config
            .environment
            .iter()
            .cloned()
            .chain(cli_environment(global)?),
    );
    Ok(Arc::new(RegistrySet::new(
        config.registries.clone(),
        environment,
        Arc::new(TokioProcessRunner::new()),
        project_dir,
    )))
}

/// Directory holding the config file; the current directory for a bare
/// file name.
fn project_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
