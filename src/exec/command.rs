// src/exec/command.rs

//! Container-engine command lines.
//!
//! Each builder turns a task (plus its effective environment) into a plain
//! argument vector for `docker`. Task fields are template-expanded against
//! the environment before they are placed on the command line.

use std::path::Path;

use crate::config::model::{BuildTask, RunTask};
use crate::environment::Environment;
use crate::errors::{IjError, Result};

pub const DOCKER: &str = "docker";

/// Where a task script is mounted inside its container.
pub const SCRIPT_MOUNT: &str = "/tmp/ij/script";

const DEFAULT_SHELL: &str = "/bin/sh";

fn docker(args: &[&str]) -> Vec<String> {
    std::iter::once(DOCKER)
        .chain(args.iter().copied())
        .map(str::to_string)
        .collect()
}

fn push_flag(args: &mut Vec<String>, flag: &str, value: impl Into<String>) {
    args.push(flag.to_string());
    args.push(value.into());
}

/// Everything `docker run` needs beyond the task itself.
#[derive(Debug, Clone, Copy)]
pub struct RunContainer<'a> {
    pub task: &'a RunTask,
    pub environment: &'a Environment,
    pub container_name: &'a str,
    pub network: &'a str,
    /// Host directory mounted as the workspace.
    pub workspace_dir: &'a Path,
    /// Mount point of the workspace inside the container.
    pub workspace_mount: &'a str,
    /// Host path of the task script, if the task has one.
    pub script_path: Option<&'a Path>,
}

pub fn run_args(container: &RunContainer<'_>) -> Result<Vec<String>> {
    let task = container.task;
    let env = container.environment;

    let image = env
        .expand_option(task.image.as_deref())?
        .filter(|i| !i.is_empty())
        .ok_or_else(|| IjError::Execution(format!("task '{}' has no image", task.meta.name)))?;

    let mut args = docker(&["run"]);
    if task.detach {
        args.push("--detach".to_string());
    } else {
        args.push("--rm".to_string());
    }
    push_flag(&mut args, "--name", container.container_name);
    push_flag(&mut args, "--network", container.network);
    push_flag(
        &mut args,
        "--volume",
        format!("{}:{}", container.workspace_dir.display(), container.workspace_mount),
    );

    let workdir = env
        .expand_option(task.workspace.as_deref())?
        .filter(|w| !w.is_empty())
        .unwrap_or_else(|| container.workspace_mount.to_string());
    push_flag(&mut args, "--workdir", workdir);

    for line in env.serialize() {
        push_flag(&mut args, "--env", line);
    }

    if let Some(user) = env.expand_option(task.user.as_deref())? {
        push_flag(&mut args, "--user", user);
    }
    if let Some(hostname) = env.expand_option(task.hostname.as_deref())? {
        push_flag(&mut args, "--hostname", hostname);
    }

    let hc = &task.healthcheck;
    if hc.is_declared() {
        if let Some(cmd) = env.expand_option(hc.command.as_deref())? {
            push_flag(&mut args, "--health-cmd", cmd);
        }
        if let Some(interval) = hc.interval.as_deref() {
            push_flag(&mut args, "--health-interval", interval);
        }
        if let Some(retries) = hc.retries {
            push_flag(&mut args, "--health-retries", retries.to_string());
        }
        if let Some(start_period) = hc.start_period.as_deref() {
            push_flag(&mut args, "--health-start-period", start_period);
        }
        if let Some(timeout) = hc.timeout.as_deref() {
            push_flag(&mut args, "--health-timeout", timeout);
        }
    }

    match container.script_path {
        Some(script) => {
            let shell = env
                .expand_option(task.shell.as_deref())?
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_SHELL.to_string());
            push_flag(
                &mut args,
                "--volume",
                format!("{}:{}:ro", script.display(), SCRIPT_MOUNT),
            );
            push_flag(&mut args, "--entrypoint", shell);
            args.push(image);
            args.push(SCRIPT_MOUNT.to_string());
        }
        None => {
            if let Some(entrypoint) = env.expand_option(task.entrypoint.as_deref())? {
                push_flag(&mut args, "--entrypoint", entrypoint);
            }
            args.push(image);
            if let Some(command) = env.expand_option(task.command.as_deref())? {
                args.extend(split_command(&command)?);
            }
        }
    }

    Ok(args)
}

pub fn build_args(task: &BuildTask, env: &Environment, workspace_dir: &Path) -> Result<Vec<String>> {
    let mut args = docker(&["build"]);

    if let Some(dockerfile) = env.expand_option(task.dockerfile.as_deref())? {
        push_flag(
            &mut args,
            "--file",
            workspace_dir.join(dockerfile).display().to_string(),
        );
    }
    if let Some(target) = env.expand_option(task.target.as_deref())? {
        push_flag(&mut args, "--target", target);
    }
    for tag in env.expand_slice(&task.tags)? {
        push_flag(&mut args, "--tag", tag);
    }
    for label in env.expand_slice(&task.labels)? {
        push_flag(&mut args, "--label", label);
    }

    let context = match env.expand_option(task.context.as_deref())? {
        Some(ctx) if !ctx.is_empty() => workspace_dir.join(ctx),
        _ => workspace_dir.to_path_buf(),
    };
    args.push(context.display().to_string());
    Ok(args)
}

pub fn push_args(image: &str) -> Vec<String> {
    docker(&["push", image])
}

pub fn remove_image_args(image: &str) -> Vec<String> {
    docker(&["rmi", image])
}

pub fn login_args(server: &str, username: &str) -> Vec<String> {
    docker(&["login", "--username", username, "--password-stdin", server])
}

pub fn logout_args(server: &str) -> Vec<String> {
    docker(&["logout", server])
}

pub fn network_create_args(network: &str) -> Vec<String> {
    docker(&["network", "create", network])
}

pub fn network_remove_args(network: &str) -> Vec<String> {
    docker(&["network", "rm", network])
}

pub fn network_disconnect_args(network: &str, container: &str) -> Vec<String> {
    docker(&["network", "disconnect", "--force", network, container])
}

pub fn stop_args(container: &str) -> Vec<String> {
    docker(&["stop", container])
}

pub fn health_status_args(container: &str) -> Vec<String> {
    docker(&[
        "inspect",
        "--format",
        "{{if .State.Health}}{{.State.Health.Status}}{{end}}",
        container,
    ])
}

pub fn engine_info_args() -> Vec<String> {
    docker(&["info", "--format", "{{.ServerVersion}}"])
}

/// Split a command string into words, honouring single and double quotes
/// and backslash escapes outside single quotes.
pub fn split_command(command: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some('\''), '\'') | (Some('"'), '"') => quote = None,
            (Some('\''), _) => current.push(c),
            (_, '\\') => match chars.next() {
                Some(next) => {
                    current.push(next);
                    in_word = true;
                }
                None => {
                    return Err(IjError::Execution(format!(
                        "trailing backslash in command: {command}"
                    )));
                }
            },
            (Some(_), _) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, _) => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quote.is_some() {
        return Err(IjError::Execution(format!("unterminated quote in command: {command}")));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}
