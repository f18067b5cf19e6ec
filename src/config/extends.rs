// src/config/extends.rs

//! Single-parent inheritance between task definitions.
//!
//! A task naming another task in `extends` takes every field it leaves unset
//! from its parent:
//! - scalar fields keep the child's value if non-empty, else the parent's
//! - list fields become `parent ++ child`
//! - boolean fields become `child || parent`
//!
//! Chains are applied root-to-leaf, so a field set anywhere along the chain
//! is visible in every descendant that does not set it itself.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::config::model::{
    BuildTask, Healthcheck, LoginTask, LogoutTask, PlanTask, PushTask, RemoveTask, RunTask,
    Task, TaskMeta,
};
use crate::errors::{IjError, Result};

/// Resolve every `extends` reference in `tasks`.
///
/// Works on a copy: on error the caller's map is left untouched.
pub fn resolve_extends(tasks: &mut BTreeMap<String, Task>) -> Result<()> {
    let mut resolver = ExtendsResolver::new(tasks.clone());
    resolver.resolve_all()?;
    *tasks = resolver.into_tasks();
    Ok(())
}

/// Depth-first resolver tracking finished and in-progress task names.
#[derive(Debug)]
pub struct ExtendsResolver {
    tasks: BTreeMap<String, Task>,
    resolved: HashSet<String>,
    resolving: HashSet<String>,
}

impl ExtendsResolver {
    pub fn new(tasks: BTreeMap<String, Task>) -> Self {
        Self {
            tasks,
            resolved: HashSet::new(),
            resolving: HashSet::new(),
        }
    }

    pub fn resolve_all(&mut self) -> Result<()> {
        let names: Vec<String> = self.tasks.keys().cloned().collect();
        for name in names {
            self.resolve(&name)?;
        }
        Ok(())
    }

    pub fn into_tasks(self) -> BTreeMap<String, Task> {
        self.tasks
    }

    fn resolve(&mut self, name: &str) -> Result<()> {
        if self.resolved.contains(name) {
            return Ok(());
        }

        let parent_name = match self.tasks.get(name).and_then(|t| t.meta().extends.clone()) {
            Some(parent) if !parent.is_empty() => parent,
            _ => {
                self.resolved.insert(name.to_string());
                return Ok(());
            }
        };

        if !self.tasks.contains_key(&parent_name) {
            return Err(IjError::UnknownReference {
                kind: "task",
                name: parent_name,
                referrer: name.to_string(),
            });
        }

        if !self.resolving.insert(name.to_string()) {
            return Err(IjError::CyclicExtends(name.to_string()));
        }

        self.resolve(&parent_name)?;

        let parent = self.tasks[&parent_name].clone();
        if let Some(child) = self.tasks.get_mut(name) {
            child.extend(&parent)?;
        }
        debug!(task = %name, parent = %parent_name, "resolved task extends");

        self.resolving.remove(name);
        self.resolved.insert(name.to_string());
        Ok(())
    }
}

/// Field backfill from a parent of the same shape.
pub trait Extend {
    fn extend_from(&mut self, parent: &Self);
}

impl Task {
    /// Backfill this task from `parent`; both must be the same variant.
    pub fn extend(&mut self, parent: &Task) -> Result<()> {
        match (&mut *self, parent) {
            (Task::Build(c), Task::Build(p)) => c.extend_from(p),
            (Task::Run(c), Task::Run(p)) => c.extend_from(p),
            (Task::Push(c), Task::Push(p)) => c.extend_from(p),
            (Task::Remove(c), Task::Remove(p)) => c.extend_from(p),
            (Task::Plan(c), Task::Plan(p)) => c.extend_from(p),
            (Task::Login(c), Task::Login(p)) => c.extend_from(p),
            (Task::Logout(c), Task::Logout(p)) => c.extend_from(p),
            (child, parent) => {
                return Err(IjError::MismatchedExtends {
                    child: child.name().to_string(),
                    child_kind: child.kind(),
                    parent: parent.name().to_string(),
                    parent_kind: parent.kind(),
                });
            }
        }
        Ok(())
    }
}

fn extend_string(child: &mut Option<String>, parent: &Option<String>) {
    if child.as_deref().is_none_or(str::is_empty) {
        child.clone_from(parent);
    }
}

fn extend_scalar<T: Clone>(child: &mut Option<T>, parent: &Option<T>) {
    if child.is_none() {
        child.clone_from(parent);
    }
}

fn extend_list(child: &mut Vec<String>, parent: &[String]) {
    let mut merged = parent.to_vec();
    merged.append(child);
    *child = merged;
}

fn extend_bool(child: &mut bool, parent: bool) {
    *child = *child || parent;
}

impl Extend for TaskMeta {
    fn extend_from(&mut self, parent: &Self) {
        extend_list(&mut self.environment, &parent.environment);
        extend_list(&mut self.required_environment, &parent.required_environment);
    }
}

impl Extend for BuildTask {
    fn extend_from(&mut self, parent: &Self) {
        self.meta.extend_from(&parent.meta);
        extend_string(&mut self.dockerfile, &parent.dockerfile);
        extend_string(&mut self.context, &parent.context);
        extend_string(&mut self.target, &parent.target);
        extend_list(&mut self.tags, &parent.tags);
        extend_list(&mut self.labels, &parent.labels);
    }
}

impl Extend for RunTask {
    fn extend_from(&mut self, parent: &Self) {
        self.meta.extend_from(&parent.meta);
        extend_string(&mut self.image, &parent.image);
        extend_string(&mut self.command, &parent.command);
        extend_string(&mut self.shell, &parent.shell);
        extend_string(&mut self.script, &parent.script);
        extend_string(&mut self.entrypoint, &parent.entrypoint);
        extend_string(&mut self.user, &parent.user);
        extend_string(&mut self.workspace, &parent.workspace);
        extend_string(&mut self.hostname, &parent.hostname);
        extend_bool(&mut self.detach, parent.detach);
        self.healthcheck.extend_from(&parent.healthcheck);
        extend_list(
            &mut self.export_environment_files,
            &parent.export_environment_files,
        );
    }
}

impl Extend for Healthcheck {
    fn extend_from(&mut self, parent: &Self) {
        extend_string(&mut self.command, &parent.command);
        extend_string(&mut self.interval, &parent.interval);
        extend_scalar(&mut self.retries, &parent.retries);
        extend_string(&mut self.start_period, &parent.start_period);
        extend_string(&mut self.timeout, &parent.timeout);
    }
}

impl Extend for PushTask {
    fn extend_from(&mut self, parent: &Self) {
        self.meta.extend_from(&parent.meta);
        extend_list(&mut self.images, &parent.images);
        extend_bool(&mut self.include_built, parent.include_built);
    }
}

impl Extend for RemoveTask {
    fn extend_from(&mut self, parent: &Self) {
        self.meta.extend_from(&parent.meta);
        extend_list(&mut self.images, &parent.images);
        extend_bool(&mut self.include_built, parent.include_built);
    }
}

impl Extend for PlanTask {
    fn extend_from(&mut self, parent: &Self) {
        self.meta.extend_from(&parent.meta);
        if self.plan.is_empty() {
            self.plan.clone_from(&parent.plan);
        }
    }
}

impl Extend for LoginTask {
    fn extend_from(&mut self, parent: &Self) {
        self.meta.extend_from(&parent.meta);
        extend_list(&mut self.registries, &parent.registries);
    }
}

impl Extend for LogoutTask {
    fn extend_from(&mut self, parent: &Self) {
        self.meta.extend_from(&parent.meta);
    }
}
