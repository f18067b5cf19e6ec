// src/config/merge.rs

//! Cascading one config onto another.
//!
//! Used both for `extends:` between config files and for override files.
//! The receiver is the parent; the argument is the child whose entries win.

use tracing::debug;

use crate::config::model::{FileList, Plan, RawConfig, Stage};
use crate::errors::{IjError, Result};

impl RawConfig {
    /// Merge `child` on top of `self`.
    ///
    /// - environment, registries: parent entries then child entries
    /// - tasks: union, a child task replaces a parent task of the same name
    /// - plans: replaced, unless the child plan sets `extend`, in which case
    ///   its stages are merged into the parent plan (see [`merge_plan`])
    /// - metaplans: union, child wins
    pub fn merge(&mut self, child: RawConfig) -> Result<()> {
        self.environment.extend(child.environment);
        self.registries.extend(child.registries);

        if child.workspace.as_deref().is_some_and(|w| !w.is_empty()) {
            self.workspace = child.workspace;
        }

        merge_file_list(&mut self.import, child.import);
        merge_file_list(&mut self.export, child.export);

        for (name, task) in child.tasks {
            if self.tasks.insert(name.clone(), task).is_some() {
                debug!(task = %name, "task overridden by child config");
            }
        }

        for (name, plan) in child.plans {
            match self.plans.get_mut(&name) {
                Some(parent) if plan.extend => merge_plan(parent, plan)?,
                _ => {
                    self.plans.insert(name, plan);
                }
            }
        }

        for (name, members) in child.metaplans {
            self.metaplans.insert(name, members);
        }

        self.options.force_sequential |= child.options.force_sequential;
        if child.options.healthcheck_interval.is_some() {
            self.options.healthcheck_interval = child.options.healthcheck_interval;
        }
        self.options
            .ssh_identities
            .extend(child.options.ssh_identities);

        // The merged result has already absorbed the chain.
        self.extends = None;
        Ok(())
    }
}

fn merge_file_list(parent: &mut FileList, child: FileList) {
    parent.files.extend(child.files);
    parent.exclude.extend(child.exclude);
}

/// Merge the stages of `child` into `parent`, in child declaration order.
pub fn merge_plan(parent: &mut Plan, child: Plan) -> Result<()> {
    parent.environment.extend(child.environment);
    for stage in child.stages {
        insert_stage(&parent.name, &mut parent.stages, stage)?;
    }
    Ok(())
}

/// Place `stage` into `stages`:
///
/// 1. a stage of the same name is replaced in place (no anchor allowed)
/// 2. `before_stage` inserts immediately before the anchor
/// 3. `after_stage` inserts immediately after the anchor
/// 4. otherwise the stage is appended
///
/// Declaring both anchors is always an error. Unrelated stages never move.
pub fn insert_stage(plan: &str, stages: &mut Vec<Stage>, stage: Stage) -> Result<()> {
    if stage.before_stage.is_some() && stage.after_stage.is_some() {
        return Err(IjError::StageAnchorConflict {
            plan: plan.to_string(),
            stage: stage.name,
        });
    }

    if let Some(idx) = position_of(stages, &stage.name) {
        if stage.before_stage.is_some() || stage.after_stage.is_some() {
            return Err(IjError::AmbiguousStageOverride {
                plan: plan.to_string(),
                stage: stage.name,
            });
        }
        stages[idx] = stage;
        return Ok(());
    }

    let idx = match (&stage.before_stage, &stage.after_stage) {
        (Some(anchor), _) => anchor_position(plan, stages, &stage.name, anchor)?,
        (_, Some(anchor)) => anchor_position(plan, stages, &stage.name, anchor)? + 1,
        (None, None) => stages.len(),
    };
    stages.insert(idx, stage);
    Ok(())
}

fn position_of(stages: &[Stage], name: &str) -> Option<usize> {
    stages.iter().position(|s| s.name == name)
}

fn anchor_position(plan: &str, stages: &[Stage], stage: &str, anchor: &str) -> Result<usize> {
    position_of(stages, anchor).ok_or_else(|| IjError::StageNotDeclared {
        plan: plan.to_string(),
        stage: stage.to_string(),
        anchor: anchor.to_string(),
    })
}
