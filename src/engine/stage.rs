// src/engine/stage.rs

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, warn};

use crate::config::model::{Plan, Stage, StageTask};
use crate::engine::context::RunContext;
use crate::engine::state::RunState;
use crate::engine::task::TaskRunner;
use crate::environment::Environment;
use crate::errors::{IjError, Result};
use crate::logging::Prefix;

/// Runs the tasks of one stage, either one after another or all at once.
#[derive(Debug)]
pub struct StageRunner<'a> {
    state: &'a Arc<RunState>,
    plan: &'a Plan,
    stage: &'a Stage,
    prefix: Prefix,
}

impl<'a> StageRunner<'a> {
    /// `prefix` is the stage's own prefix (`<plan prefix>/<stage>`).
    pub fn new(state: &'a Arc<RunState>, plan: &'a Plan, stage: &'a Stage, prefix: Prefix) -> Self {
        Self {
            state,
            plan,
            stage,
            prefix,
        }
    }

    /// Returns `true` if every task that ran succeeded.
    pub async fn run(&self, context: &Arc<RunContext>) -> bool {
        if self.stage.parallel && !self.state.force_sequential() {
            self.run_parallel(context).await
        } else {
            self.run_sequential(context).await
        }
    }

    async fn run_sequential(&self, context: &Arc<RunContext>) -> bool {
        for (index, stage_task) in self.stage.tasks.iter().enumerate() {
            if self.state.cancel().is_cancelled() {
                warn!(prefix = %self.prefix, "run cancelled; skipping remaining tasks");
                return false;
            }

            // Built per task so exports from earlier tasks are visible.
            let runner = match self.task_runner(context, index, stage_task) {
                Ok(runner) => runner,
                Err(e) => {
                    error!(prefix = %self.prefix, error = %e, "cannot start task");
                    return false;
                }
            };
            if !runner.run().await {
                return false;
            }
        }
        true
    }

    async fn run_parallel(&self, context: &Arc<RunContext>) -> bool {
        let mut failed = false;
        let mut set = JoinSet::new();

        for (index, stage_task) in self.stage.tasks.iter().enumerate() {
            match self.task_runner(context, index, stage_task) {
                Ok(runner) => {
                    set.spawn(runner.run());
                }
                Err(e) => {
                    error!(prefix = %self.prefix, error = %e, "cannot start task");
                    failed = true;
                }
            }
        }

        // Siblings always run to completion.
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(true) => {}
                Ok(false) => failed = true,
                Err(e) => {
                    error!(prefix = %self.prefix, error = %e, "task panicked");
                    failed = true;
                }
            }
        }
        !failed
    }

    /// Build the runner for one stage task.
    ///
    /// Environment precedence, lowest first: task defaults, inherited
    /// context, exported, plan, stage, stage task.
    pub fn task_runner(
        &self,
        context: &Arc<RunContext>,
        index: usize,
        stage_task: &StageTask,
    ) -> Result<TaskRunner> {
        let task = self
            .state
            .config()
            .tasks
            .get(&stage_task.name)
            .ok_or_else(|| IjError::UnknownReference {
                kind: "task",
                name: stage_task.name.clone(),
                referrer: format!("{}/{}", self.plan.name, self.stage.name),
            })?;

        let environment = Environment::merge([
            &Environment::from_lines(&task.meta().environment),
            context.environment(),
            &Environment::from_lines(context.exported_env()),
            &Environment::from_lines(&self.plan.environment),
            &Environment::from_lines(&self.stage.environment),
            &Environment::from_lines(&stage_task.environment),
        ]);

        Ok(TaskRunner::new(
            Arc::clone(self.state),
            Arc::clone(context),
            task.clone(),
            environment,
            self.prefix.append(format!("{}.{index}", stage_task.name)),
        ))
    }
}
