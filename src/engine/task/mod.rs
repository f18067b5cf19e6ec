// src/engine/task/mod.rs

//! Task runners.
//!
//! A [`TaskRunner`] executes one task invocation with its fully merged
//! environment. Failures are logged with the task's prefix and reported as a
//! `false` result; they never propagate as errors past the runner.

mod build;
mod images;
mod registry;
mod run;

use std::sync::Arc;

use tracing::{error, info};

use crate::config::model::{PlanTask, Task};
use crate::engine::context::RunContext;
use crate::engine::plan::PlanRunner;
use crate::engine::state::RunState;
use crate::environment::Environment;
use crate::errors::{IjError, Result};
use crate::logging::Prefix;

pub use run::read_export_files;

/// Longest prefix a task may run under. A top-level task sits at depth three
/// and each plan call adds three more (plan, stage, task), so nineteen nested
/// calls fit.
pub const MAX_PREFIX_DEPTH: usize = 60;

#[derive(Debug)]
pub struct TaskRunner {
    state: Arc<RunState>,
    context: Arc<RunContext>,
    task: Task,
    environment: Environment,
    prefix: Prefix,
}

impl TaskRunner {
    pub fn new(
        state: Arc<RunState>,
        context: Arc<RunContext>,
        task: Task,
        environment: Environment,
        prefix: Prefix,
    ) -> Self {
        Self {
            state,
            context,
            task,
            environment,
            prefix,
        }
    }

    pub fn prefix(&self) -> &Prefix {
        &self.prefix
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Run the task to completion. Returns `true` on success.
    pub async fn run(self) -> bool {
        info!(
            prefix = %self.prefix,
            task = %self.task.name(),
            kind = self.task.kind(),
            "Beginning task"
        );

        match self.execute().await {
            Ok(()) => {
                info!(prefix = %self.prefix, "Task succeeded");
                true
            }
            Err(e) => {
                error!(prefix = %self.prefix, error = %e, "Task failed");
                false
            }
        }
    }

    async fn execute(&self) -> Result<()> {
        let missing = self
            .environment
            .missing(&self.task.meta().required_environment);
        if !missing.is_empty() {
            return Err(IjError::MissingEnvironment(missing));
        }

        if self.state.cancel().is_cancelled() {
            return Err(IjError::Execution("run cancelled before task start".to_string()));
        }

        let env = self.environment.normalize()?;
        match &self.task {
            Task::Build(task) => build::run(self, task, &env).await,
            Task::Run(task) => run::run(self, task, &env).await,
            Task::Push(task) => images::push(self, task, &env).await,
            Task::Remove(task) => images::remove(self, task, &env).await,
            Task::Plan(task) => self.call_plan(task, env).await,
            Task::Login(task) => registry::login(self, task, &env).await,
            Task::Logout(_) => registry::logout(self, &env).await,
        }
    }

    async fn call_plan(&self, task: &PlanTask, env: Environment) -> Result<()> {
        if self.prefix.depth() + 3 > MAX_PREFIX_DEPTH {
            return Err(IjError::MaxCallDepth(self.prefix.to_string()));
        }

        let plan = env.expand_string(&task.plan)?;
        let child = RunContext::child_with_environment(&self.context, env);
        let ok = PlanRunner::new(Arc::clone(&self.state))
            .run(plan.clone(), self.prefix.clone(), child)
            .await;

        if ok {
            Ok(())
        } else {
            Err(IjError::Execution(format!("plan '{plan}' failed")))
        }
    }
}
