// src/engine/plan.rs

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::config::model::Plan;
use crate::engine::context::RunContext;
use crate::engine::stage::StageRunner;
use crate::engine::state::RunState;
use crate::exec::BoxFuture;
use crate::logging::Prefix;

/// Runs plans and metaplans by name.
#[derive(Debug, Clone)]
pub struct PlanRunner {
    state: Arc<RunState>,
}

impl PlanRunner {
    pub fn new(state: Arc<RunState>) -> Self {
        Self { state }
    }

    /// Run the plan or metaplan `name` under `prefix`.
    ///
    /// Metaplans run their members in order and stop at the first failing
    /// member. Plans run every stage whose run mode admits the current
    /// failure state; the result is `false` if any executed stage failed.
    ///
    /// Boxed because plan tasks recurse back into this runner.
    pub fn run(&self, name: String, prefix: Prefix, context: Arc<RunContext>) -> BoxFuture<'static, bool> {
        let runner = self.clone();
        Box::pin(async move { runner.run_named(&name, &prefix, &context).await })
    }

    async fn run_named(&self, name: &str, prefix: &Prefix, context: &Arc<RunContext>) -> bool {
        let config = self.state.config();

        if let Some(members) = config.metaplans.get(name) {
            debug!(prefix = %prefix, metaplan = %name, ?members, "running metaplan");
            for member in members {
                if !self.run(member.clone(), prefix.clone(), Arc::clone(context)).await {
                    return false;
                }
            }
            return true;
        }

        match config.plans.get(name) {
            Some(plan) => self.run_plan(plan, prefix.append(name), context).await,
            None => {
                error!(prefix = %prefix, plan = %name, "no plan or metaplan with this name");
                false
            }
        }
    }

    async fn run_plan(&self, plan: &Plan, prefix: Prefix, context: &Arc<RunContext>) -> bool {
        info!(prefix = %prefix, "Beginning plan");
        let mut failed = false;

        for stage in &plan.stages {
            let stage_prefix = prefix.append(&stage.name);
            if !stage.run_mode.should_run(context.failed()) {
                debug!(prefix = %stage_prefix, run_mode = ?stage.run_mode, "skipping stage");
                continue;
            }

            info!(prefix = %stage_prefix, "Beginning stage");
            let ok = StageRunner::new(&self.state, plan, stage, stage_prefix.clone())
                .run(context)
                .await;
            if !ok {
                error!(prefix = %stage_prefix, "Stage failed");
                context.mark_failed();
                failed = true;
            }
        }

        if failed {
            error!(prefix = %prefix, "Plan failed");
        } else {
            info!(prefix = %prefix, "Plan succeeded");
        }
        !failed
    }
}
