// src/engine/task/build.rs

use crate::config::model::BuildTask;
use crate::environment::Environment;
use crate::errors::Result;
use crate::exec::command::build_args;

use super::TaskRunner;

pub(super) async fn run(runner: &TaskRunner, task: &BuildTask, env: &Environment) -> Result<()> {
    let state = &runner.state;
    let args = build_args(task, env, &state.scratch().workspace())?;
    let output = state.scratch().log_files(&runner.prefix);

    state
        .runner()
        .run(state.cancel(), args, None, &runner.prefix, output)
        .await?;

    state.record_built_images(&env.expand_slice(&task.tags)?);
    Ok(())
}
