// src/engine/task/images.rs

//! Push and remove tasks. Both act on a list of images, optionally extended
//! with every tag built earlier in the run.

use tracing::debug;

use crate::config::model::{PushTask, RemoveTask};
use crate::environment::Environment;
use crate::errors::Result;
use crate::exec::OutputFiles;
use crate::exec::command::{push_args, remove_image_args};

use super::TaskRunner;

fn collect_images(
    runner: &TaskRunner,
    images: &[String],
    include_built: bool,
    env: &Environment,
) -> Result<Vec<String>> {
    let mut all = env.expand_slice(images)?;
    if include_built {
        for image in runner.state.built_images() {
            if !all.contains(&image) {
                all.push(image);
            }
        }
    }
    Ok(all)
}

pub(super) async fn push(runner: &TaskRunner, task: &PushTask, env: &Environment) -> Result<()> {
    let images = collect_images(runner, &task.images, task.include_built, env)?;
    if images.is_empty() {
        debug!(prefix = %runner.prefix, "no images to push");
    }

    let state = &runner.state;
    for image in images {
        state
            .runner()
            .run(
                state.cancel(),
                push_args(&image),
                None,
                &runner.prefix,
                OutputFiles::default(),
            )
            .await?;
    }
    Ok(())
}

pub(super) async fn remove(runner: &TaskRunner, task: &RemoveTask, env: &Environment) -> Result<()> {
    let images = collect_images(runner, &task.images, task.include_built, env)?;

    let state = &runner.state;
    for image in images {
        state
            .runner()
            .run(
                state.cancel(),
                remove_image_args(&image),
                None,
                &runner.prefix,
                OutputFiles::default(),
            )
            .await?;
    }
    Ok(())
}
