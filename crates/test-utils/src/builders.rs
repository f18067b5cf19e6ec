#![allow(dead_code)]

use ij::config::{
    BuildTask, Config, LoginTask, LogoutTask, Plan, PlanTask, PushTask, RawConfig, Registry,
    RemoveTask, RunMode, RunTask, Stage, StageTask, Task,
};

/// Builder for `Config` to simplify test setup.
pub struct ConfigBuilder {
    config: RawConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfig::default(),
        }
    }

    pub fn with_task(mut self, name: &str, task: Task) -> Self {
        self.config.tasks.insert(name.to_string(), task);
        self
    }

    pub fn with_plan(mut self, name: &str, plan: Plan) -> Self {
        self.config.plans.insert(name.to_string(), plan);
        self
    }

    pub fn with_metaplan(mut self, name: &str, members: &[&str]) -> Self {
        self.config.metaplans.insert(
            name.to_string(),
            members.iter().map(|m| m.to_string()).collect(),
        );
        self
    }

    pub fn with_environment(mut self, line: &str) -> Self {
        self.config.environment.push(line.to_string());
        self
    }

    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.config.registries.push(registry);
        self
    }

    pub fn force_sequential(mut self) -> Self {
        self.config.options.force_sequential = true;
        self
    }

    pub fn healthcheck_interval(mut self, interval: &str) -> Self {
        self.config.options.healthcheck_interval = Some(interval.to_string());
        self
    }

    pub fn with_export(mut self, pattern: &str) -> Self {
        self.config.export.files.push(pattern.to_string());
        self
    }

    pub fn with_import(mut self, pattern: &str) -> Self {
        self.config.import.files.push(pattern.to_string());
        self
    }

    pub fn build_raw(self) -> RawConfig {
        self.config
    }

    pub fn build(self) -> Config {
        Config::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for any `Task` variant, wrapping the shared metadata setters.
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    /// `run` task with an image and a command.
    pub fn run(image: &str, command: &str) -> Self {
        Self {
            task: Task::Run(RunTask {
                image: Some(image.to_string()),
                command: Some(command.to_string()),
                ..Default::default()
            }),
        }
    }

    /// Detached `run` task with a healthcheck command.
    pub fn service(image: &str, health_cmd: &str) -> Self {
        let mut task = RunTask {
            image: Some(image.to_string()),
            detach: true,
            ..Default::default()
        };
        task.healthcheck.command = Some(health_cmd.to_string());
        Self {
            task: Task::Run(task),
        }
    }

    pub fn build_image(tags: &[&str]) -> Self {
        Self {
            task: Task::Build(BuildTask {
                tags: tags.iter().map(|t| t.to_string()).collect(),
                ..Default::default()
            }),
        }
    }

    pub fn push(images: &[&str], include_built: bool) -> Self {
        Self {
            task: Task::Push(PushTask {
                images: images.iter().map(|t| t.to_string()).collect(),
                include_built,
                ..Default::default()
            }),
        }
    }

    pub fn remove(images: &[&str], include_built: bool) -> Self {
        Self {
            task: Task::Remove(RemoveTask {
                images: images.iter().map(|t| t.to_string()).collect(),
                include_built,
                ..Default::default()
            }),
        }
    }

    pub fn call_plan(plan: &str) -> Self {
        Self {
            task: Task::Plan(PlanTask {
                plan: plan.to_string(),
                ..Default::default()
            }),
        }
    }

    pub fn login() -> Self {
        Self {
            task: Task::Login(LoginTask::default()),
        }
    }

    /// `login` task limited to the named registry servers.
    pub fn login_to(servers: &[&str]) -> Self {
        Self {
            task: Task::Login(LoginTask {
                registries: servers.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }),
        }
    }

    pub fn logout() -> Self {
        Self {
            task: Task::Logout(LogoutTask::default()),
        }
    }

    pub fn env(mut self, line: &str) -> Self {
        self.task.meta_mut().environment.push(line.to_string());
        self
    }

    pub fn requires(mut self, key: &str) -> Self {
        self.task.meta_mut().required_environment.push(key.to_string());
        self
    }

    pub fn extends(mut self, parent: &str) -> Self {
        self.task.meta_mut().extends = Some(parent.to_string());
        self
    }

    /// Mutate the inner `RunTask`. Panics for other variants.
    pub fn with_run(mut self, f: impl FnOnce(&mut RunTask)) -> Self {
        match &mut self.task {
            Task::Run(run) => f(run),
            other => panic!("with_run on a {} task", other.kind()),
        }
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

/// Builder for `Plan`.
pub struct PlanBuilder {
    plan: Plan,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self {
            plan: Plan::default(),
        }
    }

    pub fn env(mut self, line: &str) -> Self {
        self.plan.environment.push(line.to_string());
        self
    }

    pub fn extend(mut self) -> Self {
        self.plan.extend = true;
        self
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.plan.stages.push(stage);
        self
    }

    pub fn build(self) -> Plan {
        self.plan
    }
}

impl Default for PlanBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `Stage`.
pub struct StageBuilder {
    stage: Stage,
}

impl StageBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            stage: Stage {
                name: name.to_string(),
                ..Default::default()
            },
        }
    }

    pub fn task(mut self, name: &str) -> Self {
        self.stage.tasks.push(StageTask::named(name));
        self
    }

    pub fn task_with_env(mut self, name: &str, env: &[&str]) -> Self {
        self.stage.tasks.push(StageTask {
            name: name.to_string(),
            environment: env.iter().map(|e| e.to_string()).collect(),
        });
        self
    }

    pub fn env(mut self, line: &str) -> Self {
        self.stage.environment.push(line.to_string());
        self
    }

    pub fn parallel(mut self) -> Self {
        self.stage.parallel = true;
        self
    }

    pub fn run_mode(mut self, mode: RunMode) -> Self {
        self.stage.run_mode = mode;
        self
    }

    pub fn before(mut self, anchor: &str) -> Self {
        self.stage.before_stage = Some(anchor.to_string());
        self
    }

    pub fn after(mut self, anchor: &str) -> Self {
        self.stage.after_stage = Some(anchor.to_string());
        self
    }

    pub fn build(self) -> Stage {
        self.stage
    }
}
