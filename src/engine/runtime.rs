// src/engine/runtime.rs

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::model::Config;
use crate::engine::context::RunContext;
use crate::engine::network::Network;
use crate::engine::plan::PlanRunner;
use crate::engine::registry::RegistrySet;
use crate::engine::scratch::ScratchSpace;
use crate::engine::state::RunState;
use crate::environment::Environment;
use crate::errors::{IjError, Result};
use crate::exec::ProcessRunner;
use crate::exec::command::engine_info_args;
use crate::logging::Prefix;
use crate::workspace::copy_matching;

/// Plan run when none is named.
pub const DEFAULT_PLAN: &str = "default";

/// Per-invocation options, mostly from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Plans or metaplans to run, in order. Empty means [`DEFAULT_PLAN`].
    pub plans: Vec<String>,
    pub project_dir: PathBuf,
    /// Extra `KEY=VALUE` lines layered over the config environment.
    pub environment: Vec<String>,
    pub force_sequential: bool,
    pub healthcheck_interval: Option<Duration>,
    pub keep_workspace: bool,
    pub login: bool,
    pub ssh_identities: Vec<String>,
    pub timeout: Option<Duration>,
    /// Fixed run id; a fresh one is generated when unset.
    pub run_id: Option<String>,
}

impl RunOptions {
    pub fn plans(&self) -> Vec<String> {
        if self.plans.is_empty() {
            vec![DEFAULT_PLAN.to_string()]
        } else {
            self.plans.clone()
        }
    }
}

/// One complete run: setup, plans, cleanup.
pub struct Runtime {
    config: Arc<Config>,
    runner: Arc<dyn ProcessRunner>,
    options: RunOptions,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(config: Arc<Config>, runner: Arc<dyn ProcessRunner>, options: RunOptions) -> Self {
        Self {
            config,
            runner,
            options,
        }
    }

    /// Run the requested plans.
    ///
    /// Returns `Ok(false)` if any plan failed, and an error if the run could
    /// not be set up. Cleanup runs in every case.
    pub async fn run(self) -> Result<bool> {
        let plans = self.options.plans();
        for plan in &plans {
            if !self.config.is_plan_or_metaplan(plan) {
                return Err(IjError::UnknownReference {
                    kind: "plan",
                    name: plan.clone(),
                    referrer: "command line".to_string(),
                });
            }
        }

        let cancel = CancellationToken::new();
        let signals = spawn_signal_listener(cancel.clone());
        let timer = self.options.timeout.map(|t| spawn_timeout(cancel.clone(), t));

        let run_id = self
            .options
            .run_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        info!(run_id = %run_id, ?plans, "starting run");

        let scratch = ScratchSpace::new(&self.options.project_dir, run_id, self.options.keep_workspace);
        let mut state = RunState::new(
            Arc::clone(&self.config),
            Arc::clone(&self.runner),
            scratch,
            cancel.clone(),
        )
        .with_force_sequential(self.options.force_sequential);
        if let Some(interval) = self.options.healthcheck_interval {
            state = state.with_healthcheck_interval(interval);
        }
        let state = Arc::new(state);

        // Spawned so a panic surfaces as a JoinError and cleanup still runs.
        let runtime = Arc::new(self);
        let work = {
            let state = Arc::clone(&state);
            tokio::spawn(async move { runtime.run_with_state(&state, plans).await })
        };
        let result = match work.await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "run aborted");
                Ok(false)
            }
        };

        info!("cleaning up");
        state.cleanup().cleanup().await;

        signals.abort();
        if let Some(timer) = timer {
            timer.abort();
        }

        match &result {
            Ok(true) => info!("run succeeded"),
            Ok(false) => error!("run failed"),
            Err(e) => error!(error = %e, "run setup failed"),
        }
        result
    }

    async fn run_with_state(&self, state: &Arc<RunState>, plans: Vec<String>) -> Result<bool> {
        let environment = Environment::from_lines(
            self.config
                .environment
                .iter()
                .chain(self.options.environment.iter()),
        );

        self.setup(state, &environment).await?;

        let context = RunContext::root(environment);
        let runner = PlanRunner::new(Arc::clone(state));
        for plan in plans {
            if !runner.run(plan, Prefix::root(), Arc::clone(&context)).await {
                return Ok(false);
            }
        }

        let scratch = state.scratch();
        match copy_matching(&scratch.workspace(), scratch.project_dir(), &self.config.export) {
            Ok(files) => {
                if !files.is_empty() {
                    info!(count = files.len(), "exported files from workspace");
                }
                Ok(true)
            }
            Err(e) => {
                error!(error = %e, "exporting files from workspace failed");
                Ok(false)
            }
        }
    }

    /// Acquire run resources. Each one registers its own teardown, so a
    /// failure part way leaves only registered resources behind.
    async fn setup(&self, state: &Arc<RunState>, environment: &Environment) -> Result<()> {
        let cancel = state.cancel();
        let cleanup = state.cleanup();
        let scratch = state.scratch().clone();

        if let Err(e) = scratch.setup() {
            discard_scratch(&scratch);
            return Err(IjError::Setup(format!("creating scratch space: {e}")));
        }

        let imported = match copy_matching(scratch.project_dir(), &scratch.workspace(), &self.config.import) {
            Ok(imported) => imported,
            Err(e) => {
                discard_scratch(&scratch);
                return Err(IjError::Setup(format!("importing files into workspace: {e:#}")));
            }
        };
        if !imported.is_empty() {
            info!(count = imported.len(), "imported files into workspace");
        }
        {
            let scratch = scratch.clone();
            cleanup.register("prune scratch space", move || async move { scratch.prune() });
        }

        self.runner
            .run_for_output(cancel, engine_info_args(), None)
            .await
            .map_err(|e| IjError::Setup(format!("container engine is not reachable: {e}")))?;

        Network::new(state.network(), Arc::clone(&self.runner))
            .setup(cancel, cleanup)
            .await?;
        state.register_container_cleanup();

        let identities: Vec<&String> = self
            .config
            .options
            .ssh_identities
            .iter()
            .chain(self.options.ssh_identities.iter())
            .collect();
        if !identities.is_empty() {
            warn!(?identities, "ssh identities are not forwarded into containers; ignoring");
        }

        if self.options.login {
            let registries = Arc::new(RegistrySet::new(
                self.config.registries.clone(),
                environment.clone(),
                Arc::clone(&self.runner),
                scratch.project_dir(),
            ));
            registries
                .login(cancel, Some(cleanup.as_ref()))
                .await
                .map_err(|e| IjError::Setup(format!("registry login: {e}")))?;
        }

        Ok(())
    }
}

/// Remove a partially prepared run directory.
fn discard_scratch(scratch: &ScratchSpace) {
    if let Err(e) = scratch.teardown() {
        warn!(error = %e, run_dir = %scratch.run_dir().display(), "failed to remove scratch space");
    }
}

/// Cancel `cancel` on the first SIGINT or SIGTERM, then stop listening.
fn spawn_signal_listener(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(()) => {
                warn!("termination signal received; cancelling run");
                cancel.cancel();
            }
            Err(e) => warn!(error = %e, "failed to listen for termination signals"),
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

fn spawn_timeout(cancel: CancellationToken, timeout: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        warn!(?timeout, "run timed out; cancelling");
        cancel.cancel();
    })
}
