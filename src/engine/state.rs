// src/engine/state.rs

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::model::Config;
use crate::engine::cleanup::Cleanup;
use crate::engine::containers::{ContainerAction, ContainerList};
use crate::engine::scratch::ScratchSpace;
use crate::exec::ProcessRunner;

/// State shared by every plan, stage and task runner of one run.
#[derive(Debug)]
pub struct RunState {
    config: Arc<Config>,
    runner: Arc<dyn ProcessRunner>,
    scratch: ScratchSpace,
    network: String,
    cleanup: Arc<Cleanup>,
    stop_list: Arc<ContainerList>,
    disconnect_list: Arc<ContainerList>,
    cancel: CancellationToken,
    force_sequential: bool,
    healthcheck_interval: Duration,
    built_images: Mutex<Vec<String>>,
}

impl RunState {
    /// Build run state whose network is named after the scratch run id.
    pub fn new(
        config: Arc<Config>,
        runner: Arc<dyn ProcessRunner>,
        scratch: ScratchSpace,
        cancel: CancellationToken,
    ) -> Self {
        let network = scratch.run_id().to_string();
        let stop_list = ContainerList::new("stop", ContainerAction::Stop, Arc::clone(&runner));
        let disconnect_list = ContainerList::new(
            "network-disconnect",
            ContainerAction::NetworkDisconnect {
                network: network.clone(),
            },
            Arc::clone(&runner),
        );
        let force_sequential = config.options.force_sequential;
        let healthcheck_interval = config.options.effective_healthcheck_interval();

        Self {
            config,
            runner,
            scratch,
            network,
            cleanup: Arc::new(Cleanup::new()),
            stop_list: Arc::new(stop_list),
            disconnect_list: Arc::new(disconnect_list),
            cancel,
            force_sequential,
            healthcheck_interval,
            built_images: Mutex::new(Vec::new()),
        }
    }

    pub fn with_force_sequential(mut self, force_sequential: bool) -> Self {
        self.force_sequential |= force_sequential;
        self
    }

    pub fn with_healthcheck_interval(mut self, interval: Duration) -> Self {
        self.healthcheck_interval = interval;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn runner(&self) -> &Arc<dyn ProcessRunner> {
        &self.runner
    }

    pub fn scratch(&self) -> &ScratchSpace {
        &self.scratch
    }

    pub fn run_id(&self) -> &str {
        self.scratch.run_id()
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn cleanup(&self) -> &Arc<Cleanup> {
        &self.cleanup
    }

    /// Containers to `docker stop` at cleanup.
    pub fn stop_list(&self) -> &Arc<ContainerList> {
        &self.stop_list
    }

    /// Containers to disconnect from the run network at cleanup.
    pub fn disconnect_list(&self) -> &Arc<ContainerList> {
        &self.disconnect_list
    }

    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn force_sequential(&self) -> bool {
        self.force_sequential
    }

    pub fn healthcheck_interval(&self) -> Duration {
        self.healthcheck_interval
    }

    pub fn record_built_images(&self, tags: &[String]) {
        self.lock_built().extend(tags.iter().cloned());
    }

    /// Tags built so far in this run, in build order.
    pub fn built_images(&self) -> Vec<String> {
        self.lock_built().clone()
    }

    /// Register the container lists with the cleanup stack.
    ///
    /// Registration order makes disconnects run before stops.
    pub fn register_container_cleanup(&self) {
        let stop = Arc::clone(&self.stop_list);
        self.cleanup.register("stop containers", move || async move {
            stop.execute().await;
            Ok(())
        });

        let disconnect = Arc::clone(&self.disconnect_list);
        self.cleanup.register("disconnect containers", move || async move {
            disconnect.execute().await;
            Ok(())
        });
    }

    fn lock_built(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.built_images.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
