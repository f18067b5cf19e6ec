// src/engine/containers.rs

//! Tracking of containers that need a terminal action at cleanup time.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::exec::ProcessRunner;
use crate::exec::command::{network_disconnect_args, stop_args};

/// What to do with each tracked container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerAction {
    Stop,
    NetworkDisconnect { network: String },
}

impl ContainerAction {
    fn args(&self, container: &str) -> Vec<String> {
        match self {
            ContainerAction::Stop => stop_args(container),
            ContainerAction::NetworkDisconnect { network } => {
                network_disconnect_args(network, container)
            }
        }
    }
}

/// A named set of container ids awaiting `action`.
///
/// Every container is added before it is started, so cleanup can always find
/// it; containers whose work is finished remove themselves.
#[derive(Debug)]
pub struct ContainerList {
    name: String,
    action: ContainerAction,
    runner: Arc<dyn ProcessRunner>,
    members: Mutex<BTreeSet<String>>,
}

impl ContainerList {
    pub fn new(
        name: impl Into<String>,
        action: ContainerAction,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            name: name.into(),
            action,
            runner,
            members: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn add(&self, container: &str) {
        self.lock().insert(container.to_string());
    }

    pub fn remove(&self, container: &str) {
        self.lock().remove(container);
    }

    pub fn contains(&self, container: &str) -> bool {
        self.lock().contains(container)
    }

    pub fn members(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    /// Apply the action to every current member concurrently and wait for
    /// all of them. Failures are logged per member and never abort the batch.
    pub async fn execute(&self) {
        let members = self.members();
        if members.is_empty() {
            return;
        }
        debug!(list = %self.name, count = members.len(), "executing container list");

        // Cleanup runs after cancellation too, so use a fresh token.
        let cancel = CancellationToken::new();
        let mut set = JoinSet::new();

        for container in members {
            let runner = Arc::clone(&self.runner);
            let args = self.action.args(&container);
            let cancel = cancel.clone();
            set.spawn(async move {
                let result = runner.run_for_output(&cancel, args, None).await;
                (container, result)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(_))) => {}
                Ok((container, Err(e))) => {
                    warn!(list = %self.name, container = %container, error = %e, "container action failed");
                }
                Err(e) => {
                    warn!(list = %self.name, error = %e, "container action panicked");
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        self.members.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
