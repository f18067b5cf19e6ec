// src/engine/network.rs

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::engine::cleanup::Cleanup;
use crate::errors::{IjError, Result};
use crate::exec::ProcessRunner;
use crate::exec::command::{network_create_args, network_remove_args};

/// The container-engine network every container of a run joins.
#[derive(Debug, Clone)]
pub struct Network {
    name: String,
    runner: Arc<dyn ProcessRunner>,
}

impl Network {
    pub fn new(name: impl Into<String>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            name: name.into(),
            runner,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create the network and register its removal.
    pub async fn setup(&self, cancel: &CancellationToken, cleanup: &Cleanup) -> Result<()> {
        self.runner
            .run_for_output(cancel, network_create_args(&self.name), None)
            .await
            .map_err(|e| IjError::Setup(format!("creating network '{}': {e}", self.name)))?;
        info!(network = %self.name, "created network");

        let network = self.clone();
        cleanup.register(format!("network {}", self.name), move || async move {
            network.teardown().await
        });
        Ok(())
    }

    pub async fn teardown(&self) -> Result<()> {
        let cancel = CancellationToken::new();
        self.runner
            .run_for_output(&cancel, network_remove_args(&self.name), None)
            .await?;
        info!(network = %self.name, "removed network");
        Ok(())
    }
}
