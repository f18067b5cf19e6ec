// src/engine/context.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::environment::Environment;

/// Per-invocation execution state, forming a parent-linked tree.
///
/// A new node is created for the top-level run and for every plan task. The
/// node snapshots its parent's failure flag and environment at construction;
/// later changes to the parent are not seen. Exported environment lines live
/// at the root only, so every descendant reads and appends the same list.
#[derive(Debug)]
pub struct RunContext {
    parent: Option<Arc<RunContext>>,
    failure: AtomicBool,
    environment: Environment,
    exported_env: Mutex<Vec<String>>,
}

impl RunContext {
    pub fn root(environment: Environment) -> Arc<Self> {
        Arc::new(Self {
            parent: None,
            failure: AtomicBool::new(false),
            environment,
            exported_env: Mutex::new(Vec::new()),
        })
    }

    /// Child snapshotting the parent's failure flag and environment.
    pub fn child(parent: &Arc<RunContext>) -> Arc<Self> {
        Self::child_with_environment(parent, parent.environment.clone())
    }

    /// Child snapshotting the parent's failure flag, carrying `environment`.
    pub fn child_with_environment(parent: &Arc<RunContext>, environment: Environment) -> Arc<Self> {
        Arc::new(Self {
            parent: Some(Arc::clone(parent)),
            failure: AtomicBool::new(parent.failed()),
            environment,
            exported_env: Mutex::new(Vec::new()),
        })
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn failed(&self) -> bool {
        self.failure.load(Ordering::SeqCst)
    }

    pub fn mark_failed(&self) {
        self.failure.store(true, Ordering::SeqCst);
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Append a `KEY=VALUE` line to the run-wide exported environment.
    pub fn export_env(&self, line: impl Into<String>) {
        self.root_node().lock_exported().push(line.into());
    }

    /// Copy of the run-wide exported environment, in export order.
    pub fn exported_env(&self) -> Vec<String> {
        self.root_node().lock_exported().clone()
    }

    fn root_node(&self) -> &RunContext {
        let mut node = self;
        while let Some(parent) = node.parent.as_deref() {
            node = parent;
        }
        node
    }

    fn lock_exported(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.exported_env.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
