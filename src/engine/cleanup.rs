// src/engine/cleanup.rs

//! LIFO teardown stack shared by everything that acquires run-scoped
//! resources.

use std::future::Future;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::errors::Result;
use crate::exec::BoxFuture;

type CleanupFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

/// Ordered list of teardown steps.
///
/// Steps run in reverse registration order, exactly once. A failing step is
/// logged and does not stop the steps registered before it.
#[derive(Default)]
pub struct Cleanup {
    steps: Mutex<Vec<(String, CleanupFn)>>,
}

impl std::fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.lock().iter().map(|(name, _)| name.clone()).collect();
        f.debug_struct("Cleanup").field("steps", &names).finish()
    }
}

impl Cleanup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a teardown step.
    pub fn register<F, Fut>(&self, name: impl Into<String>, step: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let boxed: CleanupFn = Box::new(move || Box::pin(step()));
        self.lock().push((name.into(), boxed));
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Run every registered step, last registered first.
    ///
    /// Steps are drained, so a second call is a no-op.
    pub async fn cleanup(&self) {
        let steps = std::mem::take(&mut *self.lock());

        for (name, step) in steps.into_iter().rev() {
            debug!(step = %name, "running cleanup step");
            if let Err(e) = step().await {
                warn!(step = %name, error = %e, "cleanup step failed");
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, CleanupFn)>> {
        // A panic while holding the lock cannot leave the list half-updated.
        self.steps.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
