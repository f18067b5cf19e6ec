pub mod builders;
pub mod fake_runner;

use std::path::Path;
use std::sync::{Arc, Once};

use ij::config::Config;
use ij::engine::{RunState, ScratchSpace};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt};

use crate::fake_runner::FakeRunner;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Run state over `config` and `runner`, with scratch space created under
/// `project_dir` and run id `test-run`.
pub fn run_state(config: Config, runner: Arc<FakeRunner>, project_dir: &Path) -> Arc<RunState> {
    run_state_with_cancel(config, runner, project_dir, CancellationToken::new())
}

pub fn run_state_with_cancel(
    config: Config,
    runner: Arc<FakeRunner>,
    project_dir: &Path,
    cancel: CancellationToken,
) -> Arc<RunState> {
    let scratch = ScratchSpace::new(project_dir, "test-run", false);
    scratch.setup().expect("creating scratch space");
    Arc::new(RunState::new(Arc::new(config), runner, scratch, cancel))
}
