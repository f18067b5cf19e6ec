use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use ij::errors::{IjError, Result};
use ij::exec::{BoxFuture, OutputFiles, ProcessRunner};
use ij::logging::Prefix;
use tokio_util::sync::CancellationToken;

/// A fake process runner that:
/// - records every argument vector it is asked to run
/// - fails any command whose joined argv contains a configured needle
/// - answers `run_for_output` with canned stdout for matching commands
#[derive(Debug, Default)]
pub struct FakeRunner {
    calls: Mutex<Vec<Vec<String>>>,
    prefixes: Mutex<Vec<String>>,
    failures: Mutex<Vec<String>>,
    responses: Mutex<Vec<(String, VecDeque<String>)>>,
    delay: Option<Duration>,
    slow: Mutex<Vec<(String, Duration)>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every command whose joined argv contains `needle`.
    pub fn fail_on(self, needle: &str) -> Self {
        self.failures.lock().unwrap().push(needle.to_string());
        self
    }

    /// Answer commands containing `needle` with `outputs` in turn; the last
    /// output repeats once the others are used up.
    pub fn respond(self, needle: &str, outputs: &[&str]) -> Self {
        self.responses.lock().unwrap().push((
            needle.to_string(),
            outputs.iter().map(|o| o.to_string()).collect(),
        ));
        self
    }

    /// Sleep this long inside every command, honouring cancellation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sleep `delay` inside commands containing `needle`, honouring
    /// cancellation. Applies on top of [`FakeRunner::with_delay`].
    pub fn slow_on(self, needle: &str, delay: Duration) -> Self {
        self.slow.lock().unwrap().push((needle.to_string(), delay));
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Prefixes passed to streaming `run` calls, in call order.
    pub fn prefixes(&self) -> Vec<String> {
        self.prefixes.lock().unwrap().clone()
    }

    /// Every recorded argv joined with spaces.
    pub fn commands(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.join(" ")).collect()
    }

    /// Recorded commands containing `needle`, in call order.
    pub fn matching(&self, needle: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.contains(needle))
            .collect()
    }

    async fn invoke(&self, cancel: &CancellationToken, args: Vec<String>) -> Result<String> {
        let joined = args.join(" ");
        self.calls.lock().unwrap().push(args);

        let slow = self
            .slow
            .lock()
            .unwrap()
            .iter()
            .find(|(needle, _)| joined.contains(needle.as_str()))
            .map(|(_, delay)| *delay);
        if let Some(delay) = slow.or(self.delay) {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(IjError::Execution(format!("'{joined}' cancelled")));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let fails = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .any(|needle| joined.contains(needle.as_str()));
        if fails {
            return Err(IjError::Execution(format!("'{joined}' exited with status 1")));
        }

        let mut responses = self.responses.lock().unwrap();
        let stdout = responses
            .iter_mut()
            .find(|(needle, _)| joined.contains(needle.as_str()))
            .and_then(|(_, outputs)| {
                if outputs.len() > 1 {
                    outputs.pop_front()
                } else {
                    outputs.front().cloned()
                }
            })
            .unwrap_or_default();
        Ok(stdout)
    }
}

impl ProcessRunner for FakeRunner {
    fn run<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        args: Vec<String>,
        _stdin: Option<String>,
        prefix: &'a Prefix,
        _output: OutputFiles,
    ) -> BoxFuture<'a, Result<()>> {
        self.prefixes.lock().unwrap().push(prefix.to_string());
        Box::pin(async move { self.invoke(cancel, args).await.map(|_| ()) })
    }

    fn run_for_output<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        args: Vec<String>,
        _stdin: Option<String>,
    ) -> BoxFuture<'a, Result<(String, String)>> {
        Box::pin(async move {
            let stdout = self.invoke(cancel, args).await?;
            Ok((stdout, String::new()))
        })
    }
}
