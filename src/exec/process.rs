// src/exec/process.rs

//! External process runner.
//!
//! The engine talks to a [`ProcessRunner`] instead of spawning processes
//! itself. Production code uses [`TokioProcessRunner`]; tests can provide a
//! fake implementation that records argument vectors and fails on demand.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::Context;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{IjError, Result};
use crate::logging::Prefix;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Optional log files receiving a process's output streams.
#[derive(Debug, Clone, Default)]
pub struct OutputFiles {
    pub stdout: Option<PathBuf>,
    pub stderr: Option<PathBuf>,
}

/// Trait abstracting how external commands are executed.
pub trait ProcessRunner: Send + Sync + fmt::Debug {
    /// Run `args`, streaming stdout/stderr line-by-line to the logger tagged
    /// with `prefix` (and into `output` files when given).
    ///
    /// Fails if the process cannot be started, exits non-zero, or `cancel`
    /// fires first (the child is killed in that case).
    fn run<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        args: Vec<String>,
        stdin: Option<String>,
        prefix: &'a Prefix,
        output: OutputFiles,
    ) -> BoxFuture<'a, Result<()>>;

    /// Run `args` and buffer both streams fully. Returns `(stdout, stderr)`.
    fn run_for_output<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        args: Vec<String>,
        stdin: Option<String>,
    ) -> BoxFuture<'a, Result<(String, String)>>;
}

/// Real runner built on `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessRunner for TokioProcessRunner {
    fn run<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        args: Vec<String>,
        stdin: Option<String>,
        prefix: &'a Prefix,
        output: OutputFiles,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { run_streaming(cancel, args, stdin, prefix, output).await })
    }

    fn run_for_output<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        args: Vec<String>,
        stdin: Option<String>,
    ) -> BoxFuture<'a, Result<(String, String)>> {
        Box::pin(async move { run_buffered(cancel, args, stdin).await })
    }
}

fn build_command(args: &[String], has_stdin: bool) -> Result<Command> {
    let (program, rest) = args
        .split_first()
        .ok_or_else(|| IjError::Execution("empty command".to_string()))?;

    let mut cmd = Command::new(program);
    cmd.args(rest)
        .stdin(if has_stdin { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    Ok(cmd)
}

async fn write_stdin(child: &mut tokio::process::Child, stdin: Option<String>) -> Result<()> {
    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input.as_bytes())
            .await
            .context("writing process stdin")?;
        // Dropping the pipe closes it so the child sees EOF.
    }
    Ok(())
}

async fn run_streaming(
    cancel: &CancellationToken,
    args: Vec<String>,
    stdin: Option<String>,
    prefix: &Prefix,
    output: OutputFiles,
) -> Result<()> {
    debug!(prefix = %prefix, args = ?args, "starting process");

    let mut child = build_command(&args, stdin.is_some())?
        .spawn()
        .with_context(|| format!("spawning '{}'", args[0]))?;

    write_stdin(&mut child, stdin).await?;

    let stdout = child.stdout.take().map(|s| {
        tokio::spawn(forward_lines(s, prefix.clone(), "stdout", output.stdout.clone()))
    });
    let stderr = child.stderr.take().map(|s| {
        tokio::spawn(forward_lines(s, prefix.clone(), "stderr", output.stderr.clone()))
    });

    // Either the process exits on its own (normal case), or the run is
    // cancelled and the child is killed.
    let status = tokio::select! {
        status = child.wait() => status.with_context(|| format!("waiting for '{}'", args[0]))?,
        _ = cancel.cancelled() => {
            info!(prefix = %prefix, "cancellation requested; killing process");
            if let Err(e) = child.kill().await {
                warn!(prefix = %prefix, error = %e, "failed to kill process on cancellation");
            }
            return Err(IjError::Execution(format!("'{}' cancelled", args[0])));
        }
    };

    for handle in [stdout, stderr].into_iter().flatten() {
        if let Err(e) = handle.await {
            warn!(prefix = %prefix, error = %e, "output forwarder panicked");
        }
    }

    if status.success() {
        Ok(())
    } else {
        Err(IjError::Execution(format!(
            "'{}' exited with status {}",
            args[0],
            status.code().unwrap_or(-1)
        )))
    }
}

/// Forward `stream` to the logger line by line until EOF, and copy its raw
/// bytes into `file`. Lines that are not valid UTF-8 are logged lossily; the
/// pipe is drained to the end either way so the child never sees EPIPE.
async fn forward_lines<R>(stream: R, prefix: Prefix, stream_name: &'static str, file: Option<PathBuf>)
where
    R: AsyncRead + Unpin,
{
    let mut sink = match file {
        Some(path) => match File::create(&path).await {
            Ok(f) => Some(f),
            Err(e) => {
                warn!(prefix = %prefix, path = %path.display(), error = %e, "failed to open log file");
                None
            }
        },
        None => None,
    };

    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(prefix = %prefix, stream = stream_name, error = %e, "failed to read process output");
                break;
            }
        }

        if let Some(f) = sink.as_mut() {
            if let Err(e) = f.write_all(&buf).await {
                warn!(prefix = %prefix, error = %e, "failed to write log file");
                sink = None;
            }
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        info!(prefix = %prefix, stream = stream_name, "{}", line);
    }

    if let Some(mut f) = sink {
        let _ = f.flush().await;
    }
}

async fn run_buffered(
    cancel: &CancellationToken,
    args: Vec<String>,
    stdin: Option<String>,
) -> Result<(String, String)> {
    debug!(args = ?args, "starting process for output");

    let mut child = build_command(&args, stdin.is_some())?
        .spawn()
        .with_context(|| format!("spawning '{}'", args[0]))?;

    write_stdin(&mut child, stdin).await?;

    // Dropping the wait future drops the child, which kills it.
    let output = tokio::select! {
        output = child.wait_with_output() => output.with_context(|| format!("waiting for '{}'", args[0]))?,
        _ = cancel.cancelled() => {
            return Err(IjError::Execution(format!("'{}' cancelled", args[0])));
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if output.status.success() {
        Ok((stdout, stderr))
    } else {
        Err(IjError::Execution(format!(
            "'{}' exited with status {}: {}",
            args[0],
            output.status.code().unwrap_or(-1),
            stderr.trim()
        )))
    }
}
