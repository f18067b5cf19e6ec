// tests/process.rs
//
// These run real `sh` processes through the production runner.
#![cfg(unix)]

use std::fs;
use std::time::Duration;

use ij::errors::IjError;
use ij::exec::{OutputFiles, ProcessRunner, TokioProcessRunner};
use ij::logging::Prefix;
use ij_test_utils::with_timeout;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

fn log_files(dir: &TempDir) -> OutputFiles {
    OutputFiles {
        stdout: Some(dir.path().join("task.out.log")),
        stderr: Some(dir.path().join("task.err.log")),
    }
}

#[tokio::test]
async fn streamed_output_reaches_log_files() {
    let dir = TempDir::new().unwrap();
    let prefix = Prefix::root().append("default").append("s").append("t.0");

    TokioProcessRunner::new()
        .run(
            &CancellationToken::new(),
            sh("echo one; echo two; echo oops >&2"),
            None,
            &prefix,
            log_files(&dir),
        )
        .await
        .unwrap();

    assert_eq!(fs::read_to_string(dir.path().join("task.out.log")).unwrap(), "one\ntwo\n");
    assert_eq!(fs::read_to_string(dir.path().join("task.err.log")).unwrap(), "oops\n");
}

#[tokio::test]
async fn non_zero_exit_is_an_error() {
    let err = TokioProcessRunner::new()
        .run(
            &CancellationToken::new(),
            sh("exit 3"),
            None,
            &Prefix::root(),
            OutputFiles::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, IjError::Execution(_)), "got {err:?}");
    assert!(err.to_string().contains("status 3"), "got {err}");
}

#[tokio::test]
async fn buffered_failure_includes_stderr() {
    let err = TokioProcessRunner::new()
        .run_for_output(&CancellationToken::new(), sh("echo denied >&2; exit 1"), None)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("denied"), "got {err}");
}

#[tokio::test]
async fn cancellation_kills_the_child() {
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });
    }

    let started = std::time::Instant::now();
    let err = with_timeout(TokioProcessRunner::new().run(
        &cancel,
        sh("sleep 30"),
        None,
        &Prefix::root(),
        OutputFiles::default(),
    ))
    .await
    .unwrap_err();

    assert!(err.to_string().contains("cancelled"), "got {err}");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn stdin_is_delivered() {
    let (stdout, stderr) = TokioProcessRunner::new()
        .run_for_output(
            &CancellationToken::new(),
            vec!["cat".to_string()],
            Some("s3cret".to_string()),
        )
        .await
        .unwrap();

    assert_eq!(stdout, "s3cret");
    assert!(stderr.is_empty());
}

#[tokio::test]
async fn invalid_utf8_output_is_drained_and_kept() {
    let dir = TempDir::new().unwrap();
    let script = "printf 'ok\\n\\377\\n'; i=0; while [ $i -lt 50000 ]; do echo line $i; i=$((i+1)); done";

    with_timeout(TokioProcessRunner::new().run(
        &CancellationToken::new(),
        sh(script),
        None,
        &Prefix::root(),
        log_files(&dir),
    ))
    .await
    .unwrap();

    let out = fs::read(dir.path().join("task.out.log")).unwrap();
    assert!(out.starts_with(b"ok\n\xff\nline 0\n"));
    assert!(out.ends_with(b"line 49999\n"));
}

#[tokio::test]
async fn missing_program_is_an_error() {
    let result = TokioProcessRunner::new()
        .run_for_output(
            &CancellationToken::new(),
            vec!["ij-no-such-program".to_string()],
            None,
        )
        .await;

    assert!(result.is_err());
}
