// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running container-engine
//! commands, using `tokio::process::Command`.
//!
//! - [`process`] provides the `ProcessRunner` trait and the concrete
//!   `TokioProcessRunner` the engine uses in production, and which tests can
//!   replace with a fake implementation.
//! - [`command`] builds the `docker` argument vectors for each task type and
//!   for run-scoped resources (networks, registry sessions, containers).

pub mod command;
pub mod process;

pub use process::{BoxFuture, OutputFiles, ProcessRunner, TokioProcessRunner};
