// src/engine/mod.rs

//! Execution engine for ij.
//!
//! This module ties together:
//! - the plan, stage and task runners that walk a validated config
//! - the per-invocation [`RunContext`] tree (failure state, environment,
//!   exported environment)
//! - run-scoped resources: scratch space, network, tracked containers and
//!   registry sessions, all torn down through one LIFO [`Cleanup`] stack
//!
//! [`Runtime`] is the entry point: it acquires resources, runs the requested
//! plans and always runs cleanup before returning.

pub mod cleanup;
pub mod containers;
pub mod context;
pub mod network;
pub mod plan;
pub mod registry;
pub mod runtime;
pub mod scratch;
pub mod stage;
pub mod state;
pub mod task;

pub use cleanup::Cleanup;
pub use containers::{ContainerAction, ContainerList};
pub use context::RunContext;
pub use network::Network;
pub use plan::PlanRunner;
pub use registry::{Credentials, RegistrySet};
pub use runtime::{DEFAULT_PLAN, RunOptions, Runtime};
pub use scratch::ScratchSpace;
pub use stage::StageRunner;
pub use state::RunState;
pub use task::{MAX_PREFIX_DEPTH, TaskRunner, read_export_files};
