// src/config/mod.rs

//! Configuration loading, inheritance and validation for ij.
//!
//! Responsibilities:
//! - Define the serde-backed data model (`model.rs`).
//! - Load config files from disk, following `extends` (`loader.rs`).
//! - Cascade child configs onto parents, including stage insertion (`merge.rs`).
//! - Resolve task-to-task inheritance (`extends.rs`).
//! - Validate references between tasks, plans and metaplans (`validate.rs`).

pub mod extends;
pub mod loader;
pub mod merge;
pub mod model;
pub mod validate;

pub use extends::{ExtendsResolver, resolve_extends};
pub use loader::{default_config_path, load_and_validate, load_chain, load_from_path};
pub use merge::{insert_stage, merge_plan};
pub use model::{
    BuildTask, Config, EcrRegistry, FileList, GcrRegistry, Healthcheck, LoginTask, LogoutTask,
    Options, Plan, PlanTask, PushTask, RawConfig, Registry, RemoveTask, RunMode, RunTask,
    ServerRegistry, Stage, StageTask, Task, TaskMeta, parse_duration,
};
pub use validate::validate_config;
