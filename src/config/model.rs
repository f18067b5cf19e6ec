// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration as read from a TOML or YAML file.
///
/// ```yaml
/// extends: base.yaml
/// environment: ["GOOS=linux"]
/// tasks:
///   compile:
///     type: run
///     image: golang:1.22
///     command: go build ./...
/// plans:
///   default:
///     stages:
///       - name: build
///         tasks: [compile]
/// ```
///
/// All sections are optional. A raw config may still name a parent config
/// file via `extends`; the loader merges the chain and validates the result
/// into a [`Config`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfig {
    /// Path of a parent config file, relative to this file.
    #[serde(default)]
    pub extends: Option<String>,

    #[serde(default)]
    pub environment: Vec<String>,

    #[serde(default)]
    pub registries: Vec<Registry>,

    /// Mount point of the scratch workspace inside run containers.
    #[serde(default)]
    pub workspace: Option<String>,

    #[serde(default)]
    pub import: FileList,

    #[serde(default)]
    pub export: FileList,

    #[serde(default)]
    pub tasks: BTreeMap<String, Task>,

    #[serde(default)]
    pub plans: BTreeMap<String, Plan>,

    #[serde(default)]
    pub metaplans: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub options: Options,
}

impl RawConfig {
    /// Copy map keys into the `name` fields of tasks and plans.
    pub fn populate_names(&mut self) {
        for (name, task) in self.tasks.iter_mut() {
            task.meta_mut().name = name.clone();
        }
        for (name, plan) in self.plans.iter_mut() {
            plan.name = name.clone();
        }
    }
}

/// Validated configuration: task extends are resolved and every reference
/// points at something that exists.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub environment: Vec<String>,
    pub registries: Vec<Registry>,
    pub workspace: String,
    pub import: FileList,
    pub export: FileList,
    pub tasks: BTreeMap<String, Task>,
    pub plans: BTreeMap<String, Plan>,
    pub metaplans: BTreeMap<String, Vec<String>>,
    pub options: Options,
}

pub const DEFAULT_WORKSPACE: &str = "/workspace";

impl Config {
    /// Construct without validation. Prefer `Config::try_from(RawConfig)`.
    pub fn new_unchecked(raw: RawConfig, tasks: BTreeMap<String, Task>) -> Self {
        Self {
            environment: raw.environment,
            registries: raw.registries,
            workspace: raw
                .workspace
                .filter(|w| !w.is_empty())
                .unwrap_or_else(|| DEFAULT_WORKSPACE.to_string()),
            import: raw.import,
            export: raw.export,
            tasks,
            plans: raw.plans,
            metaplans: raw.metaplans,
            options: raw.options,
        }
    }

    pub fn is_plan_or_metaplan(&self, name: &str) -> bool {
        self.plans.contains_key(name) || self.metaplans.contains_key(name)
    }
}

/// `[options]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Options {
    /// Run every stage sequentially, even those marked `parallel`.
    #[serde(default)]
    pub force_sequential: bool,

    /// Poll interval for detached container healthchecks, e.g. `"5s"`.
    #[serde(default)]
    pub healthcheck_interval: Option<String>,

    #[serde(default)]
    pub ssh_identities: Vec<String>,
}

pub const DEFAULT_HEALTHCHECK_INTERVAL: Duration = Duration::from_secs(5);

impl Options {
    pub fn effective_healthcheck_interval(&self) -> Duration {
        self.healthcheck_interval
            .as_deref()
            .and_then(|s| parse_duration(s).ok())
            .unwrap_or(DEFAULT_HEALTHCHECK_INTERVAL)
    }
}

/// Glob patterns selecting files to copy between project and workspace.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,
}

impl FileList {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Fields shared by every task variant.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct TaskMeta {
    /// Filled in from the task's key in the `tasks` map.
    #[serde(skip)]
    pub name: String,

    /// Name of the task this one inherits unset fields from.
    #[serde(default)]
    pub extends: Option<String>,

    #[serde(default)]
    pub environment: Vec<String>,

    #[serde(default)]
    pub required_environment: Vec<String>,
}

/// A declarative unit of work.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Task {
    Build(BuildTask),
    Run(RunTask),
    Push(PushTask),
    Remove(RemoveTask),
    Plan(PlanTask),
    Login(LoginTask),
    Logout(LogoutTask),
}

impl Task {
    pub fn meta(&self) -> &TaskMeta {
        match self {
            Task::Build(t) => &t.meta,
            Task::Run(t) => &t.meta,
            Task::Push(t) => &t.meta,
            Task::Remove(t) => &t.meta,
            Task::Plan(t) => &t.meta,
            Task::Login(t) => &t.meta,
            Task::Logout(t) => &t.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut TaskMeta {
        match self {
            Task::Build(t) => &mut t.meta,
            Task::Run(t) => &mut t.meta,
            Task::Push(t) => &mut t.meta,
            Task::Remove(t) => &mut t.meta,
            Task::Plan(t) => &mut t.meta,
            Task::Login(t) => &mut t.meta,
            Task::Logout(t) => &mut t.meta,
        }
    }

    pub fn name(&self) -> &str {
        &self.meta().name
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Task::Build(_) => "build",
            Task::Run(_) => "run",
            Task::Push(_) => "push",
            Task::Remove(_) => "remove",
            Task::Plan(_) => "plan",
            Task::Login(_) => "login",
            Task::Logout(_) => "logout",
        }
    }
}

/// `type = "build"`: build an image from a Dockerfile in the workspace.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct BuildTask {
    #[serde(flatten)]
    pub meta: TaskMeta,

    #[serde(default)]
    pub dockerfile: Option<String>,

    /// Build context relative to the workspace (default: the workspace root).
    #[serde(default)]
    pub context: Option<String>,

    #[serde(default)]
    pub target: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub labels: Vec<String>,
}

/// `type = "run"`: run a container with the workspace mounted.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RunTask {
    #[serde(flatten)]
    pub meta: TaskMeta,

    #[serde(default)]
    pub image: Option<String>,

    #[serde(default)]
    pub command: Option<String>,

    /// Shell used to execute `script` (default `/bin/sh`).
    #[serde(default)]
    pub shell: Option<String>,

    #[serde(default)]
    pub script: Option<String>,

    #[serde(default)]
    pub entrypoint: Option<String>,

    #[serde(default)]
    pub user: Option<String>,

    /// Working directory inside the container (default: the workspace).
    #[serde(default)]
    pub workspace: Option<String>,

    #[serde(default)]
    pub hostname: Option<String>,

    #[serde(default)]
    pub detach: bool,

    #[serde(default)]
    pub healthcheck: Healthcheck,

    /// Workspace-relative files of `KEY=VALUE` lines exported to later tasks.
    #[serde(default)]
    pub export_environment_files: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Healthcheck {
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub interval: Option<String>,

    #[serde(default)]
    pub retries: Option<u32>,

    #[serde(default)]
    pub start_period: Option<String>,

    #[serde(default)]
    pub timeout: Option<String>,
}

impl Healthcheck {
    pub fn is_declared(&self) -> bool {
        self.command.as_deref().is_some_and(|c| !c.is_empty())
    }
}

/// `type = "push"`: push images to their registries.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PushTask {
    #[serde(flatten)]
    pub meta: TaskMeta,

    #[serde(default)]
    pub images: Vec<String>,

    /// Also act on every tag built earlier in this run.
    #[serde(default)]
    pub include_built: bool,
}

/// `type = "remove"`: remove local images.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RemoveTask {
    #[serde(flatten)]
    pub meta: TaskMeta,

    #[serde(default)]
    pub images: Vec<String>,

    #[serde(default)]
    pub include_built: bool,
}

/// `type = "plan"`: invoke another plan or metaplan by name.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PlanTask {
    #[serde(flatten)]
    pub meta: TaskMeta,

    #[serde(rename = "name", default)]
    pub plan: String,
}

/// `type = "login"`: log in to the configured registries for the rest of the run.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct LoginTask {
    #[serde(flatten)]
    pub meta: TaskMeta,

    /// Registry servers to log in to. Empty means every configured registry.
    #[serde(default)]
    pub registries: Vec<String>,
}

/// `type = "logout"`: log out of the configured registries.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct LogoutTask {
    #[serde(flatten)]
    pub meta: TaskMeta,
}

/// A named, ordered sequence of stages.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Plan {
    #[serde(skip)]
    pub name: String,

    /// Merge into a parent plan of the same name instead of replacing it.
    #[serde(default)]
    pub extend: bool,

    #[serde(default)]
    pub environment: Vec<String>,

    #[serde(default)]
    pub stages: Vec<Stage>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Stage {
    pub name: String,

    /// Merge-only hint: insert this stage before the named parent stage.
    #[serde(default)]
    pub before_stage: Option<String>,

    /// Merge-only hint: insert this stage after the named parent stage.
    #[serde(default)]
    pub after_stage: Option<String>,

    #[serde(default)]
    pub run_mode: RunMode,

    #[serde(default)]
    pub parallel: bool,

    #[serde(default)]
    pub environment: Vec<String>,

    #[serde(default)]
    pub tasks: Vec<StageTask>,
}

/// Whether a stage runs given the failure state of its plan so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    #[default]
    #[serde(alias = "on_success")]
    OnSuccess,
    #[serde(alias = "on_failure")]
    OnFailure,
    Always,
}

impl RunMode {
    pub fn should_run(self, failed: bool) -> bool {
        match self {
            RunMode::OnSuccess => !failed,
            RunMode::OnFailure => failed,
            RunMode::Always => true,
        }
    }
}

/// A task invocation inside a stage.
///
/// Accepts either a bare task name or `{ name, environment }`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(from = "StageTaskEntry")]
pub struct StageTask {
    pub name: String,
    pub environment: Vec<String>,
}

impl StageTask {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            environment: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StageTaskEntry {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        environment: Vec<String>,
    },
}

impl From<StageTaskEntry> for StageTask {
    fn from(entry: StageTaskEntry) -> Self {
        match entry {
            StageTaskEntry::Name(name) => StageTask::named(name),
            StageTaskEntry::Full { name, environment } => StageTask { name, environment },
        }
    }
}

/// A container-image registry credential source.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Registry {
    Server(ServerRegistry),
    Gcr(GcrRegistry),
    Ecr(EcrRegistry),
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ServerRegistry {
    pub server: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: Option<String>,

    /// Read the password from this file instead.
    #[serde(default)]
    pub password_file: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct GcrRegistry {
    #[serde(default)]
    pub hostname: Option<String>,

    /// Service account JSON key.
    #[serde(default)]
    pub key: Option<String>,

    #[serde(default)]
    pub key_file: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct EcrRegistry {
    pub account_id: String,

    #[serde(default)]
    pub region: Option<String>,

    #[serde(default)]
    pub access_key_id: Option<String>,

    #[serde(default)]
    pub secret_access_key: Option<String>,
}

/// Parse a simple duration string such as `"500ms"`, `"3s"`, `"2m"` or `"1h"`.
///
/// A bare number is interpreted as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let (value, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => s.split_at(idx),
        None => (s, "s"),
    };

    let value: u64 = value
        .parse()
        .map_err(|_| format!("invalid duration value in '{s}'"))?;

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        other => Err(format!("invalid duration unit '{other}' in '{s}'")),
    }
}
