// tests/config_loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use ij::config::{RunMode, Task, load_and_validate, load_chain};
use ij::errors::IjError;
use tempfile::TempDir;

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write config");
    path
}

const BASE_YAML: &str = r#"
environment:
  - GREETING=hello
tasks:
  compile:
    type: run
    image: rust:1
    command: cargo build
    required_environment: [GREETING]
  image:
    type: build
    tags: ["app:${VERSION}"]
plans:
  default:
    environment: [PROFILE=dev]
    stages:
      - name: build
        tasks: [compile]
      - name: test
        parallel: true
        run_mode: always
        tasks:
          - compile
          - name: compile
            environment: [MODE=release]
metaplans:
  all: [default]
options:
  healthcheck_interval: 2s
"#;

#[test]
fn loads_yaml_config() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "ij.yaml", BASE_YAML);

    let config = load_and_validate(&path, &[]).expect("valid config");

    assert_eq!(config.environment, vec!["GREETING=hello"]);
    assert_eq!(config.workspace, "/workspace");
    assert!(matches!(config.tasks["compile"], Task::Run(_)));
    assert_eq!(config.tasks["compile"].name(), "compile");
    assert!(matches!(config.tasks["image"], Task::Build(_)));

    let plan = &config.plans["default"];
    assert_eq!(plan.name, "default");
    assert_eq!(plan.stages.len(), 2);
    let test = &plan.stages[1];
    assert!(test.parallel);
    assert_eq!(test.run_mode, RunMode::Always);
    assert_eq!(test.tasks[1].environment, vec!["MODE=release"]);
    assert_eq!(config.metaplans["all"], vec!["default"]);
    assert_eq!(
        config.options.effective_healthcheck_interval(),
        std::time::Duration::from_secs(2)
    );
}

#[test]
fn loads_toml_config() {
    let dir = TempDir::new().unwrap();
    let path = write(
        dir.path(),
        "ij.toml",
        r#"
environment = ["A=1"]
workspace = "/src"

[tasks.hello]
type = "run"
image = "alpine"
command = "echo hello"

[[plans.default.stages]]
name = "greet"
tasks = ["hello"]
"#,
    );

    let config = load_and_validate(&path, &[]).expect("valid config");
    assert_eq!(config.workspace, "/src");
    assert_eq!(config.plans["default"].stages[0].tasks[0].name, "hello");
}

#[test]
fn config_extends_merges_child_onto_parent() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "base.yaml", BASE_YAML);
    let child = write(
        dir.path(),
        "child.yaml",
        r#"
extends: base.yaml
environment:
  - GREETING=hi
tasks:
  lint:
    type: run
    image: rust:1
    command: cargo clippy
plans:
  default:
    extend: true
    stages:
      - name: lint
        before_stage: test
        tasks: [lint]
"#,
    );

    let config = load_and_validate(&child, &[]).expect("valid config");
    assert_eq!(config.environment, vec!["GREETING=hello", "GREETING=hi"]);
    let stages: Vec<&str> = config.plans["default"]
        .stages
        .iter()
        .map(|s| s.name.as_str())
        .collect();
    assert_eq!(stages, vec!["build", "lint", "test"]);
    assert!(config.tasks.contains_key("compile"));
}

#[test]
fn override_file_is_merged_last() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "ij.yaml", BASE_YAML);
    let over = write(
        dir.path(),
        "local.yaml",
        r#"
workspace: /override
options:
  force_sequential: true
"#,
    );

    let config = load_and_validate(&path, &[over]).expect("valid config");
    assert_eq!(config.workspace, "/override");
    assert!(config.options.force_sequential);
    assert_eq!(config.environment, vec!["GREETING=hello"]);
}

#[test]
fn cyclic_config_extends_is_rejected() {
    let dir = TempDir::new().unwrap();
    let a = write(dir.path(), "a.yaml", "extends: b.yaml\n");
    write(dir.path(), "b.yaml", "extends: a.yaml\n");

    let err = load_chain(&a).unwrap_err();
    assert!(matches!(err, IjError::CyclicConfigExtends(_)), "got {err:?}");
}

#[test]
fn cyclic_metaplans_are_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write(
        dir.path(),
        "ij.yaml",
        r#"
metaplans:
  one: [two]
  two: [one]
"#,
    );

    let err = load_and_validate(&path, &[]).unwrap_err();
    assert!(matches!(err, IjError::CyclicMetaplan(_)), "got {err:?}");
    assert!(err.is_config_error());
}

#[test]
fn plan_and_metaplan_names_must_differ() {
    let dir = TempDir::new().unwrap();
    let path = write(
        dir.path(),
        "ij.yaml",
        r#"
plans:
  default:
    stages: []
metaplans:
  default: []
"#,
    );

    let err = load_and_validate(&path, &[]).unwrap_err();
    assert!(matches!(err, IjError::DuplicateName(ref n) if n == "default"), "got {err:?}");
}

#[test]
fn unknown_stage_task_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write(
        dir.path(),
        "ij.yaml",
        r#"
plans:
  default:
    stages:
      - name: build
        tasks: [ghost]
"#,
    );

    match load_and_validate(&path, &[]).unwrap_err() {
        IjError::UnknownReference { kind, name, referrer } => {
            assert_eq!(kind, "task");
            assert_eq!(name, "ghost");
            assert_eq!(referrer, "default/build");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn plan_task_must_target_existing_plan() {
    let dir = TempDir::new().unwrap();
    let path = write(
        dir.path(),
        "ij.yaml",
        r#"
tasks:
  call:
    type: plan
    name: nowhere
"#,
    );

    let err = load_and_validate(&path, &[]).unwrap_err();
    assert!(
        matches!(err, IjError::UnknownReference { kind: "plan", .. }),
        "got {err:?}"
    );
}

#[test]
fn bad_healthcheck_interval_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let path = write(
        dir.path(),
        "ij.yaml",
        "options:\n  healthcheck_interval: soon\n",
    );

    let err = load_and_validate(&path, &[]).unwrap_err();
    assert!(matches!(err, IjError::Config(_)), "got {err:?}");
}
