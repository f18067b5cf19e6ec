// tests/engine_plans.rs

use std::fs;
use std::sync::Arc;

use ij::config::{Config, RunMode};
use ij::engine::{MAX_PREFIX_DEPTH, PlanRunner, RunContext, StageRunner};
use ij::environment::Environment;
use ij::logging::Prefix;
use ij_test_utils::builders::{ConfigBuilder, PlanBuilder, StageBuilder, TaskBuilder};
use ij_test_utils::fake_runner::FakeRunner;
use ij_test_utils::{init_tracing, run_state, run_state_with_cancel, with_timeout};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Three run tasks: `ok1`, `bad` (fails) and `ok2`.
fn three_task_config(parallel: bool, force_sequential: bool) -> Config {
    let mut stage = StageBuilder::new("s").task("ok1").task("bad").task("ok2");
    if parallel {
        stage = stage.parallel();
    }
    let mut builder = ConfigBuilder::new()
        .with_task("ok1", TaskBuilder::run("alpine", "echo first").build())
        .with_task("bad", TaskBuilder::run("alpine", "fail-now").build())
        .with_task("ok2", TaskBuilder::run("alpine", "echo third").build())
        .with_plan("default", PlanBuilder::new().stage(stage.build()).build());
    if force_sequential {
        builder = builder.force_sequential();
    }
    builder.build()
}

async fn run_default(config: Config, runner: Arc<FakeRunner>) -> bool {
    let dir = TempDir::new().unwrap();
    let state = run_state(config, runner, dir.path());
    let context = RunContext::root(Environment::new());
    with_timeout(PlanRunner::new(state).run("default".to_string(), Prefix::root(), context)).await
}

#[tokio::test]
async fn parallel_stage_runs_every_task_and_reports_failure() {
    init_tracing();
    let runner = Arc::new(FakeRunner::new().fail_on("fail-now"));

    let ok = run_default(three_task_config(true, false), Arc::clone(&runner)).await;

    assert!(!ok);
    assert_eq!(runner.matching("docker run").len(), 3);
    assert_eq!(runner.matching("echo third").len(), 1);
}

#[tokio::test]
async fn sequential_stage_stops_at_first_failure() {
    init_tracing();
    let runner = Arc::new(FakeRunner::new().fail_on("fail-now"));

    let ok = run_default(three_task_config(false, false), Arc::clone(&runner)).await;

    assert!(!ok);
    let runs = runner.matching("docker run");
    assert_eq!(runs.len(), 2);
    assert!(runs[0].ends_with("echo first"));
    assert!(runs[1].ends_with("fail-now"));
}

#[tokio::test]
async fn force_sequential_overrides_parallel_stages() {
    init_tracing();
    let runner = Arc::new(FakeRunner::new().fail_on("fail-now"));

    let ok = run_default(three_task_config(true, true), Arc::clone(&runner)).await;

    assert!(!ok);
    assert_eq!(runner.matching("docker run").len(), 2);
}

#[tokio::test]
async fn stage_environment_precedence() {
    let config = ConfigBuilder::new()
        .with_task(
            "t",
            TaskBuilder::run("alpine", "true")
                .env("X=task")
                .env("ONLY_TASK=1")
                .build(),
        )
        .with_plan(
            "p",
            PlanBuilder::new()
                .env("X=plan")
                .stage(
                    StageBuilder::new("s")
                        .env("X=stage")
                        .task_with_env("t", &["X=stageTask"])
                        .task("t")
                        .build(),
                )
                .build(),
        )
        .build();

    let dir = TempDir::new().unwrap();
    let state = run_state(config, Arc::new(FakeRunner::new()), dir.path());
    let context = RunContext::root(Environment::from_lines(["X=ctx", "ONLY_CTX=1"]));

    let plan = &state.config().plans["p"];
    let stage = &plan.stages[0];
    let stage_runner = StageRunner::new(&state, plan, stage, Prefix::root().append("p").append("s"));

    let first = stage_runner.task_runner(&context, 0, &stage.tasks[0]).unwrap();
    assert_eq!(first.environment().get("X"), Some("stageTask"));
    assert_eq!(first.environment().get("ONLY_TASK"), Some("1"));
    assert_eq!(first.environment().get("ONLY_CTX"), Some("1"));
    assert_eq!(first.prefix().to_string(), "p/s/t.0");

    let second = stage_runner.task_runner(&context, 1, &stage.tasks[1]).unwrap();
    assert_eq!(second.environment().get("X"), Some("stage"));
    assert_eq!(second.prefix().to_string(), "p/s/t.1");
}

#[tokio::test]
async fn exported_environment_sits_between_context_and_plan() {
    let config = ConfigBuilder::new()
        .with_task("t", TaskBuilder::run("alpine", "true").build())
        .with_plan(
            "p",
            PlanBuilder::new()
                .env("FROM_PLAN=plan")
                .stage(StageBuilder::new("s").task("t").build())
                .build(),
        )
        .build();

    let dir = TempDir::new().unwrap();
    let state = run_state(config, Arc::new(FakeRunner::new()), dir.path());
    let context = RunContext::root(Environment::from_lines(["FROM_CTX=ctx"]));
    context.export_env("FROM_CTX=exported");
    context.export_env("FROM_PLAN=exported");

    let plan = &state.config().plans["p"];
    let stage = &plan.stages[0];
    let runner = StageRunner::new(&state, plan, stage, Prefix::root())
        .task_runner(&context, 0, &stage.tasks[0])
        .unwrap();

    assert_eq!(runner.environment().get("FROM_CTX"), Some("exported"));
    assert_eq!(runner.environment().get("FROM_PLAN"), Some("plan"));
}

#[tokio::test]
async fn run_modes_gate_stages_on_prior_failure() {
    init_tracing();
    let config = ConfigBuilder::new()
        .with_task("bad", TaskBuilder::run("alpine", "fail-now").build())
        .with_task("skipped", TaskBuilder::run("alpine", "echo skipped").build())
        .with_task("recover", TaskBuilder::run("alpine", "echo recover").build())
        .with_task("always", TaskBuilder::run("alpine", "echo always").build())
        .with_plan(
            "default",
            PlanBuilder::new()
                .stage(StageBuilder::new("one").task("bad").build())
                .stage(StageBuilder::new("two").task("skipped").build())
                .stage(
                    StageBuilder::new("three")
                        .task("recover")
                        .run_mode(RunMode::OnFailure)
                        .build(),
                )
                .stage(
                    StageBuilder::new("four")
                        .task("always")
                        .run_mode(RunMode::Always)
                        .build(),
                )
                .build(),
        )
        .build();
    let runner = Arc::new(FakeRunner::new().fail_on("fail-now"));

    let ok = run_default(config, Arc::clone(&runner)).await;

    assert!(!ok);
    assert!(runner.matching("echo skipped").is_empty());
    assert_eq!(runner.matching("echo recover").len(), 1);
    assert_eq!(runner.matching("echo always").len(), 1);
}

#[tokio::test]
async fn on_failure_stage_is_skipped_when_nothing_failed() {
    let config = ConfigBuilder::new()
        .with_task("ok", TaskBuilder::run("alpine", "echo ok").build())
        .with_task("recover", TaskBuilder::run("alpine", "echo recover").build())
        .with_plan(
            "default",
            PlanBuilder::new()
                .stage(StageBuilder::new("one").task("ok").build())
                .stage(
                    StageBuilder::new("two")
                        .task("recover")
                        .run_mode(RunMode::OnFailure)
                        .build(),
                )
                .build(),
        )
        .build();
    let runner = Arc::new(FakeRunner::new());

    assert!(run_default(config, Arc::clone(&runner)).await);
    assert!(runner.matching("echo recover").is_empty());
}

#[tokio::test]
async fn metaplan_stops_at_first_failing_member() {
    let config = ConfigBuilder::new()
        .with_task("a", TaskBuilder::run("alpine", "echo a").build())
        .with_task("b", TaskBuilder::run("alpine", "fail-now").build())
        .with_task("c", TaskBuilder::run("alpine", "echo c").build())
        .with_plan("pa", PlanBuilder::new().stage(StageBuilder::new("s").task("a").build()).build())
        .with_plan("pb", PlanBuilder::new().stage(StageBuilder::new("s").task("b").build()).build())
        .with_plan("pc", PlanBuilder::new().stage(StageBuilder::new("s").task("c").build()).build())
        .with_metaplan("inner", &["pb", "pc"])
        .with_metaplan("default", &["pa", "inner"])
        .build();
    let runner = Arc::new(FakeRunner::new().fail_on("fail-now"));

    assert!(!run_default(config, Arc::clone(&runner)).await);
    assert_eq!(runner.matching("echo a").len(), 1);
    assert_eq!(runner.matching("fail-now").len(), 1);
    assert!(runner.matching("echo c").is_empty());
}

#[tokio::test]
async fn plan_task_runs_nested_plan_with_its_environment() {
    init_tracing();
    let config = ConfigBuilder::new()
        .with_task(
            "call",
            TaskBuilder::call_plan("inner").env("TARGET=nested").build(),
        )
        .with_task("work", TaskBuilder::run("alpine", "echo ${TARGET}").build())
        .with_plan(
            "inner",
            PlanBuilder::new().stage(StageBuilder::new("run").task("work").build()).build(),
        )
        .with_plan(
            "default",
            PlanBuilder::new().stage(StageBuilder::new("outer").task("call").build()).build(),
        )
        .build();
    let runner = Arc::new(FakeRunner::new());

    assert!(run_default(config, Arc::clone(&runner)).await);
    assert_eq!(runner.matching("echo nested").len(), 1);
    assert_eq!(runner.prefixes(), vec!["default/outer/call.0/inner/run/work.0"]);
}

#[tokio::test]
async fn failing_nested_plan_fails_the_plan_task() {
    let config = ConfigBuilder::new()
        .with_task("call", TaskBuilder::call_plan("inner").build())
        .with_task("bad", TaskBuilder::run("alpine", "fail-now").build())
        .with_task("after", TaskBuilder::run("alpine", "echo after").build())
        .with_plan(
            "inner",
            PlanBuilder::new().stage(StageBuilder::new("s").task("bad").build()).build(),
        )
        .with_plan(
            "default",
            PlanBuilder::new()
                .stage(StageBuilder::new("s").task("call").task("after").build())
                .build(),
        )
        .build();
    let runner = Arc::new(FakeRunner::new().fail_on("fail-now"));

    assert!(!run_default(config, Arc::clone(&runner)).await);
    assert!(runner.matching("echo after").is_empty());
}

#[tokio::test]
async fn recursive_plan_calls_hit_the_depth_limit() {
    init_tracing();
    let config = ConfigBuilder::new()
        .with_task("again", TaskBuilder::call_plan("default").build())
        .with_plan(
            "default",
            PlanBuilder::new().stage(StageBuilder::new("s").task("again").build()).build(),
        )
        .build();
    let runner = Arc::new(FakeRunner::new());

    assert!(!run_default(config, Arc::clone(&runner)).await);
    assert!(runner.calls().is_empty());
}

/// `levels` plans, each calling the next through a plan task; the last one
/// runs `echo deepest`.
fn plan_chain(levels: usize) -> Config {
    let name = |i: usize| if i == 0 { "default".to_string() } else { format!("level{i}") };
    let mut builder =
        ConfigBuilder::new().with_task("leaf", TaskBuilder::run("alpine", "echo deepest").build());
    for i in 0..levels {
        let task = if i + 1 == levels {
            "leaf".to_string()
        } else {
            let call = format!("call{}", i + 1);
            builder = builder.with_task(&call, TaskBuilder::call_plan(&name(i + 1)).build());
            call
        };
        builder = builder.with_plan(
            &name(i),
            PlanBuilder::new().stage(StageBuilder::new("s").task(&task).build()).build(),
        );
    }
    builder.build()
}

#[tokio::test]
async fn nineteen_nested_plan_calls_fit_within_the_depth_limit() {
    let runner = Arc::new(FakeRunner::new());
    assert!(run_default(plan_chain(20), Arc::clone(&runner)).await);

    assert_eq!(runner.prefixes().len(), 1);
    assert_eq!(runner.prefixes()[0].split('/').count(), MAX_PREFIX_DEPTH);
}

#[tokio::test]
async fn twentieth_nested_plan_call_is_rejected() {
    let runner = Arc::new(FakeRunner::new());
    assert!(!run_default(plan_chain(21), Arc::clone(&runner)).await);
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn missing_required_environment_spawns_nothing() {
    let config = ConfigBuilder::new()
        .with_task("t", TaskBuilder::run("alpine", "true").requires("TOKEN").build())
        .with_plan(
            "default",
            PlanBuilder::new().stage(StageBuilder::new("s").task("t").build()).build(),
        )
        .build();
    let runner = Arc::new(FakeRunner::new());

    assert!(!run_default(config, Arc::clone(&runner)).await);
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn divergent_environment_fails_the_task() {
    let config = ConfigBuilder::new()
        .with_task(
            "t",
            TaskBuilder::run("alpine", "true").env("A=${B}").env("B=${A}").build(),
        )
        .with_plan(
            "default",
            PlanBuilder::new().stage(StageBuilder::new("s").task("t").build()).build(),
        )
        .build();
    let runner = Arc::new(FakeRunner::new());

    assert!(!run_default(config, Arc::clone(&runner)).await);
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn cancelled_run_starts_no_tasks() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let runner = Arc::new(FakeRunner::new());
    let state = run_state_with_cancel(
        three_task_config(false, false),
        Arc::clone(&runner),
        dir.path(),
        cancel,
    );

    let ok = PlanRunner::new(state)
        .run("default".to_string(), Prefix::root(), RunContext::root(Environment::new()))
        .await;

    assert!(!ok);
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn exported_environment_reaches_later_tasks() {
    init_tracing();
    let config = ConfigBuilder::new()
        .with_task(
            "version",
            TaskBuilder::run("alpine", "write-version")
                .with_run(|r| r.export_environment_files = vec!["out/version.env".into()])
                .build(),
        )
        .with_task("use", TaskBuilder::run("alpine", "echo ${VERSION}").build())
        .with_plan(
            "default",
            PlanBuilder::new()
                .stage(StageBuilder::new("one").task("version").build())
                .stage(StageBuilder::new("two").task("use").build())
                .build(),
        )
        .build();

    let dir = TempDir::new().unwrap();
    let runner = Arc::new(FakeRunner::new());
    let state = run_state(config, Arc::clone(&runner), dir.path());
    let out = state.scratch().workspace().join("out");
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("version.env"), "# generated\nVERSION=1.2.3\n\n").unwrap();

    let context = RunContext::root(Environment::new());
    let ok = PlanRunner::new(state)
        .run("default".to_string(), Prefix::root(), Arc::clone(&context))
        .await;

    assert!(ok);
    assert_eq!(context.exported_env(), vec!["VERSION=1.2.3"]);
    assert_eq!(runner.matching("echo 1.2.3").len(), 1);
}

#[tokio::test]
async fn built_images_are_pushed_when_included() {
    let config = ConfigBuilder::new()
        .with_task("image", TaskBuilder::build_image(&["app:${TAG}"]).env("TAG=1").build())
        .with_task("push", TaskBuilder::push(&["extra:1"], true).build())
        .with_task("cleanup", TaskBuilder::remove(&[], true).build())
        .with_plan(
            "default",
            PlanBuilder::new()
                .stage(StageBuilder::new("build").task("image").build())
                .stage(StageBuilder::new("publish").task("push").task("cleanup").build())
                .build(),
        )
        .build();
    let runner = Arc::new(FakeRunner::new());

    assert!(run_default(config, Arc::clone(&runner)).await);
    assert_eq!(runner.matching("docker build").len(), 1);
    assert_eq!(
        runner.matching("docker push"),
        vec!["docker push extra:1", "docker push app:1"]
    );
    assert_eq!(runner.matching("docker rmi"), vec!["docker rmi app:1"]);
}
