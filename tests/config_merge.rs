// tests/config_merge.rs

use ij::config::{RawConfig, Stage, insert_stage};
use ij::errors::IjError;
use ij_test_utils::builders::{ConfigBuilder, PlanBuilder, StageBuilder, TaskBuilder};
use proptest::prelude::*;

fn names(stages: &[Stage]) -> Vec<&str> {
    stages.iter().map(|s| s.name.as_str()).collect()
}

fn stages(list: &[&str]) -> Vec<Stage> {
    list.iter().map(|n| StageBuilder::new(n).build()).collect()
}

#[test]
fn before_anchor_inserts_immediately_before() {
    let mut s = stages(&["a", "b", "c"]);
    insert_stage("p", &mut s, StageBuilder::new("x").before("b").build()).unwrap();
    assert_eq!(names(&s), vec!["a", "x", "b", "c"]);
}

#[test]
fn after_anchor_inserts_immediately_after() {
    let mut s = stages(&["a", "b", "c"]);
    insert_stage("p", &mut s, StageBuilder::new("x").after("c").build()).unwrap();
    assert_eq!(names(&s), vec!["a", "b", "c", "x"]);
}

#[test]
fn missing_anchor_fails() {
    let mut s = stages(&["a"]);
    let err = insert_stage("p", &mut s, StageBuilder::new("x").after("nope").build()).unwrap_err();
    match err {
        IjError::StageNotDeclared { plan, stage, anchor } => {
            assert_eq!((plan.as_str(), stage.as_str(), anchor.as_str()), ("p", "x", "nope"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(names(&s), vec!["a"]);
}

#[test]
fn both_anchors_is_an_error_even_for_existing_stage() {
    let mut s = stages(&["a", "b"]);
    let err = insert_stage(
        "p",
        &mut s,
        StageBuilder::new("a").before("b").after("b").build(),
    )
    .unwrap_err();
    assert!(matches!(err, IjError::StageAnchorConflict { .. }), "got {err:?}");
}

#[test]
fn same_name_replaces_in_place() {
    let mut s = stages(&["a", "b", "c"]);
    insert_stage("p", &mut s, StageBuilder::new("b").task("t").parallel().build()).unwrap();
    assert_eq!(names(&s), vec!["a", "b", "c"]);
    assert!(s[1].parallel);
    assert_eq!(s[1].tasks[0].name, "t");
}

#[test]
fn same_name_with_anchor_is_ambiguous() {
    let mut s = stages(&["a", "b"]);
    let err = insert_stage("p", &mut s, StageBuilder::new("b").after("a").build()).unwrap_err();
    assert!(matches!(err, IjError::AmbiguousStageOverride { .. }), "got {err:?}");
}

#[test]
fn unanchored_new_stage_is_appended() {
    let mut s = stages(&["a"]);
    insert_stage("p", &mut s, StageBuilder::new("z").build()).unwrap();
    assert_eq!(names(&s), vec!["a", "z"]);
}

fn parent_config() -> RawConfig {
    ConfigBuilder::new()
        .with_environment("A=parent")
        .with_task("t", TaskBuilder::run("alpine", "true").build())
        .with_plan(
            "default",
            PlanBuilder::new()
                .env("P=1")
                .stage(StageBuilder::new("build").task("t").build())
                .stage(StageBuilder::new("test").task("t").build())
                .build(),
        )
        .with_metaplan("all", &["default"])
        .build_raw()
}

#[test]
fn extending_plan_merges_stages_and_environment() {
    let mut parent = parent_config();
    parent.populate_names();

    let child = ConfigBuilder::new()
        .with_environment("A=child")
        .with_plan(
            "default",
            PlanBuilder::new()
                .extend()
                .env("P=2")
                .stage(StageBuilder::new("lint").task("t").before("test").build())
                .build(),
        )
        .build_raw();

    parent.merge(child).unwrap();

    assert_eq!(parent.environment, vec!["A=parent", "A=child"]);
    let plan = &parent.plans["default"];
    assert_eq!(names(&plan.stages), vec!["build", "lint", "test"]);
    assert_eq!(plan.environment, vec!["P=1", "P=2"]);
}

#[test]
fn non_extending_plan_replaces_parent_plan() {
    let mut parent = parent_config();
    parent.populate_names();

    let child = ConfigBuilder::new()
        .with_plan(
            "default",
            PlanBuilder::new()
                .stage(StageBuilder::new("only").task("t").build())
                .build(),
        )
        .with_metaplan("extra", &["default"])
        .build_raw();

    parent.merge(child).unwrap();

    assert_eq!(names(&parent.plans["default"].stages), vec!["only"]);
    assert!(parent.metaplans.contains_key("all"));
    assert!(parent.metaplans.contains_key("extra"));
}

#[test]
fn child_task_replaces_parent_task() {
    let mut parent = parent_config();
    let child = ConfigBuilder::new()
        .with_task("t", TaskBuilder::build_image(&["x"]).build())
        .build_raw();

    parent.merge(child).unwrap();
    assert_eq!(parent.tasks["t"].kind(), "build");
}

proptest! {
    // Inserting relative to any existing stage never reorders the others.
    #[test]
    fn insertion_preserves_relative_order(
        count in 1usize..8,
        anchor_seed in any::<usize>(),
        before in any::<bool>(),
    ) {
        let original: Vec<String> = (0..count).map(|i| format!("s{i}")).collect();
        let refs: Vec<&str> = original.iter().map(String::as_str).collect();
        let mut s = stages(&refs);

        let anchor = &original[anchor_seed % count];
        let new = if before {
            StageBuilder::new("new").before(anchor).build()
        } else {
            StageBuilder::new("new").after(anchor).build()
        };
        insert_stage("p", &mut s, new).unwrap();

        let anchor_idx = s.iter().position(|st| &st.name == anchor).unwrap();
        let new_idx = s.iter().position(|st| st.name == "new").unwrap();
        if before {
            prop_assert_eq!(new_idx + 1, anchor_idx);
        } else {
            prop_assert_eq!(anchor_idx + 1, new_idx);
        }

        let rest: Vec<&str> = s.iter().map(|st| st.name.as_str()).filter(|n| *n != "new").collect();
        prop_assert_eq!(rest, refs);
    }
}
