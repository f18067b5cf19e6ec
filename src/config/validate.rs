// src/config/validate.rs

use std::collections::HashSet;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::extends::resolve_extends;
use crate::config::model::{Config, RawConfig, Task, parse_duration};
use crate::errors::{IjError, Result};

impl TryFrom<RawConfig> for Config {
    type Error = IjError;

    fn try_from(mut raw: RawConfig) -> std::result::Result<Self, Self::Error> {
        raw.populate_names();
        let mut tasks = raw.tasks.clone();
        resolve_extends(&mut tasks)?;
        let config = Config::new_unchecked(raw, tasks);
        validate_config(&config)?;
        Ok(config)
    }
}

/// Check referential integrity of an already-resolved config.
pub fn validate_config(cfg: &Config) -> Result<()> {
    validate_names_disjoint(cfg)?;
    validate_options(cfg)?;
    validate_plans(cfg)?;
    validate_plan_tasks(cfg)?;
    validate_metaplans(cfg)?;
    Ok(())
}

fn validate_names_disjoint(cfg: &Config) -> Result<()> {
    for name in cfg.metaplans.keys() {
        if cfg.plans.contains_key(name) {
            return Err(IjError::DuplicateName(name.clone()));
        }
    }
    Ok(())
}

fn validate_options(cfg: &Config) -> Result<()> {
    if let Some(interval) = cfg.options.healthcheck_interval.as_deref() {
        parse_duration(interval).map_err(|e| {
            IjError::Config(format!("options.healthcheck_interval: {e}"))
        })?;
    }
    Ok(())
}

fn validate_plans(cfg: &Config) -> Result<()> {
    for (plan_name, plan) in cfg.plans.iter() {
        let mut seen = HashSet::new();
        for stage in plan.stages.iter() {
            if stage.name.is_empty() {
                return Err(IjError::Config(format!(
                    "plan '{plan_name}' has a stage without a name"
                )));
            }
            if !seen.insert(stage.name.as_str()) {
                return Err(IjError::Config(format!(
                    "plan '{plan_name}' declares stage '{}' more than once",
                    stage.name
                )));
            }
            for stage_task in stage.tasks.iter() {
                if !cfg.tasks.contains_key(&stage_task.name) {
                    return Err(IjError::UnknownReference {
                        kind: "task",
                        name: stage_task.name.clone(),
                        referrer: format!("{plan_name}/{}", stage.name),
                    });
                }
            }
        }
    }
    Ok(())
}

fn validate_plan_tasks(cfg: &Config) -> Result<()> {
    for (name, task) in cfg.tasks.iter() {
        if let Task::Plan(plan_task) = task {
            if !cfg.is_plan_or_metaplan(&plan_task.plan) {
                return Err(IjError::UnknownReference {
                    kind: "plan",
                    name: plan_task.plan.clone(),
                    referrer: name.clone(),
                });
            }
        }
    }
    Ok(())
}

fn validate_metaplans(cfg: &Config) -> Result<()> {
    for (name, members) in cfg.metaplans.iter() {
        for member in members.iter() {
            if !cfg.is_plan_or_metaplan(member) {
                return Err(IjError::UnknownReference {
                    kind: "plan",
                    name: member.clone(),
                    referrer: name.clone(),
                });
            }
        }
    }

    // Edge direction: metaplan -> member metaplan. Plans are leaves and
    // cannot close a cycle, so only metaplan-to-metaplan edges matter.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.metaplans.keys() {
        graph.add_node(name.as_str());
    }

    for (name, members) in cfg.metaplans.iter() {
        for member in members.iter() {
            if cfg.metaplans.contains_key(member) {
                graph.add_edge(name.as_str(), member.as_str(), ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(IjError::CyclicMetaplan(cycle.node_id().to_string())),
    }
}
