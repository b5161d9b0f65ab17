//! Graph resolver.
//!
//! Turns the set of declared targets into a closed, validated execution
//! plan:
//! - evaluates static conditions and drops failing targets with their edges
//! - merges the bidirectional declarations into directed edge sets
//! - computes the invocation closure over execution dependencies
//! - rejects cycles and unknown references before anything runs
//! - partitions the invoked subgraph into execution items

pub(crate) mod graph;
pub mod plan;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, info};

use crate::build::Build;
use crate::status::TargetState;
use crate::target::Target;

use plan::{ExecutableTarget, ExecutionPlan};

/// Errors detected while resolving a build into a plan.
///
/// All of these are fatal and reported before any execution starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
  #[error("duplicate target name: {0}")]
  DuplicateTarget(String),

  #[error("target '{target}' references unknown target '{reference}'")]
  UnknownReference { target: String, reference: String },

  #[error("requested target is not defined: {0}")]
  UnknownRequested(String),

  #[error("no targets requested and the build declares no default target")]
  NothingRequested,

  #[error("dependency cycle detected: {}", .cycle.join(" -> "))]
  Cycle { cycle: Vec<String> },
}

/// Resolve a build and a list of requested target names into a plan.
///
/// An empty request falls back to the build's default target. Requested
/// targets that were dropped by a static condition resolve to nothing rather
/// than erroring; names that were never declared do error.
pub fn resolve(build: &Build, requested: &[&str]) -> Result<ExecutionPlan, ResolveError> {
  let mut seen = HashSet::new();
  for target in build.targets() {
    if !seen.insert(target.name()) {
      return Err(ResolveError::DuplicateTarget(target.name().to_string()));
    }
  }

  let declared: HashSet<&str> = build.targets().iter().map(Target::name).collect();
  for target in build.targets() {
    for reference in edge_references(target) {
      if !declared.contains(reference.as_str()) {
        return Err(ResolveError::UnknownReference {
          target: target.name().to_string(),
          reference: reference.clone(),
        });
      }
    }
  }

  // 1. Static conditions: a dropped target takes its edges with it.
  let mut survivors: Vec<&Target> = Vec::new();
  let mut statically_excluded: Vec<String> = Vec::new();
  for target in build.targets() {
    match target.static_conditions.iter().find(|condition| !condition.evaluate()) {
      Some(condition) => {
        info!(
          target_name = %target.name(),
          condition = %condition.label(),
          "target excluded by static condition"
        );
        statically_excluded.push(target.name().to_string());
      }
      None => survivors.push(target),
    }
  }

  let index: HashMap<&str, usize> = survivors
    .iter()
    .enumerate()
    .map(|(position, target)| (target.name(), position))
    .collect();

  // 2. Merge the bidirectional declarations into directed edge sets.
  let mut executables: Vec<Arc<ExecutableTarget>> = Vec::with_capacity(survivors.len());
  for target in &survivors {
    let mut execution = resolve_names(&target.depends_on, &index);
    for (position, other) in survivors.iter().enumerate() {
      if other.dependent_for.iter().any(|name| name == target.name()) {
        push_unique(&mut execution, position);
      }
    }

    let mut order = resolve_names(&target.after, &index);
    for (position, other) in survivors.iter().enumerate() {
      if other.before.iter().any(|name| name == target.name()) {
        push_unique(&mut order, position);
      }
    }

    let mut trigger = resolve_names(&target.triggered_by, &index);
    for (position, other) in survivors.iter().enumerate() {
      if other.triggers.iter().any(|name| name == target.name()) {
        push_unique(&mut trigger, position);
      }
    }

    let mut forward = resolve_names(&target.triggers, &index);
    for (position, other) in survivors.iter().enumerate() {
      if other.triggered_by.iter().any(|name| name == target.name()) {
        push_unique(&mut forward, position);
      }
    }

    let mut all = execution.clone();
    for &dep in order.iter().chain(&trigger) {
      push_unique(&mut all, dep);
    }

    debug!(
      target_name = %target.name(),
      execution = execution.len(),
      order = order.len(),
      trigger = trigger.len(),
      "derived dependency edges"
    );

    executables.push(Arc::new(ExecutableTarget {
      name: target.name.clone(),
      description: target.description.clone(),
      actions: target.actions.clone(),
      dynamic_conditions: target.dynamic_conditions.clone(),
      requirements: target.requirements.clone(),
      dependency_behavior: target.dependency_behavior,
      assured_after_failure: target.assured_after_failure,
      proceed_after_failure: target.proceed_after_failure,
      unlisted: target.unlisted,
      is_default: build.default_target_name() == Some(target.name()),
      execution_dependencies: execution,
      order_dependencies: order,
      trigger_dependencies: trigger,
      all_dependencies: all,
      triggers: forward,
      invoked: AtomicBool::new(false),
      state: Mutex::new(TargetState::default()),
    }));
  }

  // 3. The union graph must be acyclic.
  let all_deps: Vec<Vec<usize>> = executables
    .iter()
    .map(|target| target.all_dependencies.clone())
    .collect();
  if let Err(members) = graph::verify_acyclic(&all_deps) {
    let cycle = members
      .into_iter()
      .map(|position| executables[position].name().to_string())
      .collect();
    return Err(ResolveError::Cycle { cycle });
  }

  let by_name: HashMap<String, usize> = executables
    .iter()
    .enumerate()
    .map(|(position, target)| (target.name().to_string(), position))
    .collect();

  let mut plan = ExecutionPlan {
    targets: executables,
    by_name,
    topo: graph::topological_order(&all_deps),
    items: Vec::new(),
    statically_excluded,
  };

  // 4. Invocation closure from the requested (or default) targets.
  let seeds = requested_seeds(build, requested, &declared, &plan)?;
  for seed in seeds {
    plan.invoke_with_dependencies(seed);
  }

  // 5. Partition the invoked subgraph into execution items.
  let invoked: Vec<usize> = plan
    .topo
    .iter()
    .copied()
    .filter(|&position| plan.target(position).is_invoked())
    .collect();
  plan.items = plan.items_for(&invoked);

  info!(
    targets = plan.len(),
    invoked = invoked.len(),
    items = plan.items.len(),
    excluded = plan.statically_excluded.len(),
    "execution plan resolved"
  );

  Ok(plan)
}

fn requested_seeds(
  build: &Build,
  requested: &[&str],
  declared: &HashSet<&str>,
  plan: &ExecutionPlan,
) -> Result<Vec<usize>, ResolveError> {
  if requested.is_empty() {
    let name = build.default_target_name().ok_or(ResolveError::NothingRequested)?;
    if !declared.contains(name) {
      return Err(ResolveError::UnknownRequested(name.to_string()));
    }
    return Ok(plan.index_of(name).into_iter().collect());
  }

  let mut seeds = Vec::new();
  for &name in requested {
    if !declared.contains(name) {
      return Err(ResolveError::UnknownRequested(name.to_string()));
    }
    // declared but statically dropped: vacuously satisfied
    if let Some(position) = plan.index_of(name) {
      seeds.push(position);
    }
  }
  Ok(seeds)
}

fn edge_references(target: &Target) -> impl Iterator<Item = &String> {
  target
    .depends_on
    .iter()
    .chain(&target.dependent_for)
    .chain(&target.before)
    .chain(&target.after)
    .chain(&target.triggers)
    .chain(&target.triggered_by)
}

fn resolve_names(names: &[String], index: &HashMap<&str, usize>) -> Vec<usize> {
  let mut resolved = Vec::new();
  for name in names {
    if let Some(&position) = index.get(name.as_str()) {
      push_unique(&mut resolved, position);
    }
  }
  resolved
}

fn push_unique(list: &mut Vec<usize>, value: usize) {
  if !list.contains(&value) {
    list.push(value);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::target::{Condition, Target};

  fn names(plan: &ExecutionPlan, indices: &[usize]) -> Vec<String> {
    indices
      .iter()
      .map(|&position| plan.target(position).name().to_string())
      .collect()
  }

  #[test]
  fn execution_edges_merge_without_duplication() {
    // compile names restore via depends_on, restore names compile via
    // dependent_for: one merged edge, not two
    let build = Build::new("merge")
      .target(Target::named("restore").dependent_for(["compile"]).finish())
      .target(Target::named("compile").depends_on(["restore"]).finish());

    let plan = resolve(&build, &["compile"]).unwrap();
    let compile = plan.get("compile").unwrap();

    assert_eq!(names(&plan, compile.execution_dependencies()), vec!["restore"]);
    assert_eq!(names(&plan, compile.all_dependencies()), vec!["restore"]);
  }

  #[test]
  fn order_edges_from_both_sides() {
    let build = Build::new("order")
      .target(Target::named("init").finish())
      .target(Target::named("clean").before(["compile"]).finish())
      .target(Target::named("compile").after(["init"]).finish());

    let plan = resolve(&build, &["compile"]).unwrap();
    let compile = plan.get("compile").unwrap();

    assert_eq!(names(&plan, compile.order_dependencies()), vec!["init", "clean"]);
    assert!(compile.execution_dependencies().is_empty());
  }

  #[test]
  fn trigger_edges_from_both_sides() {
    let build = Build::new("trigger")
      .target(Target::named("pack").triggers(["notify"]).finish())
      .target(Target::named("notify").finish())
      .target(Target::named("publish").triggered_by(["pack"]).finish());

    let plan = resolve(&build, &["pack"]).unwrap();
    let pack = plan.get("pack").unwrap();
    let notify = plan.get("notify").unwrap();
    let publish = plan.get("publish").unwrap();

    assert_eq!(names(&plan, pack.triggers()), vec!["notify", "publish"]);
    assert_eq!(names(&plan, notify.trigger_dependencies()), vec!["pack"]);
    assert_eq!(names(&plan, publish.trigger_dependencies()), vec!["pack"]);
  }

  #[test]
  fn static_condition_drops_target_and_edges() {
    let build = Build::new("static")
      .target(
        Target::named("docs")
          .only_when_static(Condition::new("docs enabled", || false))
          .finish(),
      )
      .target(Target::named("site").depends_on(["docs"]).finish());

    let plan = resolve(&build, &["site"]).unwrap();

    assert!(plan.get("docs").is_none());
    assert_eq!(plan.statically_excluded(), &["docs".to_string()]);

    let site = plan.get("site").unwrap();
    assert!(site.execution_dependencies().is_empty());
    assert!(site.is_invoked());
  }

  #[test]
  fn requesting_a_dropped_target_resolves_to_nothing() {
    let build = Build::new("static")
      .target(
        Target::named("docs")
          .only_when_static(Condition::new("docs enabled", || false))
          .finish(),
      )
      .target(Target::named("site").finish());

    let plan = resolve(&build, &["docs"]).unwrap();
    assert!(plan.targets().all(|target| !target.is_invoked()));
  }

  #[test]
  fn invocation_closure_follows_execution_edges_only() {
    let build = Build::new("closure")
      .target(Target::named("a").depends_on(["b"]).triggers(["u"]).finish())
      .target(Target::named("b").depends_on(["c"]).finish())
      .target(Target::named("c").finish())
      .target(Target::named("u").finish())
      .target(Target::named("loose").finish());

    let plan = resolve(&build, &["a"]).unwrap();

    assert!(plan.get("a").unwrap().is_invoked());
    assert!(plan.get("b").unwrap().is_invoked());
    assert!(plan.get("c").unwrap().is_invoked());
    // triggers are evaluated lazily at execution time
    assert!(!plan.get("u").unwrap().is_invoked());
    assert!(!plan.get("loose").unwrap().is_invoked());
  }

  #[test]
  fn default_target_used_when_nothing_requested() {
    let build = Build::new("default")
      .target(Target::named("compile").finish())
      .target(Target::named("test").depends_on(["compile"]).finish())
      .default_target("test");

    let plan = resolve(&build, &[]).unwrap();

    assert!(plan.get("test").unwrap().is_default());
    assert!(plan.get("test").unwrap().is_invoked());
    assert!(plan.get("compile").unwrap().is_invoked());
  }

  #[test]
  fn resolution_errors() {
    let duplicated = Build::new("dup")
      .target(Target::named("a").finish())
      .target(Target::named("a").finish());
    assert_eq!(
      resolve(&duplicated, &["a"]).unwrap_err(),
      ResolveError::DuplicateTarget("a".to_string())
    );

    let dangling = Build::new("dangling").target(Target::named("a").depends_on(["ghost"]).finish());
    assert_eq!(
      resolve(&dangling, &["a"]).unwrap_err(),
      ResolveError::UnknownReference {
        target: "a".to_string(),
        reference: "ghost".to_string(),
      }
    );

    let plain = Build::new("plain").target(Target::named("a").finish());
    assert_eq!(
      resolve(&plain, &["ghost"]).unwrap_err(),
      ResolveError::UnknownRequested("ghost".to_string())
    );
    assert_eq!(resolve(&plain, &[]).unwrap_err(), ResolveError::NothingRequested);
  }

  #[test]
  fn cycle_is_reported_with_names() {
    let build = Build::new("cycle")
      .target(Target::named("a").depends_on(["b"]).finish())
      .target(Target::named("b").after(["a"]).finish());

    match resolve(&build, &["a"]).unwrap_err() {
      ResolveError::Cycle { cycle } => {
        assert_eq!(cycle, vec!["a".to_string(), "b".to_string()]);
      }
      other => panic!("expected cycle error, got {other:?}"),
    }
  }

  #[test]
  fn order_linked_targets_share_an_item() {
    let build = Build::new("items")
      .target(Target::named("a").finish())
      .target(Target::named("b").after(["a"]).finish())
      .target(Target::named("c").depends_on(["a"]).finish());

    let plan = resolve(&build, &["a", "b", "c"]).unwrap();
    let items = plan.execution_items();

    assert_eq!(items.len(), 2);
    // a and b form one cohort: b is only order-linked to a
    assert_eq!(names(&plan, items[0].targets()), vec!["a", "b"]);
    assert_eq!(names(&plan, items[1].targets()), vec!["c"]);
    assert_eq!(items[1].dependencies(), &[0]);
  }

  #[test]
  fn execution_linked_targets_stay_in_dependency_ordered_items() {
    let build = Build::new("items")
      .target(Target::named("a").finish())
      .target(Target::named("b").depends_on(["a"]).finish());

    let plan = resolve(&build, &["b"]).unwrap();
    let items = plan.execution_items();

    assert_eq!(items.len(), 2);
    assert_eq!(names(&plan, items[0].targets()), vec!["a"]);
    assert_eq!(names(&plan, items[1].targets()), vec!["b"]);
    assert_eq!(items[1].dependencies(), &[0]);
  }
}
