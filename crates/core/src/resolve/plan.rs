//! Executable targets and the execution plan.
//!
//! The plan owns one [`ExecutableTarget`] per target that survived static
//! filtering, the deterministic topological order over them, and the
//! partition of the invoked subgraph into execution items. It is built once
//! per invocation and stays immutable apart from the per-target state cells.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::status::{ExecutionStatus, SkipCause, TargetState};
use crate::target::{Action, Condition, DependencyBehavior, Requirement};

/// A target inside an execution plan, with derived edges and run state.
pub struct ExecutableTarget {
  pub(crate) name: String,
  pub(crate) description: Option<String>,
  pub(crate) actions: Vec<Action>,
  pub(crate) dynamic_conditions: Vec<Condition>,
  pub(crate) requirements: Vec<Requirement>,
  pub(crate) dependency_behavior: DependencyBehavior,
  pub(crate) assured_after_failure: bool,
  pub(crate) proceed_after_failure: bool,
  pub(crate) unlisted: bool,
  pub(crate) is_default: bool,

  /// Hard predecessors: must reach a terminal state before this target starts.
  pub(crate) execution_dependencies: Vec<usize>,
  /// Soft predecessors: sequenced earlier without a completion requirement.
  pub(crate) order_dependencies: Vec<usize>,
  /// Targets whose completion conditionally enqueues this one.
  pub(crate) trigger_dependencies: Vec<usize>,
  /// Union of the three; the graph over these must be acyclic.
  pub(crate) all_dependencies: Vec<usize>,
  /// Targets this one schedules when it completes.
  pub(crate) triggers: Vec<usize>,

  pub(crate) invoked: AtomicBool,
  pub(crate) state: Mutex<TargetState>,
}

impl ExecutableTarget {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn description(&self) -> Option<&str> {
    self.description.as_deref()
  }

  pub fn is_default(&self) -> bool {
    self.is_default
  }

  pub fn is_unlisted(&self) -> bool {
    self.unlisted
  }

  pub fn is_invoked(&self) -> bool {
    self.invoked.load(Ordering::Acquire)
  }

  /// Flip the invoked flag; true when this call made the target invoked.
  pub(crate) fn mark_invoked(&self) -> bool {
    !self.invoked.swap(true, Ordering::AcqRel)
  }

  pub fn status(&self) -> ExecutionStatus {
    self.lock_state().status
  }

  pub fn skip_cause(&self) -> Option<SkipCause> {
    self.lock_state().skip_cause.clone()
  }

  pub fn failure(&self) -> Option<String> {
    self.lock_state().failure.clone()
  }

  pub fn duration(&self) -> Option<Duration> {
    self.lock_state().duration
  }

  /// Lines recorded through the action context during this run.
  pub fn log_lines(&self) -> Vec<String> {
    self.lock_state().log.clone()
  }

  pub fn execution_dependencies(&self) -> &[usize] {
    &self.execution_dependencies
  }

  pub fn order_dependencies(&self) -> &[usize] {
    &self.order_dependencies
  }

  pub fn trigger_dependencies(&self) -> &[usize] {
    &self.trigger_dependencies
  }

  pub fn all_dependencies(&self) -> &[usize] {
    &self.all_dependencies
  }

  pub fn triggers(&self) -> &[usize] {
    &self.triggers
  }

  fn lock_state(&self) -> std::sync::MutexGuard<'_, TargetState> {
    self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  pub(crate) fn mark_running(&self) {
    let mut state = self.lock_state();
    debug_assert_eq!(state.status, ExecutionStatus::NotRun);
    state.status = ExecutionStatus::Running;
    state.started_at = Some(Instant::now());
  }

  pub(crate) fn mark_succeeded(&self) -> Duration {
    let mut state = self.lock_state();
    let duration = state.started_at.map(|start| start.elapsed()).unwrap_or_default();
    state.status = ExecutionStatus::Succeeded;
    state.duration = Some(duration);
    duration
  }

  pub(crate) fn mark_failed(&self, message: String) -> Duration {
    let mut state = self.lock_state();
    let duration = state.started_at.map(|start| start.elapsed()).unwrap_or_default();
    state.status = ExecutionStatus::Failed;
    state.duration = Some(duration);
    state.failure = Some(message);
    duration
  }

  pub(crate) fn mark_skipped(&self, cause: SkipCause) {
    let mut state = self.lock_state();
    state.status = ExecutionStatus::Skipped;
    state.skip_cause = Some(cause);
  }

  pub(crate) fn mark_aborted(&self) {
    let mut state = self.lock_state();
    state.status = ExecutionStatus::Aborted;
  }

  pub(crate) fn push_log(&self, line: String) {
    self.lock_state().log.push(line);
  }
}

impl std::fmt::Debug for ExecutableTarget {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ExecutableTarget")
      .field("name", &self.name)
      .field("status", &self.status())
      .field("invoked", &self.is_invoked())
      .finish_non_exhaustive()
  }
}

/// A schedulable cohort of targets.
///
/// Members run sequentially within the item; items relate to each other
/// through the mapped dependencies of their members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionItem {
  pub(crate) targets: Vec<usize>,
  pub(crate) dependencies: Vec<usize>,
}

impl ExecutionItem {
  /// Member target indices, in execution order.
  pub fn targets(&self) -> &[usize] {
    &self.targets
  }

  /// Indices of items that must be resolved before this one is scheduled.
  pub fn dependencies(&self) -> &[usize] {
    &self.dependencies
  }
}

/// The validated, acyclic plan for one invocation.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
  pub(crate) targets: Vec<Arc<ExecutableTarget>>,
  pub(crate) by_name: HashMap<String, usize>,
  pub(crate) topo: Vec<usize>,
  pub(crate) items: Vec<ExecutionItem>,
  pub(crate) statically_excluded: Vec<String>,
}

impl ExecutionPlan {
  pub fn len(&self) -> usize {
    self.targets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.targets.is_empty()
  }

  pub fn targets(&self) -> impl Iterator<Item = &Arc<ExecutableTarget>> {
    self.targets.iter()
  }

  pub fn get(&self, name: &str) -> Option<&Arc<ExecutableTarget>> {
    self.by_name.get(name).map(|&index| &self.targets[index])
  }

  pub(crate) fn target(&self, index: usize) -> &Arc<ExecutableTarget> {
    &self.targets[index]
  }

  pub(crate) fn index_of(&self, name: &str) -> Option<usize> {
    self.by_name.get(name).copied()
  }

  /// Targets dropped by a false static condition, by name.
  pub fn statically_excluded(&self) -> &[String] {
    &self.statically_excluded
  }

  /// The partition of the initially invoked subgraph.
  pub fn execution_items(&self) -> &[ExecutionItem] {
    &self.items
  }

  /// Target indices in the plan's topological order.
  pub fn topological_order(&self) -> &[usize] {
    &self.topo
  }

  /// Mark a target and its transitive execution dependencies invoked.
  ///
  /// Returns the indices that became invoked by this call.
  pub(crate) fn invoke_with_dependencies(&self, start: usize) -> Vec<usize> {
    let mut newly = Vec::new();
    let mut stack = vec![start];

    while let Some(index) = stack.pop() {
      let target = &self.targets[index];
      if target.mark_invoked() {
        newly.push(index);
        stack.extend(target.execution_dependencies.iter().copied());
      }
    }

    newly
  }

  /// Partition a topo-ordered subset of targets into execution items.
  ///
  /// A target joins the most recent item only when an order dependency links
  /// it to a member and no execution or trigger dependency does; grouping
  /// over intervals of the topological order keeps the item graph acyclic.
  pub(crate) fn items_for(&self, subset: &[usize]) -> Vec<ExecutionItem> {
    let mut items: Vec<ExecutionItem> = Vec::new();
    let mut owner: HashMap<usize, usize> = HashMap::new();

    for &index in subset {
      let target = &self.targets[index];
      let joins_last = items.last().is_some_and(|item| {
        let ordered_in = target.order_dependencies.iter().any(|dep| item.targets.contains(dep));
        let hard_in = target
          .execution_dependencies
          .iter()
          .chain(&target.trigger_dependencies)
          .any(|dep| item.targets.contains(dep));
        ordered_in && !hard_in
      });

      if joins_last {
        let last = items.len() - 1;
        items[last].targets.push(index);
        owner.insert(index, last);
      } else {
        owner.insert(index, items.len());
        items.push(ExecutionItem {
          targets: vec![index],
          dependencies: Vec::new(),
        });
      }
    }

    let in_subset: HashSet<usize> = subset.iter().copied().collect();
    let mut dependencies: Vec<Vec<usize>> = Vec::with_capacity(items.len());

    for (item_index, item) in items.iter().enumerate() {
      let mut deps = Vec::new();
      for &member in &item.targets {
        for dep in &self.targets[member].all_dependencies {
          if !in_subset.contains(dep) {
            continue;
          }
          if let Some(&dep_item) = owner.get(dep)
            && dep_item != item_index
            && !deps.contains(&dep_item)
          {
            deps.push(dep_item);
          }
        }
      }
      deps.sort_unstable();
      dependencies.push(deps);
    }

    for (item, deps) in items.iter_mut().zip(dependencies) {
      item.dependencies = deps;
    }

    items
  }
}
