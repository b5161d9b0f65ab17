//! Target declaration.
//!
//! A [`Target`] is an immutable description of one unit of build work: the
//! actions it runs, the targets it relates to, and the conditions under which
//! it runs at all. Targets are assembled through the fluent [`TargetBuilder`]
//! and accumulate pure data; no validation happens here. The resolver turns
//! the declared relations into a checked execution plan.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::context::ActionContext;
use crate::params::ParameterSource;

/// Error type produced by a failing action.
pub type ActionError = Box<dyn std::error::Error + Send + Sync>;

/// One unit of work inside a target.
///
/// Actions are opaque to the engine: it only observes whether the call
/// returned normally or raised an error. The [`ActionContext`] gives the
/// action parameter access and a log channel scoped to its target.
#[derive(Clone)]
pub struct Action {
  run: Arc<dyn Fn(&ActionContext) -> Result<(), ActionError> + Send + Sync>,
}

impl Action {
  pub fn new(run: impl Fn(&ActionContext) -> Result<(), ActionError> + Send + Sync + 'static) -> Self {
    Self { run: Arc::new(run) }
  }

  pub(crate) fn invoke(&self, ctx: &ActionContext) -> Result<(), ActionError> {
    (self.run)(ctx)
  }
}

impl fmt::Debug for Action {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("Action")
  }
}

/// A labeled predicate attached to a target.
///
/// Static conditions are evaluated once before planning; dynamic conditions
/// at execution time. The label is what shows up in skip causes and reports.
#[derive(Clone)]
pub struct Condition {
  label: String,
  predicate: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl Condition {
  pub fn new(label: impl Into<String>, predicate: impl Fn() -> bool + Send + Sync + 'static) -> Self {
    Self {
      label: label.into(),
      predicate: Arc::new(predicate),
    }
  }

  pub fn label(&self) -> &str {
    &self.label
  }

  pub(crate) fn evaluate(&self) -> bool {
    (self.predicate)()
  }
}

impl fmt::Debug for Condition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("Condition").field(&self.label).finish()
  }
}

/// A named-parameter requirement.
///
/// A requirement is satisfied when the run's parameter source yields a
/// non-empty value for the key that also passes the requirement's check
/// (for typed requirements, that the value parses).
#[derive(Clone)]
pub struct Requirement {
  parameter: String,
  check: Arc<dyn Fn(&str) -> bool + Send + Sync>,
}

impl Requirement {
  /// Require that the named parameter resolves to a non-empty value.
  pub fn parameter(key: impl Into<String>) -> Self {
    Self {
      parameter: key.into(),
      check: Arc::new(|_| true),
    }
  }

  /// Require that the named parameter resolves and parses as `T`.
  pub fn parameter_as<T: FromStr>(key: impl Into<String>) -> Self {
    Self {
      parameter: key.into(),
      check: Arc::new(|value| value.trim().parse::<T>().is_ok()),
    }
  }

  pub fn key(&self) -> &str {
    &self.parameter
  }

  pub(crate) fn satisfied_by(&self, source: &dyn ParameterSource) -> bool {
    match source.get(&self.parameter) {
      Some(value) if !value.trim().is_empty() => (self.check)(&value),
      _ => false,
    }
  }
}

impl fmt::Debug for Requirement {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("Requirement").field(&self.parameter).finish()
  }
}

/// Governs dependents of a target that was skipped by a dynamic condition.
///
/// Declared on the target that may be skipped. With `Skip` (the default) its
/// dependents are forced to skip as well; with `Execute` they proceed,
/// treating the skip as satisfied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DependencyBehavior {
  Execute,
  #[default]
  Skip,
}

/// A declared, named unit of build work.
///
/// Immutable once built; relations are recorded by name and resolved later.
#[derive(Debug, Clone)]
pub struct Target {
  pub(crate) name: String,
  pub(crate) description: Option<String>,
  pub(crate) actions: Vec<Action>,
  pub(crate) depends_on: Vec<String>,
  pub(crate) dependent_for: Vec<String>,
  pub(crate) before: Vec<String>,
  pub(crate) after: Vec<String>,
  pub(crate) triggers: Vec<String>,
  pub(crate) triggered_by: Vec<String>,
  pub(crate) static_conditions: Vec<Condition>,
  pub(crate) dynamic_conditions: Vec<Condition>,
  pub(crate) requirements: Vec<Requirement>,
  pub(crate) dependency_behavior: DependencyBehavior,
  pub(crate) assured_after_failure: bool,
  pub(crate) proceed_after_failure: bool,
  pub(crate) unlisted: bool,
}

impl Target {
  /// Start declaring a target with the given name.
  pub fn named(name: impl Into<String>) -> TargetBuilder {
    TargetBuilder {
      target: Target {
        name: name.into(),
        description: None,
        actions: Vec::new(),
        depends_on: Vec::new(),
        dependent_for: Vec::new(),
        before: Vec::new(),
        after: Vec::new(),
        triggers: Vec::new(),
        triggered_by: Vec::new(),
        static_conditions: Vec::new(),
        dynamic_conditions: Vec::new(),
        requirements: Vec::new(),
        dependency_behavior: DependencyBehavior::default(),
        assured_after_failure: false,
        proceed_after_failure: false,
        unlisted: false,
      },
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn description(&self) -> Option<&str> {
    self.description.as_deref()
  }
}

fn extend(list: &mut Vec<String>, names: impl IntoIterator<Item = impl Into<String>>) {
  list.extend(names.into_iter().map(Into::into));
}

/// Fluent configuration surface for a [`Target`].
///
/// Pure data accumulation; `finish` hands back the immutable target.
#[derive(Debug)]
pub struct TargetBuilder {
  target: Target,
}

impl TargetBuilder {
  pub fn description(mut self, description: impl Into<String>) -> Self {
    self.target.description = Some(description.into());
    self
  }

  /// Append an action to run, in declaration order.
  pub fn executes(mut self, run: impl Fn(&ActionContext) -> Result<(), ActionError> + Send + Sync + 'static) -> Self {
    self.target.actions.push(Action::new(run));
    self
  }

  /// Append a prebuilt action.
  pub fn action(mut self, action: Action) -> Self {
    self.target.actions.push(action);
    self
  }

  /// The named targets must complete before this one starts.
  pub fn depends_on(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
    extend(&mut self.target.depends_on, names);
    self
  }

  /// This target must complete before the named targets start.
  pub fn dependent_for(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
    extend(&mut self.target.dependent_for, names);
    self
  }

  /// Order this target before the named targets, without requiring them to run.
  pub fn before(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
    extend(&mut self.target.before, names);
    self
  }

  /// Order this target after the named targets, without requiring them to run.
  pub fn after(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
    extend(&mut self.target.after, names);
    self
  }

  /// Schedule the named targets once this one completes.
  pub fn triggers(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
    extend(&mut self.target.triggers, names);
    self
  }

  /// Schedule this target once any of the named targets completes.
  pub fn triggered_by(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
    extend(&mut self.target.triggered_by, names);
    self
  }

  /// Evaluated once before planning; false removes the target from the graph.
  pub fn only_when_static(mut self, condition: Condition) -> Self {
    self.target.static_conditions.push(condition);
    self
  }

  /// Evaluated at execution time; false marks the target skipped.
  pub fn only_when_dynamic(mut self, condition: Condition) -> Self {
    self.target.dynamic_conditions.push(condition);
    self
  }

  pub fn requires(mut self, requirement: Requirement) -> Self {
    self.target.requirements.push(requirement);
    self
  }

  /// How dependents behave when this target is skipped by a dynamic condition.
  pub fn when_skipped(mut self, behavior: DependencyBehavior) -> Self {
    self.target.dependency_behavior = behavior;
    self
  }

  /// Run this target even after the build has been aborted by a failure.
  pub fn assured_after_failure(mut self) -> Self {
    self.target.assured_after_failure = true;
    self
  }

  /// Failure of this target does not abort the overall run.
  pub fn proceed_after_failure(mut self) -> Self {
    self.target.proceed_after_failure = true;
    self
  }

  /// Exclude this target from the build's listing.
  pub fn unlisted(mut self) -> Self {
    self.target.unlisted = true;
    self
  }

  pub fn finish(self) -> Target {
    self.target
  }
}
