//! Plan execution.
//!
//! This module provides the main entry points for running an execution plan.
//! It handles:
//! - pre-flight requirement validation (aggregate, before any action)
//! - sequential and parallel walks of the plan
//! - failure propagation, abort semantics and assured cleanup targets
//! - trigger cascades scheduled from run-time outcomes
//! - the per-run report consumed by the host layer

pub(crate) mod gate;
mod parallel;
mod sequential;

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Semaphore, watch};
use tracing::{debug, error, info, warn};

use crate::build::Build;
use crate::context::ActionContext;
use crate::params::{EnvParameters, ParameterSource};
use crate::progress::{ProgressEvent, ProgressSink, TracingSink};
use crate::require::{RequirementError, validate_requirements};
use crate::resolve::plan::{ExecutableTarget, ExecutionPlan};
use crate::resolve::{ResolveError, resolve};
use crate::status::{ExecutionStatus, SkipCause};
use crate::target::DependencyBehavior;

/// How the plan is walked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMode {
  /// Single linear walk in topological order. The default.
  #[default]
  Sequential,
  /// Independent branches run concurrently with claim/join coordination.
  Parallel,
}

/// Configuration for one run.
#[derive(Clone)]
pub struct ExecuteOptions {
  pub mode: ExecutionMode,

  /// Maximum number of targets executing actions at the same time.
  pub parallelism: usize,

  /// Targets forced to skip for this run, by name.
  pub skip_targets: Vec<String>,

  /// Where requirement checks and action parameter lookups resolve from.
  pub parameters: Arc<dyn ParameterSource>,

  /// Observer for state transitions and per-target messages.
  pub sink: Arc<dyn ProgressSink>,
}

impl Default for ExecuteOptions {
  fn default() -> Self {
    Self {
      mode: ExecutionMode::default(),
      parallelism: default_parallelism(),
      skip_targets: Vec::new(),
      parameters: Arc::new(EnvParameters::new()),
      sink: Arc::new(TracingSink),
    }
  }
}

impl fmt::Debug for ExecuteOptions {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ExecuteOptions")
      .field("mode", &self.mode)
      .field("parallelism", &self.parallelism)
      .field("skip_targets", &self.skip_targets)
      .finish_non_exhaustive()
  }
}

fn default_parallelism() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

/// Errors that stop a run before any action executes.
#[derive(Debug, Error)]
pub enum ExecuteError {
  #[error(transparent)]
  Requirements(#[from] RequirementError),
}

/// Resolution or execution failure for the combined entry point.
#[derive(Debug, Error)]
pub enum RunError {
  #[error(transparent)]
  Resolve(#[from] ResolveError),

  #[error(transparent)]
  Execute(#[from] ExecuteError),
}

/// The originating failure of a run; later aborts reference it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrimaryFailure {
  pub target: String,
  pub error: String,
}

/// Per-target outcome in the final report.
#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
  pub name: String,
  pub status: ExecutionStatus,
  pub duration_ms: Option<u64>,
  pub skip_cause: Option<SkipCause>,
  pub error: Option<String>,
  pub log: Vec<String>,
}

/// Result of executing a plan.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
  /// Invoked targets in topological order, including triggered ones.
  pub targets: Vec<TargetReport>,
  pub primary_failure: Option<PrimaryFailure>,
  pub aborted: bool,
  pub duration_ms: u64,
}

impl RunReport {
  pub fn is_success(&self) -> bool {
    self.primary_failure.is_none() && !self.aborted
  }

  pub fn count(&self, status: ExecutionStatus) -> usize {
    self.targets.iter().filter(|target| target.status == status).count()
  }

  pub fn target(&self, name: &str) -> Option<&TargetReport> {
    self.targets.iter().find(|target| target.name == name)
  }
}

/// Shared state for one run, handed to the executor branches.
pub(crate) struct RunContext {
  pub(crate) plan: ExecutionPlan,
  pub(crate) params: Arc<dyn ParameterSource>,
  pub(crate) sink: Arc<dyn ProgressSink>,
  pub(crate) semaphore: Semaphore,
  skip_targets: Vec<String>,
  first_failure: OnceLock<PrimaryFailure>,
  cancel_tx: watch::Sender<bool>,
  cancel_rx: watch::Receiver<bool>,
}

impl RunContext {
  fn new(plan: ExecutionPlan, options: &ExecuteOptions) -> Self {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    Self {
      plan,
      params: options.parameters.clone(),
      sink: options.sink.clone(),
      semaphore: Semaphore::new(options.parallelism.max(1)),
      skip_targets: options.skip_targets.clone(),
      first_failure: OnceLock::new(),
      cancel_tx,
      cancel_rx,
    }
  }

  /// True once any branch has raised the abort signal.
  pub(crate) fn aborting(&self) -> bool {
    *self.cancel_rx.borrow()
  }

  pub(crate) fn signal_abort(&self) {
    let _ = self.cancel_tx.send(true);
  }

  /// Resolves once the abort signal is raised; pends forever otherwise.
  pub(crate) async fn cancelled(&self) {
    let mut rx = self.cancel_rx.clone();
    loop {
      if *rx.borrow_and_update() {
        return;
      }
      if rx.changed().await.is_err() {
        std::future::pending::<()>().await;
      }
    }
  }

  /// Retain the first failure; later callers lose the race and that is the
  /// point.
  pub(crate) fn record_failure(&self, target: &str, error: &str) {
    let _ = self.first_failure.set(PrimaryFailure {
      target: target.to_string(),
      error: error.to_string(),
    });
  }

  pub(crate) fn primary_failure(&self) -> Option<PrimaryFailure> {
    self.first_failure.get().cloned()
  }
}

/// Execute a resolved plan.
///
/// Requirements are validated first and reported as one aggregate error.
/// Action failures do not produce an `Err`: they are part of the returned
/// report, with the originating failure in `primary_failure`.
pub async fn execute(plan: &ExecutionPlan, options: &ExecuteOptions) -> Result<RunReport, ExecuteError> {
  let invoked = plan.targets().filter(|target| target.is_invoked()).count();
  info!(mode = ?options.mode, invoked, "starting execution");

  validate_requirements(plan, options.parameters.as_ref())?;

  let started = Instant::now();
  let ctx = Arc::new(RunContext::new(plan.clone(), options));

  match options.mode {
    ExecutionMode::Sequential => sequential::walk(&ctx).await,
    ExecutionMode::Parallel => parallel::walk(&ctx).await,
  }

  let report = build_report(&ctx, started.elapsed());
  info!(
    succeeded = report.count(ExecutionStatus::Succeeded),
    failed = report.count(ExecutionStatus::Failed),
    skipped = report.count(ExecutionStatus::Skipped),
    aborted = report.aborted,
    "execution complete"
  );

  Ok(report)
}

/// Resolve and execute in one step.
pub async fn run_build(build: &Build, requested: &[&str], options: &ExecuteOptions) -> Result<RunReport, RunError> {
  let plan = resolve(build, requested)?;
  Ok(execute(&plan, options).await?)
}

fn build_report(ctx: &RunContext, duration: Duration) -> RunReport {
  let mut targets = Vec::new();

  for &index in ctx.plan.topological_order() {
    let target = ctx.plan.target(index);
    if !target.is_invoked() {
      continue;
    }
    targets.push(TargetReport {
      name: target.name().to_string(),
      status: target.status(),
      duration_ms: target.duration().map(|d| d.as_millis() as u64),
      skip_cause: target.skip_cause(),
      error: target.failure(),
      log: target.log_lines(),
    });
  }

  RunReport {
    targets,
    primary_failure: ctx.primary_failure(),
    aborted: ctx.aborting(),
    duration_ms: duration.as_millis() as u64,
  }
}

/// Run one target through its state machine. Shared by both executors; the
/// caller guarantees (by walk order or claim) that it is the only path
/// executing this target.
pub(crate) async fn run_target(ctx: &Arc<RunContext>, index: usize) {
  let target = ctx.plan.target(index).clone();
  if target.status() != ExecutionStatus::NotRun {
    return;
  }

  let aborting = ctx.aborting();
  if aborting && !target.assured_after_failure {
    debug!(target_name = %target.name(), "aborted before start");
    target.mark_aborted();
    ctx.sink.event(ProgressEvent::Aborted {
      target: target.name().to_string(),
    });
    return;
  }

  if ctx.skip_targets.iter().any(|name| name == target.name()) {
    finish_skipped(
      ctx,
      &target,
      SkipCause::Condition {
        condition: "skipped by request".to_string(),
      },
    );
    return;
  }

  // Assured targets run their cleanup even when their prerequisites failed.
  if !(aborting && target.assured_after_failure)
    && let Some(cause) = blocked_by_dependency(ctx, &target)
  {
    finish_skipped(ctx, &target, cause);
    return;
  }

  if let Some(condition) = target.dynamic_conditions.iter().find(|condition| !condition.evaluate()) {
    finish_skipped(
      ctx,
      &target,
      SkipCause::Condition {
        condition: condition.label().to_string(),
      },
    );
    return;
  }

  target.mark_running();
  ctx.sink.event(ProgressEvent::Started {
    target: target.name().to_string(),
  });
  info!(target_name = %target.name(), "target started");

  let total = target.actions.len();
  let permit = ctx.semaphore.acquire().await.unwrap();

  let mut failure: Option<String> = None;
  for (position, action) in target.actions.iter().enumerate() {
    let action = action.clone();
    let action_ctx = ActionContext::new(target.clone(), ctx.params.clone(), ctx.sink.clone());

    match tokio::task::spawn_blocking(move || action.invoke(&action_ctx)).await {
      Ok(Ok(())) => ctx.sink.event(ProgressEvent::Progressed {
        target: target.name().to_string(),
        completed: position + 1,
        total,
      }),
      Ok(Err(err)) => {
        failure = Some(err.to_string());
        break;
      }
      Err(join_err) => {
        failure = Some(format!("action panicked: {join_err}"));
        break;
      }
    }
  }
  drop(permit);

  match failure {
    None => {
      let duration = target.mark_succeeded();
      info!(target_name = %target.name(), duration_ms = duration.as_millis() as u64, "target succeeded");
      ctx.sink.event(ProgressEvent::Succeeded {
        target: target.name().to_string(),
        duration,
      });
    }
    Some(message) => {
      target.mark_failed(message.clone());
      error!(target_name = %target.name(), error = %message, "target failed");
      ctx.sink.event(ProgressEvent::Failed {
        target: target.name().to_string(),
        error: message.clone(),
      });
      ctx.record_failure(target.name(), &message);
      if !target.proceed_after_failure {
        warn!(target_name = %target.name(), "aborting run");
        ctx.signal_abort();
      }
    }
  }

  fire_triggers(ctx, &target);
}

fn finish_skipped(ctx: &Arc<RunContext>, target: &Arc<ExecutableTarget>, cause: SkipCause) {
  warn!(target_name = %target.name(), cause = %cause, "target skipped");
  target.mark_skipped(cause.clone());
  ctx.sink.event(ProgressEvent::Skipped {
    target: target.name().to_string(),
    cause,
  });
  fire_triggers(ctx, target);
}

fn blocked_by_dependency(ctx: &RunContext, target: &ExecutableTarget) -> Option<SkipCause> {
  for &dep_index in target.execution_dependencies() {
    let dep = ctx.plan.target(dep_index);
    if !dep.is_invoked() {
      continue;
    }
    match dep.status() {
      ExecutionStatus::Failed | ExecutionStatus::Aborted => {
        return Some(SkipCause::DependencyFailed {
          dependency: dep.name().to_string(),
        });
      }
      // the behavior declared on the skipped dependency decides
      ExecutionStatus::Skipped if dep.dependency_behavior == DependencyBehavior::Skip => {
        return Some(SkipCause::DependencySkipped {
          dependency: dep.name().to_string(),
        });
      }
      _ => {}
    }
  }
  None
}

/// Cascade scheduling: a completed source enqueues its trigger destinations
/// together with their execution dependency closure. Fires on success, and
/// for assured sources on any terminal state.
fn fire_triggers(ctx: &RunContext, target: &ExecutableTarget) {
  let status = target.status();
  let fires = status == ExecutionStatus::Succeeded || (target.assured_after_failure && status.is_terminal());
  if !fires {
    return;
  }

  for &dest_index in target.triggers() {
    let dest = ctx.plan.target(dest_index);
    if dest.is_invoked() {
      continue;
    }
    ctx.plan.invoke_with_dependencies(dest_index);
    info!(source = %target.name(), triggered = %dest.name(), "trigger fired");
  }
}

#[cfg(test)]
pub(crate) mod testing {
  use std::sync::Arc;
  use std::sync::atomic::AtomicUsize;
  use std::sync::atomic::Ordering;

  use super::*;
  use crate::params::MapParameters;
  use crate::progress::NullSink;
  use crate::target::{Target, TargetBuilder};

  /// Options wired for tests: no environment access, no output.
  pub(crate) fn test_options(mode: ExecutionMode) -> ExecuteOptions {
    ExecuteOptions {
      mode,
      parallelism: 4,
      skip_targets: Vec::new(),
      parameters: Arc::new(MapParameters::new()),
      sink: Arc::new(NullSink),
    }
  }

  /// A target whose single action bumps a counter when it runs.
  pub(crate) fn counting(name: &str, counter: &Arc<AtomicUsize>) -> TargetBuilder {
    let counter = counter.clone();
    Target::named(name).executes(move |_| {
      counter.fetch_add(1, Ordering::SeqCst);
      Ok(())
    })
  }

  /// A target whose single action appends its name to a shared trace.
  pub(crate) fn recording(name: &str, trace: &Arc<std::sync::Mutex<Vec<String>>>) -> TargetBuilder {
    let trace = trace.clone();
    let label = name.to_string();
    Target::named(name).executes(move |_| {
      trace.lock().unwrap().push(label.clone());
      Ok(())
    })
  }

  /// A target whose single action fails.
  pub(crate) fn failing(name: &str) -> TargetBuilder {
    Target::named(name).executes(|_| Err("boom".into()))
  }
}
