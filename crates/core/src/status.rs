//! Per-target execution status and run bookkeeping.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

/// The state machine a target moves through during one run.
///
/// `NotRun` is initial; `Running` is transient; the remaining four states
/// are terminal for the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
  #[default]
  NotRun,
  Running,
  Succeeded,
  Failed,
  Aborted,
  Skipped,
}

impl ExecutionStatus {
  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      ExecutionStatus::Succeeded | ExecutionStatus::Failed | ExecutionStatus::Aborted | ExecutionStatus::Skipped
    )
  }
}

impl fmt::Display for ExecutionStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let text = match self {
      ExecutionStatus::NotRun => "not run",
      ExecutionStatus::Running => "running",
      ExecutionStatus::Succeeded => "succeeded",
      ExecutionStatus::Failed => "failed",
      ExecutionStatus::Aborted => "aborted",
      ExecutionStatus::Skipped => "skipped",
    };
    f.write_str(text)
  }
}

/// Why a target ended up `Skipped`.
///
/// Distinguishes a skip the author asked for (a false dynamic condition)
/// from a skip that is a consequence of an upstream failure or skip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipCause {
  Condition { condition: String },
  DependencyFailed { dependency: String },
  DependencySkipped { dependency: String },
}

impl fmt::Display for SkipCause {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SkipCause::Condition { condition } => write!(f, "condition: {condition}"),
      SkipCause::DependencyFailed { dependency } => write!(f, "dependency failed: {dependency}"),
      SkipCause::DependencySkipped { dependency } => write!(f, "dependency skipped: {dependency}"),
    }
  }
}

/// Mutable per-run bookkeeping embedded in each executable target.
///
/// Mutated only by the path currently executing the target; other paths
/// read it after the claim/join primitive releases them.
#[derive(Debug, Default)]
pub struct TargetState {
  pub status: ExecutionStatus,
  pub skip_cause: Option<SkipCause>,
  pub failure: Option<String>,
  pub started_at: Option<Instant>,
  pub duration: Option<Duration>,
  pub log: Vec<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn terminal_states() {
    assert!(!ExecutionStatus::NotRun.is_terminal());
    assert!(!ExecutionStatus::Running.is_terminal());
    assert!(ExecutionStatus::Succeeded.is_terminal());
    assert!(ExecutionStatus::Failed.is_terminal());
    assert!(ExecutionStatus::Aborted.is_terminal());
    assert!(ExecutionStatus::Skipped.is_terminal());
  }

  #[test]
  fn skip_cause_display() {
    let cause = SkipCause::Condition {
      condition: "docs enabled".to_string(),
    };
    assert_eq!(cause.to_string(), "condition: docs enabled");

    let cause = SkipCause::DependencyFailed {
      dependency: "compile".to_string(),
    };
    assert_eq!(cause.to_string(), "dependency failed: compile");
  }

  #[test]
  fn status_serializes_snake_case() {
    let json = serde_json::to_string(&ExecutionStatus::NotRun).unwrap();
    assert_eq!(json, "\"not_run\"");
  }
}
