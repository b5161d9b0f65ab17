//! Pre-flight requirement validation.
//!
//! Before any action runs, every requirement declared by an invoked target
//! is checked against the run's parameter source. Validation does not stop
//! at the first violation: all missing parameters across all invoked targets
//! are aggregated into one error so a build author sees the complete picture
//! in a single pass.

use thiserror::Error;
use tracing::debug;

use crate::params::ParameterSource;
use crate::resolve::plan::ExecutionPlan;

/// One unresolved requirement: which target wants which parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementViolation {
  pub target: String,
  pub parameter: String,
}

/// Aggregate of every unresolved requirement found during pre-flight.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{} unresolved parameter requirement(s): {}", .violations.len(), render(.violations))]
pub struct RequirementError {
  pub violations: Vec<RequirementViolation>,
}

fn render(violations: &[RequirementViolation]) -> String {
  violations
    .iter()
    .map(|violation| format!("{} (required by {})", violation.parameter, violation.target))
    .collect::<Vec<_>>()
    .join(", ")
}

/// Check every requirement of every invoked target.
pub fn validate_requirements(plan: &ExecutionPlan, source: &dyn ParameterSource) -> Result<(), RequirementError> {
  let mut violations = Vec::new();

  for &index in plan.topological_order() {
    let target = plan.target(index);
    if !target.is_invoked() {
      continue;
    }

    for requirement in &target.requirements {
      let satisfied = requirement.satisfied_by(source);
      debug!(
        target_name = %target.name(),
        parameter = %requirement.key(),
        satisfied,
        "checked requirement"
      );
      if !satisfied {
        violations.push(RequirementViolation {
          target: target.name().to_string(),
          parameter: requirement.key().to_string(),
        });
      }
    }
  }

  if violations.is_empty() {
    Ok(())
  } else {
    Err(RequirementError { violations })
  }
}
