//! Progress events emitted by the executors.
//!
//! The engine reports state transitions and per-target messages through an
//! explicit [`ProgressSink`] scoped to one run; there is no global output
//! singleton. Sinks are passive observers and must not block the emitting
//! branch beyond a bounded enqueue.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::status::SkipCause;

/// A state transition or message for one target.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
  Started { target: String },
  Progressed { target: String, completed: usize, total: usize },
  Succeeded { target: String, duration: Duration },
  Failed { target: String, error: String },
  Skipped { target: String, cause: SkipCause },
  Aborted { target: String },
  Message { target: String, line: String },
}

/// Passive observer of run progress.
pub trait ProgressSink: Send + Sync {
  fn event(&self, event: ProgressEvent);
}

/// Forwards progress to the `tracing` subscriber. The default sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
  fn event(&self, event: ProgressEvent) {
    match event {
      ProgressEvent::Started { target } => info!(target_name = %target, "target started"),
      ProgressEvent::Progressed { target, completed, total } => {
        info!(target_name = %target, completed, total, "target progressed");
      }
      ProgressEvent::Succeeded { target, duration } => {
        info!(target_name = %target, duration_ms = duration.as_millis() as u64, "target succeeded");
      }
      ProgressEvent::Failed { target, error } => error!(target_name = %target, error = %error, "target failed"),
      ProgressEvent::Skipped { target, cause } => warn!(target_name = %target, cause = %cause, "target skipped"),
      ProgressEvent::Aborted { target } => warn!(target_name = %target, "target aborted"),
      ProgressEvent::Message { target, line } => info!(target_name = %target, "{line}"),
    }
  }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
  fn event(&self, _event: ProgressEvent) {}
}
