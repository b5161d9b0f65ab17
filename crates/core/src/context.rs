//! Per-invocation context handed to actions.
//!
//! Replaces a global logger/parameter singleton with an explicit handle
//! scoped to one target inside one run: typed parameter access backed by the
//! run's parameter source, and a log channel that lands in the target's
//! in-memory buffer and the progress sink's message stream.

use std::str::FromStr;
use std::sync::Arc;

use crate::params::ParameterSource;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::resolve::plan::ExecutableTarget;

pub struct ActionContext {
  target: Arc<ExecutableTarget>,
  params: Arc<dyn ParameterSource>,
  sink: Arc<dyn ProgressSink>,
}

impl ActionContext {
  pub(crate) fn new(target: Arc<ExecutableTarget>, params: Arc<dyn ParameterSource>, sink: Arc<dyn ProgressSink>) -> Self {
    Self { target, params, sink }
  }

  /// Name of the target this action belongs to.
  pub fn target(&self) -> &str {
    self.target.name()
  }

  /// Resolve a parameter as a trimmed, non-empty string.
  pub fn parameter_str(&self, key: &str) -> Option<String> {
    self
      .params
      .get(key)
      .map(|value| value.trim().to_string())
      .filter(|value| !value.is_empty())
  }

  /// Resolve and parse a parameter. Declared requirements guarantee
  /// presence for invoked targets; absence or a parse failure yields `None`.
  pub fn parameter<T: FromStr>(&self, key: &str) -> Option<T> {
    self.parameter_str(key)?.parse().ok()
  }

  /// Record a line in the target's log buffer and forward it to the sink.
  pub fn log(&self, line: impl Into<String>) {
    let line = line.into();
    self.target.push_log(line.clone());
    self.sink.event(ProgressEvent::Message {
      target: self.target.name().to_string(),
      line,
    });
  }
}
