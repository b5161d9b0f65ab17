//! External parameter resolution.
//!
//! Targets declare requirements against named parameters; actions read them
//! through the [`ActionContext`](crate::context::ActionContext). Where the
//! values come from is the embedder's choice: the engine only sees the
//! [`ParameterSource`] trait, which returns a value or an explicit absence
//! per key.

use std::collections::HashMap;
use std::sync::Arc;

/// A key→value provider for build parameters.
pub trait ParameterSource: Send + Sync {
  /// Resolve a parameter by name. `None` means the parameter is absent.
  fn get(&self, key: &str) -> Option<String>;
}

/// Resolves parameters from process environment variables.
///
/// A key is looked up verbatim first, then normalized to the conventional
/// environment spelling (`api-key` → `API_KEY`).
#[derive(Debug, Clone, Default)]
pub struct EnvParameters;

impl EnvParameters {
  pub fn new() -> Self {
    Self
  }

  fn normalize(key: &str) -> String {
    key.replace('-', "_").replace('.', "_").to_uppercase()
  }
}

impl ParameterSource for EnvParameters {
  fn get(&self, key: &str) -> Option<String> {
    std::env::var(key).ok().or_else(|| std::env::var(Self::normalize(key)).ok())
  }
}

/// Explicit in-memory parameters, used for injected values and tests.
#[derive(Debug, Clone, Default)]
pub struct MapParameters {
  values: HashMap<String, String>,
}

impl MapParameters {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
    self.values.insert(key.into(), value.into());
  }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapParameters {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    Self {
      values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
    }
  }
}

impl ParameterSource for MapParameters {
  fn get(&self, key: &str) -> Option<String> {
    self.values.get(key).cloned()
  }
}

/// Layered lookup across several sources; the first hit wins.
///
/// Typical layering puts command-line values over the environment.
#[derive(Clone, Default)]
pub struct LayeredParameters {
  layers: Vec<Arc<dyn ParameterSource>>,
}

impl LayeredParameters {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn layer(mut self, source: impl ParameterSource + 'static) -> Self {
    self.layers.push(Arc::new(source));
    self
  }
}

impl ParameterSource for LayeredParameters {
  fn get(&self, key: &str) -> Option<String> {
    self.layers.iter().find_map(|layer| layer.get(key))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  fn map_parameters_resolve_and_miss() {
    let params = MapParameters::from_iter([("configuration", "Release")]);

    assert_eq!(params.get("configuration").as_deref(), Some("Release"));
    assert_eq!(params.get("missing"), None);
  }

  #[test]
  #[serial]
  fn env_parameters_normalize_keys() {
    temp_env::with_var("API_KEY", Some("s3cret"), || {
      let params = EnvParameters::new();
      assert_eq!(params.get("api-key").as_deref(), Some("s3cret"));
      assert_eq!(params.get("API_KEY").as_deref(), Some("s3cret"));
      assert_eq!(params.get("api.key").as_deref(), Some("s3cret"));
    });
  }

  #[test]
  #[serial]
  fn env_parameters_prefer_verbatim_key() {
    temp_env::with_vars([("answer", Some("42")), ("ANSWER", Some("43"))], || {
      let params = EnvParameters::new();
      assert_eq!(params.get("answer").as_deref(), Some("42"));
    });
  }

  #[test]
  fn layered_first_hit_wins() {
    let cli = MapParameters::from_iter([("configuration", "Debug")]);
    let defaults = MapParameters::from_iter([("configuration", "Release"), ("runtime", "linux-x64")]);
    let layered = LayeredParameters::new().layer(cli).layer(defaults);

    assert_eq!(layered.get("configuration").as_deref(), Some("Debug"));
    assert_eq!(layered.get("runtime").as_deref(), Some("linux-x64"));
    assert_eq!(layered.get("missing"), None);
  }
}
