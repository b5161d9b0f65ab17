//! Build assembly.
//!
//! A [`Build`] collects the targets a build binary declares, names the
//! default target, and exposes the listing consumed by help output. Reusable
//! capability bundles implement [`TargetModule`] and are aggregated
//! explicitly with [`Build::compose`]; there is no implicit inheritance
//! between modules.

use crate::target::Target;

/// A composable provider of related targets.
///
/// Modules are pure: they hand out fresh target declarations and carry no
/// say over which other modules the assembly includes.
pub trait TargetModule {
  fn targets(&self) -> Vec<Target>;
}

/// The assembled set of declared targets for one build.
#[derive(Debug, Clone, Default)]
pub struct Build {
  name: String,
  targets: Vec<Target>,
  default_target: Option<String>,
}

/// One row of the build's target listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetListing {
  pub name: String,
  pub description: Option<String>,
  pub is_default: bool,
}

impl Build {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      targets: Vec::new(),
      default_target: None,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Register a target. Declaration order is preserved and used for
  /// deterministic tie-breaking during planning.
  pub fn target(mut self, target: Target) -> Self {
    self.targets.push(target);
    self
  }

  /// Aggregate every target a module contributes.
  pub fn compose(mut self, module: &dyn TargetModule) -> Self {
    self.targets.extend(module.targets());
    self
  }

  /// Name the target run when no targets are requested explicitly.
  pub fn default_target(mut self, name: impl Into<String>) -> Self {
    self.default_target = Some(name.into());
    self
  }

  pub fn targets(&self) -> &[Target] {
    &self.targets
  }

  pub(crate) fn default_target_name(&self) -> Option<&str> {
    self.default_target.as_deref()
  }

  /// The user-facing target listing: unlisted targets are hidden and the
  /// default target is marked.
  pub fn listing(&self) -> Vec<TargetListing> {
    self
      .targets
      .iter()
      .filter(|target| !target.unlisted)
      .map(|target| TargetListing {
        name: target.name.clone(),
        description: target.description.clone(),
        is_default: self.default_target.as_deref() == Some(target.name.as_str()),
      })
      .collect()
  }
}
