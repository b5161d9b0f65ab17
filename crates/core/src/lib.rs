//! ember-core: target model and execution engine for Ember builds
//!
//! This crate provides the fundamental types used throughout Ember:
//! - `Target`: a declared, named unit of build work with dependencies and conditions
//! - `Build`: the assembled set of targets handed to the resolver
//! - `ExecutionPlan`: the validated, acyclic plan derived from a build
//! - `execute`: sequential and parallel plan executors with failure propagation

pub mod build;
pub mod context;
pub mod execute;
pub mod params;
pub mod progress;
pub mod require;
pub mod resolve;
pub mod status;
pub mod target;

pub use build::{Build, TargetListing, TargetModule};
pub use context::ActionContext;
pub use execute::{
  ExecuteError, ExecuteOptions, ExecutionMode, PrimaryFailure, RunError, RunReport, TargetReport, execute, run_build,
};
pub use params::{EnvParameters, LayeredParameters, MapParameters, ParameterSource};
pub use progress::{NullSink, ProgressEvent, ProgressSink, TracingSink};
pub use require::{RequirementError, RequirementViolation};
pub use resolve::{ResolveError, resolve};
pub use resolve::plan::{ExecutableTarget, ExecutionItem, ExecutionPlan};
pub use status::{ExecutionStatus, SkipCause};
pub use target::{Action, ActionError, Condition, DependencyBehavior, Requirement, Target, TargetBuilder};
