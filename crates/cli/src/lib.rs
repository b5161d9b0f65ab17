//! ember-cli: host layer for Ember build binaries.
//!
//! A build binary declares its targets with `ember-core`, assembles them
//! into a [`Build`] and hands the result to [`run`]:
//!
//! ```no_run
//! use ember_core::{Build, Target};
//!
//! fn main() -> std::process::ExitCode {
//!   let build = Build::new("release")
//!     .target(Target::named("compile").executes(|_| Ok(())).finish())
//!     .default_target("compile");
//!   ember_cli::run(build)
//! }
//! ```
//!
//! The host parses the process arguments into a run request, layers
//! `--param` values over the environment, drives the engine on a tokio
//! runtime and renders the final report. No scheduling logic lives here.

pub mod args;
pub mod report;

use std::ffi::OsString;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ember_core::{Build, EnvParameters, ExecuteOptions, ExecutionMode, LayeredParameters, run_build};

use args::{OutputFormat, RunArgs, parse_params};

/// Parse the process arguments and run the build. The conventional `main`
/// body of a build binary.
pub fn run(build: Build) -> ExitCode {
  run_from(build, std::env::args_os())
}

/// Like [`run`], with explicit arguments.
pub fn run_from<I, T>(build: Build, argv: I) -> ExitCode
where
  I: IntoIterator<Item = T>,
  T: Into<OsString> + Clone,
{
  let args = match RunArgs::try_parse_from(argv) {
    Ok(args) => args,
    Err(err) => {
      let _ = err.print();
      return ExitCode::from(2);
    }
  };

  init_tracing(args.verbose);

  match host(build, args) {
    Ok(success) => {
      if success {
        ExitCode::SUCCESS
      } else {
        ExitCode::FAILURE
      }
    }
    Err(err) => {
      report::print_error(&format!("{err:#}"));
      ExitCode::FAILURE
    }
  }
}

fn host(build: Build, args: RunArgs) -> Result<bool> {
  tracing::debug!(build = %build.name(), targets = ?args.targets, "host starting");

  if args.list {
    report::print_listing(build.name(), &build.listing());
    return Ok(true);
  }

  let params = LayeredParameters::new()
    .layer(parse_params(&args.params)?)
    .layer(EnvParameters::new());

  let defaults = ExecuteOptions::default();
  let options = ExecuteOptions {
    mode: if args.parallel {
      ExecutionMode::Parallel
    } else {
      ExecutionMode::Sequential
    },
    parallelism: args.parallelism.unwrap_or(defaults.parallelism),
    skip_targets: args.skip.clone(),
    parameters: Arc::new(params),
    sink: defaults.sink,
  };

  let requested: Vec<&str> = args.targets.iter().map(String::as_str).collect();

  let runtime = tokio::runtime::Runtime::new().context("failed to create async runtime")?;
  let run_report = runtime.block_on(run_build(&build, &requested, &options))?;

  match args.format {
    OutputFormat::Text => report::print_report(&run_report),
    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&run_report)?),
  }

  Ok(run_report.is_success())
}

fn init_tracing(verbose: bool) {
  let filter = if verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::from_default_env()
  };
  let _ = tracing_subscriber::fmt().with_env_filter(filter).without_time().try_init();
}
