//! Command-line surface for build binaries.
//!
//! The host parses the process arguments into a run request: which targets
//! to run, how to walk the graph, and which parameters to inject over the
//! environment.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use ember_core::MapParameters;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

/// Arguments accepted by every Ember build binary.
#[derive(Debug, Parser)]
#[command(name = "ember", about = "Run targets of this build")]
pub struct RunArgs {
  /// Targets to run; defaults to the build's default target
  pub targets: Vec<String>,

  /// Walk independent branches of the graph concurrently
  #[arg(long)]
  pub parallel: bool,

  /// Maximum number of targets executing actions at the same time
  #[arg(long, value_name = "N")]
  pub parallelism: Option<usize>,

  /// Inject a build parameter; may be repeated
  #[arg(long = "param", value_name = "KEY=VALUE")]
  pub params: Vec<String>,

  /// Force the named target to skip for this run; may be repeated
  #[arg(long = "skip", value_name = "TARGET")]
  pub skip: Vec<String>,

  /// List the available targets and exit
  #[arg(long)]
  pub list: bool,

  /// Output format for the final report
  #[arg(long, value_enum, default_value = "text")]
  pub format: OutputFormat,

  /// Enable verbose logging
  #[arg(short, long)]
  pub verbose: bool,
}

/// Parse repeated `--param KEY=VALUE` pairs into a parameter source.
pub fn parse_params(pairs: &[String]) -> Result<MapParameters> {
  let mut params = MapParameters::new();
  for pair in pairs {
    let (key, value) = pair
      .split_once('=')
      .with_context(|| format!("invalid parameter '{pair}': expected KEY=VALUE"))?;
    params.insert(key.trim(), value);
  }
  Ok(params)
}

#[cfg(test)]
mod tests {
  use super::*;
  use ember_core::ParameterSource;

  #[test]
  fn parses_targets_and_flags() {
    let args = RunArgs::try_parse_from([
      "ember",
      "compile",
      "test",
      "--parallel",
      "--parallelism",
      "8",
      "--param",
      "configuration=Release",
      "--skip",
      "docs",
      "--format",
      "json",
    ])
    .unwrap();

    assert_eq!(args.targets, vec!["compile", "test"]);
    assert!(args.parallel);
    assert_eq!(args.parallelism, Some(8));
    assert_eq!(args.params, vec!["configuration=Release"]);
    assert_eq!(args.skip, vec!["docs"]);
    assert_eq!(args.format, OutputFormat::Json);
    assert!(!args.list);
  }

  #[test]
  fn defaults_are_sequential_text() {
    let args = RunArgs::try_parse_from(["ember"]).unwrap();
    assert!(args.targets.is_empty());
    assert!(!args.parallel);
    assert_eq!(args.format, OutputFormat::Text);
  }

  #[test]
  fn params_parse_into_a_source() {
    let params = parse_params(&["configuration=Release".to_string(), "api-key=a=b".to_string()]).unwrap();
    assert_eq!(params.get("configuration").as_deref(), Some("Release"));
    // only the first '=' separates key from value
    assert_eq!(params.get("api-key").as_deref(), Some("a=b"));
  }

  #[test]
  fn malformed_param_is_rejected() {
    let error = parse_params(&["configuration".to_string()]).unwrap_err();
    assert!(error.to_string().contains("expected KEY=VALUE"));
  }
}
