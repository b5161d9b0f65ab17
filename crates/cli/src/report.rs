//! Terminal rendering for listings and run reports.
//!
//! Formatting only; colors degrade gracefully when the stream does not
//! support them.

use std::time::Duration;

use owo_colors::{OwoColorize, Stream};

use ember_core::{ExecutionStatus, RunReport, TargetListing, TargetReport};

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const ARROW: &str = "→";
  pub const INFO: &str = "•";
}

pub fn format_duration(duration: Duration) -> String {
  // drop sub-millisecond noise
  humantime::format_duration(Duration::from_millis(duration.as_millis() as u64)).to_string()
}

pub fn render_listing(build_name: &str, listing: &[TargetListing]) -> String {
  let mut out = format!("Targets in {build_name}:\n");
  let width = listing.iter().map(|entry| entry.name.len()).max().unwrap_or(0);

  for entry in listing {
    let marker = if entry.is_default { " (default)" } else { "" };
    let description = entry.description.as_deref().unwrap_or("");
    out.push_str(&format!("  {:width$}  {}{}\n", entry.name, description, marker));
  }
  out
}

fn status_symbol(target: &TargetReport) -> &'static str {
  match target.status {
    ExecutionStatus::Succeeded => symbols::SUCCESS,
    ExecutionStatus::Failed => symbols::ERROR,
    ExecutionStatus::Skipped => symbols::WARNING,
    ExecutionStatus::Aborted => symbols::ARROW,
    ExecutionStatus::NotRun | ExecutionStatus::Running => symbols::INFO,
  }
}

fn target_line(target: &TargetReport) -> String {
  let detail = match target.status {
    ExecutionStatus::Succeeded => format!(
      "succeeded in {}",
      target.duration_ms.map(Duration::from_millis).map(format_duration).unwrap_or_default()
    ),
    ExecutionStatus::Failed => match &target.error {
      Some(error) => format!("failed: {error}"),
      None => "failed".to_string(),
    },
    ExecutionStatus::Skipped => match &target.skip_cause {
      Some(cause) => format!("skipped ({cause})"),
      None => "skipped".to_string(),
    },
    other => other.to_string(),
  };
  format!("{}  {}", target.name, detail)
}

fn render_summary(report: &RunReport) -> String {
  let mut out = format!(
    "Run {} in {} ({} succeeded, {} skipped, {} failed, {} aborted)\n",
    if report.is_success() { "succeeded" } else { "failed" },
    format_duration(Duration::from_millis(report.duration_ms)),
    report.count(ExecutionStatus::Succeeded),
    report.count(ExecutionStatus::Skipped),
    report.count(ExecutionStatus::Failed),
    report.count(ExecutionStatus::Aborted),
  );

  if let Some(primary) = &report.primary_failure {
    out.push_str(&format!("Caused by {}: {}\n", primary.target, primary.error));
  }
  out
}

pub fn render_report(report: &RunReport) -> String {
  let mut out = String::new();

  for target in &report.targets {
    out.push_str(status_symbol(target));
    out.push(' ');
    out.push_str(&target_line(target));
    out.push('\n');
  }

  out.push('\n');
  out.push_str(&render_summary(report));
  out
}

pub fn print_report(report: &RunReport) {
  for target in &report.targets {
    let symbol = status_symbol(target);
    let symbol = match target.status {
      ExecutionStatus::Succeeded => symbol.if_supports_color(Stream::Stdout, |s| s.green()).to_string(),
      ExecutionStatus::Failed | ExecutionStatus::Aborted => {
        symbol.if_supports_color(Stream::Stdout, |s| s.red()).to_string()
      }
      ExecutionStatus::Skipped => symbol.if_supports_color(Stream::Stdout, |s| s.yellow()).to_string(),
      _ => symbol.to_string(),
    };
    println!("{} {}", symbol, target_line(target));
  }

  print!("\n{}", render_summary(report));
}

pub fn print_listing(build_name: &str, listing: &[TargetListing]) {
  print!("{}", render_listing(build_name, listing));
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}
