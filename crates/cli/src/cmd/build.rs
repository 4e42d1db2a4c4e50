//! Implementation of the `b3 build` command.
//!
//! Resolves the requested addresses, then either lists the rules in execution order or
//! executes them and prints a per-rule summary.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use serde::Serialize;

use b3_lib::{BuildConfig, BuildReport, Engine, ExecutionPlan};

use crate::output::{
  OutputFormat, format_duration, print_detail, print_error, print_json, print_success, print_warning,
};

pub struct BuildOptions {
  /// Skip rules that produced no artifacts.
  pub quiet: bool,
  pub list: bool,
  pub format: OutputFormat,
  pub passthrough: Vec<String>,
}

#[derive(Serialize)]
struct ListedRule {
  label: String,
  rule_type: String,
  wave: usize,
}

pub fn cmd_build(config: BuildConfig, targets: &[String], options: &BuildOptions) -> Result<ExitCode> {
  let mut engine = Engine::new(config).context("Failed to open workspace")?;
  let plan = engine.prepare(targets).context("Failed to resolve targets")?;

  if options.list {
    print_list(&engine, &plan, options.format)?;
    return Ok(ExitCode::SUCCESS);
  }

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt.block_on(engine.execute(&plan, &options.passthrough));

  if options.format.is_json() {
    print_json(&report)?;
  } else {
    print_report(&report, engine.config().root.as_path(), options.quiet);
  }

  Ok(if report.success() {
    ExitCode::SUCCESS
  } else {
    ExitCode::FAILURE
  })
}

fn print_list(engine: &Engine, plan: &ExecutionPlan, format: OutputFormat) -> Result<()> {
  let listed: Vec<ListedRule> = plan
    .waves
    .iter()
    .enumerate()
    .flat_map(|(wave, ids)| ids.iter().map(move |id| (wave, *id)))
    .filter_map(|(wave, id)| {
      let rule = engine.workspace().rule(id)?;
      Some(ListedRule {
        label: rule.label(),
        rule_type: rule.rule_type().to_string(),
        wave,
      })
    })
    .collect();

  if format.is_json() {
    print_json(&listed)?;
  } else {
    for rule in &listed {
      println!("{}", rule.label);
    }
  }
  Ok(())
}

fn print_report(report: &BuildReport, root: &Path, quiet: bool) {
  for built in &report.built {
    if quiet && built.outputs.is_empty() {
      continue;
    }
    print_success(&format!(
      "{} ({}) in {}",
      built.label,
      built.rule_type,
      format_duration(built.duration)
    ));
    for output in &built.outputs {
      let shown = output.strip_prefix(root).unwrap_or(output);
      print_detail(&shown.display().to_string());
    }
  }

  for failed in &report.failed {
    print_error(&format!("{} failed: {}", failed.label, failed.error));
  }
  for skipped in &report.skipped {
    print_warning(&format!(
      "{} skipped: dependency {} did not build",
      skipped.label, skipped.failed_dependency
    ));
  }

  println!();
  let summary = format!("{} in {}", report, format_duration(report.duration));
  if report.success() {
    print_success(&summary);
  } else {
    print_error(&summary);
  }
}
