//! Implementation of the `b3 query` command.
//!
//! Prints each rule in the closure of the requested addresses with its type, language and
//! direct dependencies, in dependency order.

use std::process::ExitCode;

use anyhow::{Context, Result};
use serde::Serialize;

use b3_lib::{BuildConfig, Engine};

use crate::output::{OutputFormat, print_json, print_stat};

#[derive(Serialize)]
struct QueriedRule {
  label: String,
  rule_type: String,
  language: Option<String>,
  source: Option<String>,
  deps: Vec<String>,
}

pub fn cmd_query(config: BuildConfig, targets: &[String], format: OutputFormat) -> Result<ExitCode> {
  let mut engine = Engine::new(config).context("Failed to open workspace")?;
  let ids = engine.resolve(targets).context("Failed to resolve targets")?;

  let workspace = engine.workspace_mut();
  workspace.resolve_forks();
  let members = workspace.graph().subgraph(&ids);
  let order = workspace
    .graph()
    .topological(&members)
    .context("Dependency graph is not acyclic")?;

  let rules: Vec<QueriedRule> = order
    .into_iter()
    .filter_map(|id| {
      let rule = workspace.rule(id)?;
      Some(QueriedRule {
        label: rule.label(),
        rule_type: rule.rule_type().to_string(),
        language: rule.language().map(str::to_string),
        source: rule.source().map(|s| s.to_string()),
        deps: workspace
          .dependencies(id)
          .into_iter()
          .filter_map(|dep| workspace.rule(dep).map(|r| r.label()))
          .collect(),
      })
    })
    .collect();

  if format.is_json() {
    print_json(&rules)?;
  } else {
    for rule in &rules {
      println!("{} ({})", rule.label, rule.rule_type);
      if let Some(language) = &rule.language {
        print_stat("language", language);
      }
      if let Some(source) = &rule.source {
        print_stat("declared in", source);
      }
      if !rule.deps.is_empty() {
        print_stat("deps", &rule.deps.join(", "));
      }
    }
  }

  Ok(ExitCode::SUCCESS)
}
