//! Types for planning and executing a build.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::execute::ExecuteError;
use crate::graph::GraphError;
use crate::rule::{RuleError, RuleId};
use crate::workspace::WorkspaceError;

/// Errors that stop a build before any rule executes.
#[derive(Debug, Error)]
pub enum EngineError {
  #[error(transparent)]
  Workspace(#[from] WorkspaceError),

  #[error(transparent)]
  Graph(#[from] GraphError),

  /// A requested rule depends on a fork with no candidate for its language.
  #[error("{consumer} depends on {fork}, which has no candidate for language {}", .language.as_deref().unwrap_or("<none>"))]
  UnresolvedFork {
    fork: String,
    consumer: String,
    language: Option<String>,
  },

  #[error("invalid workspace root {}: {source}", path.display())]
  Root {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// The requested rules and their dependency closure, grouped into waves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
  pub targets: Vec<RuleId>,
  /// Every rule's dependencies are in an earlier wave.
  pub waves: Vec<Vec<RuleId>>,
}

impl ExecutionPlan {
  /// All rules in execution order.
  pub fn order(&self) -> impl Iterator<Item = RuleId> + '_ {
    self.waves.iter().flatten().copied()
  }

  pub fn len(&self) -> usize {
    self.waves.iter().map(Vec::len).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// Why a rule failed.
#[derive(Debug, Error)]
pub enum RuleFailure {
  #[error("cannot plan: {0}")]
  Plan(#[from] RuleError),

  #[error(transparent)]
  Execute(#[from] ExecuteError),

  #[error("execution task panicked: {0}")]
  Panicked(String),
}

impl Serialize for RuleFailure {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuiltRule {
  pub id: RuleId,
  pub label: String,
  pub rule_type: String,
  pub outputs: Vec<PathBuf>,
  pub actions: usize,
  #[serde(serialize_with = "serialize_duration")]
  pub duration: Duration,
}

#[derive(Debug, Serialize)]
pub struct FailedRule {
  pub id: RuleId,
  pub label: String,
  pub error: RuleFailure,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedRule {
  pub id: RuleId,
  pub label: String,
  /// The failed (or skipped) dependency that caused the skip.
  pub failed_dependency: String,
}

/// Outcome of executing a plan.
#[derive(Debug, Default, Serialize)]
pub struct BuildReport {
  pub built: Vec<BuiltRule>,
  pub failed: Vec<FailedRule>,
  pub skipped: Vec<SkippedRule>,
  /// Rules already done before this run started.
  pub up_to_date: Vec<String>,
  #[serde(serialize_with = "serialize_duration")]
  pub duration: Duration,
}

impl BuildReport {
  pub fn success(&self) -> bool {
    self.failed.is_empty() && self.skipped.is_empty()
  }
}

impl fmt::Display for BuildReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{} built, {} failed, {} skipped, {} up to date",
      self.built.len(),
      self.failed.len(),
      self.skipped.len(),
      self.up_to_date.len()
    )
  }
}

fn serialize_duration<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.serialize_f64(duration.as_secs_f64())
}
