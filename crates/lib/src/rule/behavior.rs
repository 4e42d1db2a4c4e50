//! The contract between the engine and concrete rule types.

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::Properties;
use super::args::{ArgError, RuleArgs};
use crate::config::Toolchain;
use crate::execute::Action;

/// Errors raised by a rule type while validating or planning.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleError {
  #[error(transparent)]
  Argument(#[from] ArgError),

  #[error("missing required argument '{0}'")]
  Missing(&'static str),

  #[error("{0}")]
  Invalid(String),
}

/// What a finished dependency hands to its dependents.
#[derive(Debug, Clone, PartialEq)]
pub struct DepOutputs {
  pub label: String,
  pub rule_type: String,
  pub language: Option<String>,
  /// Absolute directory of the dependency's declaration file.
  pub package_dir: PathBuf,
  pub outputs: Vec<PathBuf>,
}

/// Everything a rule type may look at when planning its work.
#[derive(Debug, Clone, Copy)]
pub struct PlanCtx<'a> {
  pub label: &'a str,
  pub name: &'a str,
  pub args: &'a RuleArgs,
  pub properties: &'a Properties,
  /// Absolute directory of the declaring file; sources are relative to it.
  pub package_dir: &'a Path,
  /// Directory reserved for this rule's artifacts. Exists before actions run.
  pub out_dir: &'a Path,
  pub deps: &'a [DepOutputs],
  pub toolchain: &'a Toolchain,
  /// Arguments given after `--` on the command line.
  pub passthrough: &'a [String],
}

impl PlanCtx<'_> {
  /// `srcs` resolved against the package directory.
  pub fn srcs(&self) -> Result<Vec<PathBuf>, RuleError> {
    Ok(
      self
        .args
        .string_list("srcs")?
        .iter()
        .map(|src| self.package_dir.join(src))
        .collect(),
    )
  }

  /// Like [`srcs`](Self::srcs) but at least one entry is required.
  pub fn required_srcs(&self) -> Result<Vec<PathBuf>, RuleError> {
    let srcs = self.srcs()?;
    if srcs.is_empty() {
      return Err(RuleError::Missing("srcs"));
    }
    Ok(srcs)
  }

  /// Outputs of direct dependencies whose file extension is `ext`.
  pub fn dep_outputs_with_extension(&self, ext: &str) -> Vec<PathBuf> {
    self
      .deps
      .iter()
      .flat_map(|dep| dep.outputs.iter())
      .filter(|path| path.extension().is_some_and(|e| e == ext))
      .cloned()
      .collect()
  }

  pub fn output(&self, file_name: impl AsRef<Path>) -> PathBuf {
    self.out_dir.join(file_name)
  }
}

/// Actions to run, in order, and the artifacts they leave behind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildPlan {
  pub actions: Vec<Action>,
  pub outputs: Vec<PathBuf>,
}

/// Behavior of a registered rule type.
///
/// Implementations only describe work; the engine runs the resulting actions.
pub trait RuleBehavior: Send + Sync {
  /// Check arguments at declaration time so mistakes surface while parsing.
  fn validate(&self, _args: &RuleArgs) -> Result<(), RuleError> {
    Ok(())
  }

  fn plan(&self, ctx: &PlanCtx<'_>) -> Result<BuildPlan, RuleError>;
}
