//! Action execution.
//!
//! A rule's [`BuildPlan`](crate::rule::BuildPlan) is a list of [`Action`]s run in order; the
//! first failing action fails the rule.

pub mod cmd;
pub mod types;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

pub use cmd::{display_command, execute_cmd};
pub use types::{ActionResult, ExecuteError};

/// One step of a rule's build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
  /// Run `program` with `args` in `cwd`, adding `env` to the inherited environment.
  Cmd {
    program: String,
    args: Vec<String>,
    cwd: PathBuf,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    env: BTreeMap<String, String>,
  },
  /// Copy a file, creating the destination's parent directories.
  Copy { from: PathBuf, to: PathBuf },
  /// Create a directory and its parents.
  Mkdir { path: PathBuf },
}

impl Action {
  pub fn cmd(program: impl Into<String>, args: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
    Action::Cmd {
      program: program.into(),
      args,
      cwd: cwd.into(),
      env: BTreeMap::new(),
    }
  }
}

impl fmt::Display for Action {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Action::Cmd { program, args, .. } => write!(f, "{}", display_command(program, args)),
      Action::Copy { from, to } => write!(f, "copy {} -> {}", from.display(), to.display()),
      Action::Mkdir { path } => write!(f, "mkdir {}", path.display()),
    }
  }
}

/// Execute a single action.
pub async fn execute_action(action: &Action, timeout: Option<Duration>) -> Result<ActionResult, ExecuteError> {
  match action {
    Action::Cmd {
      program,
      args,
      cwd,
      env,
    } => {
      let output = execute_cmd(program, args, cwd, env, timeout).await?;
      Ok(ActionResult { output })
    }
    Action::Copy { from, to } => {
      execute_copy(from, to).await?;
      Ok(ActionResult {
        output: to.to_string_lossy().into_owned(),
      })
    }
    Action::Mkdir { path } => {
      tokio::fs::create_dir_all(path).await?;
      Ok(ActionResult {
        output: path.to_string_lossy().into_owned(),
      })
    }
  }
}

/// Execute actions in order, stopping at the first failure.
pub async fn execute_actions(actions: &[Action], timeout: Option<Duration>) -> Result<Vec<ActionResult>, ExecuteError> {
  let mut results = Vec::with_capacity(actions.len());
  for (index, action) in actions.iter().enumerate() {
    debug!(index, action = %action, "running action");
    results.push(execute_action(action, timeout).await?);
  }
  Ok(results)
}

async fn execute_copy(from: &Path, to: &Path) -> Result<(), ExecuteError> {
  let copy_err = |source| ExecuteError::Copy {
    from: from.to_path_buf(),
    to: to.to_path_buf(),
    source,
  };
  if let Some(parent) = to.parent() {
    tokio::fs::create_dir_all(parent).await.map_err(copy_err)?;
  }
  tokio::fs::copy(from, to).await.map_err(copy_err)?;
  Ok(())
}
