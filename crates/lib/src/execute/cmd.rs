//! Cmd action implementation.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info};

use crate::execute::types::ExecuteError;

/// Execute a program with arguments.
///
/// The child inherits the environment, with `env` merged on top, and runs in `cwd`. With a
/// timeout, the child is killed when it expires.
///
/// # Returns
///
/// The stdout of the command on success (trimmed).
pub async fn execute_cmd(
  program: &str,
  args: &[String],
  cwd: &Path,
  env: &BTreeMap<String, String>,
  timeout: Option<Duration>,
) -> Result<String, ExecuteError> {
  let shown = display_command(program, args);
  info!(cmd = %shown, "executing command");

  let mut command = Command::new(program);
  command
    .args(args)
    .current_dir(cwd)
    .envs(env)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

  debug!(program = %program, working_dir = ?cwd, "spawning process");

  let child = command.spawn().map_err(|source| ExecuteError::Spawn {
    program: program.to_string(),
    source,
  })?;

  let output = match timeout {
    Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
      Ok(output) => output?,
      // Dropping the future drops the child, which kills it.
      Err(_) => {
        return Err(ExecuteError::Timeout {
          cmd: shown,
          timeout: limit,
        });
      }
    },
    None => child.wait_with_output().await?,
  };

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    let stdout = String::from_utf8_lossy(&output.stdout);

    if !stdout.is_empty() {
      debug!(stdout = %stdout, "command stdout");
    }

    return Err(ExecuteError::CmdFailed {
      cmd: shown,
      code: output.status.code(),
      stderr,
    });
  }

  let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

  if !stdout.is_empty() {
    debug!(stdout = %stdout, "command output");
  }

  Ok(stdout)
}

/// `program arg1 arg2`, quoting arguments that contain whitespace.
pub fn display_command(program: &str, args: &[String]) -> String {
  let mut parts = vec![program.to_string()];
  parts.extend(args.iter().map(|arg| {
    if arg.is_empty() || arg.chars().any(char::is_whitespace) {
      format!("'{}'", arg)
    } else {
      arg.clone()
    }
  }));
  parts.join(" ")
}
