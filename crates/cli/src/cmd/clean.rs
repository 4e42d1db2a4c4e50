//! Implementation of the `b3 clean` command.

use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::info;

use b3_lib::BuildConfig;
use b3_lib::buildfile::cache::clear_caches;

use crate::output::{print_info, print_success};

pub fn cmd_clean(config: &BuildConfig, cache: bool) -> Result<ExitCode> {
  let out_dir = config.out_dir();

  if out_dir.exists() {
    std::fs::remove_dir_all(&out_dir).with_context(|| format!("Failed to remove {}", out_dir.display()))?;
    info!(path = %out_dir.display(), "removed output directory");
    print_success(&format!("Removed {}", out_dir.display()));
  } else {
    print_info("Nothing to clean");
  }

  if cache {
    let removed = clear_caches(&config.root, &out_dir).context("Failed to remove statement caches")?;
    print_success(&format!("Removed {} statement cache(s)", removed));
  }

  Ok(ExitCode::SUCCESS)
}
