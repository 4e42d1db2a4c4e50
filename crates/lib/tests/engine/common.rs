//! Shared helpers for engine integration tests.

use std::path::{Path, PathBuf};

use b3_lib::{BuildConfig, Engine};
use tempfile::TempDir;

/// A throwaway workspace on disk.
pub struct Tree {
  _temp: TempDir,
  root: PathBuf,
}

impl Tree {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let root = dunce::canonicalize(temp.path()).unwrap();
    Self { _temp: temp, root }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Write a file relative to the root, creating parent directories.
  pub fn write(&self, relative_path: &str, content: &str) -> PathBuf {
    let path = self.root.join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
  }

  pub fn config(&self) -> BuildConfig {
    let mut config = BuildConfig::new(&self.root);
    config.jobs = 4;
    config
  }

  pub fn engine(&self) -> Engine {
    Engine::new(self.config()).unwrap()
  }
}

pub fn targets(specs: &[&str]) -> Vec<String> {
  specs.iter().map(|s| s.to_string()).collect()
}
