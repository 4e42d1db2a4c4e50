//! Build configuration.
//!
//! Values come from defaults, then the environment ([`BuildConfig::from_env`]), then whatever
//! the caller overrides (the CLI applies its flags last).

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::consts::{DEFAULT_OUT_DIR, ROOT_MARKER};

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("invalid value '{value}' for {key}: {reason}")]
  InvalidValue {
    key: &'static str,
    value: String,
    reason: String,
  },

  #[error("cannot determine the working directory: {0}")]
  CurrentDir(#[source] std::io::Error),
}

/// External tools invoked by the built-in rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
  pub cc: String,
  pub ar: String,
  pub javac: String,
  pub jar: String,
  pub go: String,
  pub rustc: String,
}

impl Default for Toolchain {
  fn default() -> Self {
    Self {
      cc: "cc".to_string(),
      ar: "ar".to_string(),
      javac: "javac".to_string(),
      jar: "jar".to_string(),
      go: "go".to_string(),
      rustc: "rustc".to_string(),
    }
  }
}

impl Toolchain {
  /// Defaults overridden by `CC`, `AR`, `JAVAC`, `JAR`, `GO` and `RUSTC`.
  pub fn from_env() -> Self {
    let mut toolchain = Self::default();
    let slots: [(&str, &mut String); 6] = [
      ("CC", &mut toolchain.cc),
      ("AR", &mut toolchain.ar),
      ("JAVAC", &mut toolchain.javac),
      ("JAR", &mut toolchain.jar),
      ("GO", &mut toolchain.go),
      ("RUSTC", &mut toolchain.rustc),
    ];
    for (key, slot) in slots {
      if let Ok(value) = env::var(key)
        && !value.trim().is_empty()
      {
        *slot = value;
      }
    }
    toolchain
  }
}

#[derive(Debug, Clone)]
pub struct BuildConfig {
  /// Workspace root. Absolute.
  pub root: PathBuf,
  /// Output directory; `<root>/b3-out` when unset.
  pub out_dir: Option<PathBuf>,
  /// Maximum number of rules executing at once.
  pub jobs: usize,
  pub use_cache: bool,
  /// Per-action timeout. `None` waits forever.
  pub action_timeout: Option<Duration>,
  /// Execute even if a requested rule depends on a fork with no matching candidate.
  pub allow_unresolved_forks: bool,
  pub toolchain: Toolchain,
}

impl BuildConfig {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      out_dir: None,
      jobs: default_jobs(),
      use_cache: true,
      action_timeout: None,
      allow_unresolved_forks: false,
      toolchain: Toolchain::default(),
    }
  }

  /// Configuration for the current directory, overridden by `B3_*` variables.
  ///
  /// Without `B3_ROOT`, the root is the nearest ancestor holding a `B3ROOT` marker, else the
  /// working directory.
  pub fn from_env() -> Result<Self, ConfigError> {
    let root = match non_empty_var("B3_ROOT") {
      Some(root) => PathBuf::from(root),
      None => {
        let cwd = env::current_dir().map_err(ConfigError::CurrentDir)?;
        discover_root(&cwd).unwrap_or(cwd)
      }
    };

    let mut config = Self::new(root);
    config.toolchain = Toolchain::from_env();

    if let Some(out_dir) = non_empty_var("B3_OUT_DIR") {
      config.out_dir = Some(PathBuf::from(out_dir));
    }
    if let Some(jobs) = non_empty_var("B3_JOBS") {
      config.jobs = parse_jobs(&jobs)?;
    }
    if let Some(no_cache) = non_empty_var("B3_NO_CACHE") {
      config.use_cache = !parse_flag("B3_NO_CACHE", &no_cache)?;
    }
    if let Some(timeout) = non_empty_var("B3_ACTION_TIMEOUT") {
      let duration = humantime::parse_duration(&timeout).map_err(|e| ConfigError::InvalidValue {
        key: "B3_ACTION_TIMEOUT",
        value: timeout.clone(),
        reason: e.to_string(),
      })?;
      config.action_timeout = Some(duration);
    }

    Ok(config)
  }

  pub fn out_dir(&self) -> PathBuf {
    match &self.out_dir {
      Some(dir) if dir.is_absolute() => dir.clone(),
      Some(dir) => self.root.join(dir),
      None => self.root.join(DEFAULT_OUT_DIR),
    }
  }
}

/// Walk up from `start` to the first directory containing the root marker.
pub fn discover_root(start: &Path) -> Option<PathBuf> {
  start
    .ancestors()
    .find(|dir| dir.join(ROOT_MARKER).is_file())
    .map(Path::to_path_buf)
}

fn default_jobs() -> usize {
  std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

fn non_empty_var(key: &str) -> Option<String> {
  env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a job count; zero is rejected.
pub fn parse_jobs(value: &str) -> Result<usize, ConfigError> {
  match value.trim().parse::<usize>() {
    Ok(0) => Err(ConfigError::InvalidValue {
      key: "B3_JOBS",
      value: value.to_string(),
      reason: "must be at least 1".to_string(),
    }),
    Ok(n) => Ok(n),
    Err(e) => Err(ConfigError::InvalidValue {
      key: "B3_JOBS",
      value: value.to_string(),
      reason: e.to_string(),
    }),
  }
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
  match value.trim().to_ascii_lowercase().as_str() {
    "1" | "true" | "yes" | "on" => Ok(true),
    "0" | "false" | "no" | "off" => Ok(false),
    _ => Err(ConfigError::InvalidValue {
      key,
      value: value.to_string(),
      reason: "expected a boolean".to_string(),
    }),
  }
}
