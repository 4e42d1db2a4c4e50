//! Declaration files and their families.
//!
//! A [`BuildFile`] is one `BUILD` or `BUILD.<suffix>` file under the workspace root. All such
//! files in one directory form a *family* that shares a single address namespace. Each file
//! compiles to a list of [`Statement`]s, memoized on disk by [`cache::StatementCache`].

pub mod cache;

use std::fmt;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tracing::debug;

use crate::consts::BUILD_FILE_NAME;
use crate::lua;
use crate::statement::Statement;
use crate::util::path::{normalize, to_slash};

use cache::StatementCache;

/// Errors raised while locating, enumerating or compiling declaration files.
#[derive(Debug, Error)]
pub enum BuildFileError {
  /// Nothing (or no canonical `BUILD`) exists at the location.
  #[error("no build file at {}", .0.display())]
  NotFound(PathBuf),

  /// The file exists but is not named `BUILD` or `BUILD.<suffix>`.
  #[error("'{}' is not a declaration file name", .0.display())]
  InvalidName(PathBuf),

  /// The location lies outside the workspace root.
  #[error("'{}' is outside the workspace root", .0.display())]
  OutsideRoot(PathBuf),

  #[error("cannot read {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// Evaluating the Lua declarations failed.
  #[error("failed to evaluate {}: {message}", path.display())]
  Eval { path: PathBuf, message: String },
}

/// Whether `name` is `BUILD` or `BUILD.<suffix>` with a suffix of `[A-Za-z0-9_-]+`.
pub fn is_declaration_name(name: &str) -> bool {
  if name == BUILD_FILE_NAME {
    return true;
  }
  let Some(suffix) = name.strip_prefix(BUILD_FILE_NAME).and_then(|s| s.strip_prefix('.')) else {
    return false;
  };
  !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[derive(Debug)]
struct Inner {
  root: PathBuf,
  relpath: PathBuf,
  path: PathBuf,
  family: OnceLock<Vec<PathBuf>>,
}

/// One declaration file, identified by `(root, relpath)`.
///
/// Cheap to clone. Equality and hashing use the absolute path.
#[derive(Debug, Clone)]
pub struct BuildFile {
  inner: Arc<Inner>,
}

impl BuildFile {
  /// Locate a declaration file.
  ///
  /// `relpath` may name a file directly or a directory, in which case the canonical `BUILD`
  /// inside it is used. `root` is expected to be absolute and canonical.
  pub fn new(root: &Path, relpath: impl AsRef<Path>) -> Result<Self, BuildFileError> {
    let relpath = normalize(relpath.as_ref());
    let relpath = if relpath.is_absolute() {
      relpath
        .strip_prefix(root)
        .map(Path::to_path_buf)
        .map_err(|_| BuildFileError::OutsideRoot(relpath.clone()))?
    } else {
      relpath
    };

    let mut path = root.join(&relpath);
    let mut relpath = relpath;
    if path.is_dir() {
      path.push(BUILD_FILE_NAME);
      relpath.push(BUILD_FILE_NAME);
    }
    if !path.is_file() {
      return Err(BuildFileError::NotFound(path));
    }

    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    if !is_declaration_name(name) {
      return Err(BuildFileError::InvalidName(path));
    }

    Ok(Self::from_parts(root, relpath))
  }

  fn from_parts(root: &Path, relpath: PathBuf) -> Self {
    Self {
      inner: Arc::new(Inner {
        root: root.to_path_buf(),
        path: root.join(&relpath),
        relpath,
        family: OnceLock::new(),
      }),
    }
  }

  /// Workspace root this file belongs to.
  pub fn root(&self) -> &Path {
    &self.inner.root
  }

  /// Path relative to the workspace root.
  pub fn relpath(&self) -> &Path {
    &self.inner.relpath
  }

  /// Absolute path.
  pub fn path(&self) -> &Path {
    &self.inner.path
  }

  /// Absolute directory containing the file.
  pub fn dir(&self) -> &Path {
    self.inner.path.parent().unwrap_or(&self.inner.root)
  }

  /// Directory relative to the workspace root (empty for the root package).
  pub fn package(&self) -> &Path {
    self.inner.relpath.parent().unwrap_or(Path::new(""))
  }

  pub fn file_name(&self) -> &str {
    self
      .inner
      .relpath
      .file_name()
      .and_then(|n| n.to_str())
      .unwrap_or(BUILD_FILE_NAME)
  }

  /// The part after `BUILD.`, if this is a sibling file.
  pub fn suffix(&self) -> Option<&str> {
    self.file_name().strip_prefix(BUILD_FILE_NAME)?.strip_prefix('.')
  }

  pub fn is_canonical(&self) -> bool {
    self.suffix().is_none()
  }

  /// Relative path of the family's canonical `BUILD` file. Addresses are keyed on this.
  pub fn canonical_relpath(&self) -> PathBuf {
    self.package().join(BUILD_FILE_NAME)
  }

  /// Rule name used when an address names only a directory.
  pub fn default_rule_name(&self) -> String {
    self
      .dir()
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default()
  }

  /// This file followed by every sibling declaration file in its directory, by name.
  ///
  /// Enumerated once and memoized.
  pub fn family(&self) -> Result<Vec<BuildFile>, BuildFileError> {
    if let Some(members) = self.inner.family.get() {
      return Ok(self.members(members));
    }

    let dir = self.dir();
    let io_err = |source| BuildFileError::Io {
      path: dir.to_path_buf(),
      source,
    };

    let mut siblings = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
      let entry = entry.map_err(io_err)?;
      let file_name = entry.file_name();
      let Some(name) = file_name.to_str() else {
        continue;
      };
      if name == self.file_name() || !is_declaration_name(name) || !entry.path().is_file() {
        continue;
      }
      siblings.push(self.package().join(name));
    }
    siblings.sort();

    let mut members = Vec::with_capacity(siblings.len() + 1);
    members.push(self.inner.relpath.clone());
    members.extend(siblings);
    debug!(buildfile = %self, members = members.len(), "enumerated family");

    let members = self.inner.family.get_or_init(|| members);
    Ok(self.members(members))
  }

  fn members(&self, relpaths: &[PathBuf]) -> Vec<BuildFile> {
    relpaths
      .iter()
      .map(|relpath| {
        if relpath == &self.inner.relpath {
          self.clone()
        } else {
          Self::from_parts(&self.inner.root, relpath.clone())
        }
      })
      .collect()
  }

  /// Compile this file into its statement list.
  ///
  /// With `use_cache`, a fresh on-disk cache entry is used instead of evaluating Lua, and a
  /// successful evaluation refreshes the entry. The result is identical either way.
  pub fn statements(&self, rule_types: &[String], use_cache: bool) -> Result<Vec<Statement>, BuildFileError> {
    let source_mtime = fs::metadata(self.path())
      .and_then(|m| m.modified())
      .map_err(|source| BuildFileError::Io {
        path: self.path().to_path_buf(),
        source,
      })?;

    let cache = StatementCache::for_file(self);
    if use_cache && let Some(statements) = cache.load(source_mtime) {
      debug!(buildfile = %self, count = statements.len(), "using cached statements");
      return Ok(statements);
    }

    let statements = lua::compile_file(self, rule_types).map_err(|e| BuildFileError::Eval {
      path: self.path().to_path_buf(),
      message: e.to_string(),
    })?;
    debug!(buildfile = %self, count = statements.len(), "compiled statements");

    if use_cache {
      cache.store(&statements);
    }
    Ok(statements)
  }
}

impl PartialEq for BuildFile {
  fn eq(&self, other: &Self) -> bool {
    self.inner.path == other.inner.path
  }
}

impl Eq for BuildFile {}

impl Hash for BuildFile {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.inner.path.hash(state);
  }
}

impl fmt::Display for BuildFile {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", to_slash(&self.inner.relpath))
  }
}
