//! Rule addresses.
//!
//! An [`Address`] names one rule within a build-file family. Textual forms accepted by
//! [`get_address`]:
//!
//! - `:name` names a rule in the base directory's family
//! - `path:name` names a rule in the family at `path` (relative to the base directory)
//! - `path` names the rule called after the directory's basename
//! - `//path:name` and `//path` resolve `path` against the workspace root

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::buildfile::BuildFile;
use crate::util::path::{resolve, to_slash};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
  #[error("empty address")]
  Empty,

  #[error("malformed address '{spec}': {reason}")]
  Malformed { spec: String, reason: &'static str },
}

/// Whether `name` can be used as a rule name.
pub fn is_valid_rule_name(name: &str) -> bool {
  !name.is_empty() && !name.chars().any(|c| c == ':' || c == '/' || c == '\\' || c.is_whitespace())
}

/// The parsed but unresolved form of an address string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressSpec {
  pub path: Option<String>,
  pub name: Option<String>,
}

impl FromStr for AddressSpec {
  type Err = AddressError;

  fn from_str(spec: &str) -> Result<Self, Self::Err> {
    let trimmed = spec.trim();
    if trimmed.is_empty() {
      return Err(AddressError::Empty);
    }
    let malformed = |reason| AddressError::Malformed {
      spec: spec.to_string(),
      reason,
    };

    let Some((path, name)) = trimmed.split_once(':') else {
      return Ok(Self {
        path: Some(trimmed.to_string()),
        name: None,
      });
    };
    if !is_valid_rule_name(name) {
      return Err(malformed("invalid rule name"));
    }
    Ok(Self {
      path: (!path.is_empty()).then(|| path.to_string()),
      name: Some(name.to_string()),
    })
  }
}

/// `(build file, rule name)`.
///
/// Equality, ordering and hashing use the family's canonical `BUILD` path, so a rule declared in
/// `a/BUILD.extras` has the same address as `a:name` resolved from anywhere else.
#[derive(Debug, Clone)]
pub struct Address {
  buildfile: BuildFile,
  canonical: PathBuf,
  name: String,
}

impl Address {
  pub fn new(buildfile: BuildFile, name: impl Into<String>) -> Self {
    Self {
      canonical: buildfile.canonical_relpath(),
      buildfile,
      name: name.into(),
    }
  }

  /// The file the address was resolved through, or the one that declared the rule.
  pub fn buildfile(&self) -> &BuildFile {
    &self.buildfile
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Directory relative to the workspace root.
  pub fn package(&self) -> &Path {
    self.buildfile.package()
  }

  pub fn canonical_relpath(&self) -> &Path {
    &self.canonical
  }
}

impl PartialEq for Address {
  fn eq(&self, other: &Self) -> bool {
    self.canonical == other.canonical && self.name == other.name
  }
}

impl Eq for Address {}

impl Hash for Address {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.canonical.hash(state);
    self.name.hash(state);
  }
}

impl PartialOrd for Address {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Address {
  fn cmp(&self, other: &Self) -> Ordering {
    (&self.canonical, &self.name).cmp(&(&other.canonical, &other.name))
  }
}

impl fmt::Display for Address {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "//{}:{}", to_slash(self.package()), self.name)
  }
}

/// Resolve `spec` to an address.
///
/// Relative paths are normalized against `base`; `//` paths against `root`. Without an explicit
/// name, the rule is named after the directory containing the resolved build file. Returns
/// `None` if the address is malformed, leaves the workspace, or no build file exists there.
pub fn get_address(root: &Path, base: &Path, spec: &str) -> Option<Address> {
  let parsed: AddressSpec = spec.parse().ok()?;

  let location = match parsed.path.as_deref() {
    None => base.to_path_buf(),
    Some(path) => match path.strip_prefix("//") {
      Some(from_root) => resolve(root, Path::new(from_root)),
      None => resolve(base, Path::new(path)),
    },
  };
  let relpath = location.strip_prefix(root).ok()?;
  let buildfile = BuildFile::new(root, relpath).ok()?;

  let name = parsed.name.unwrap_or_else(|| buildfile.default_rule_name());
  Some(Address::new(buildfile, name))
}
