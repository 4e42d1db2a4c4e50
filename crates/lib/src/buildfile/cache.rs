//! On-disk cache of compiled statement lists.
//!
//! Each declaration file `<dir>/<name>` has an entry at `<dir>/.b3cache/<name>.json`. An entry
//! is used only if its identity tag matches and it is at least as new as the source file. Any
//! problem reading or writing the cache degrades to re-evaluating the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::BuildFile;
use crate::consts::{CACHE_DIR_NAME, CACHE_FORMAT_VERSION};
use crate::statement::Statement;
use crate::util::hash::hash_parts;
use crate::util::path::to_slash;

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
  tag: String,
  statements: Vec<Statement>,
}

/// Cache location and identity tag for one declaration file.
#[derive(Debug, Clone)]
pub struct StatementCache {
  path: PathBuf,
  tag: String,
}

impl StatementCache {
  pub fn for_file(buildfile: &BuildFile) -> Self {
    Self {
      path: buildfile
        .dir()
        .join(CACHE_DIR_NAME)
        .join(format!("{}.json", buildfile.file_name())),
      tag: cache_tag(buildfile.root(), buildfile.relpath()),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn tag(&self) -> &str {
    &self.tag
  }

  /// Load the entry if it is valid for a source last modified at `source_mtime`.
  pub fn load(&self, source_mtime: SystemTime) -> Option<Vec<Statement>> {
    let cache_mtime = fs::metadata(&self.path).and_then(|m| m.modified()).ok()?;
    if cache_mtime < source_mtime {
      debug!(cache = %self.path.display(), "cache entry is stale");
      return None;
    }

    let content = fs::read_to_string(&self.path).ok()?;
    let entry: CacheEntry = match serde_json::from_str(&content) {
      Ok(entry) => entry,
      Err(e) => {
        debug!(cache = %self.path.display(), error = %e, "ignoring unreadable cache entry");
        return None;
      }
    };

    if entry.tag != self.tag {
      debug!(cache = %self.path.display(), "cache tag mismatch");
      return None;
    }
    Some(entry.statements)
  }

  /// Write the entry. Failures are logged and otherwise ignored.
  pub fn store(&self, statements: &[Statement]) {
    let entry = CacheEntry {
      tag: self.tag.clone(),
      statements: statements.to_vec(),
    };

    let result = serde_json::to_string(&entry)
      .map_err(std::io::Error::other)
      .and_then(|json| {
        if let Some(parent) = self.path.parent() {
          fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, json)
      });

    if let Err(e) = result {
      warn!(cache = %self.path.display(), error = %e, "failed to write statement cache");
    }
  }
}

/// Remove every cache directory under `root`, without descending into `skip` (the output
/// tree). Returns the number of directories removed.
pub fn clear_caches(root: &Path, skip: &Path) -> std::io::Result<usize> {
  let mut removed = 0;
  let walker = WalkDir::new(root)
    .into_iter()
    .filter_entry(|e| e.path() != skip && e.file_name() != ".git");

  let mut cache_dirs = Vec::new();
  for entry in walker {
    let entry = entry.map_err(std::io::Error::other)?;
    if entry.file_type().is_dir() && entry.file_name() == CACHE_DIR_NAME {
      cache_dirs.push(entry.into_path());
    }
  }

  for dir in cache_dirs {
    fs::remove_dir_all(&dir)?;
    debug!(cache = %dir.display(), "removed statement cache");
    removed += 1;
  }
  Ok(removed)
}

/// Identity tag: crate version, cache layout version, workspace root and file relpath.
fn cache_tag(root: &Path, relpath: &Path) -> String {
  hash_parts([
    env!("CARGO_PKG_VERSION").to_string(),
    CACHE_FORMAT_VERSION.to_string(),
    root.to_string_lossy().into_owned(),
    to_slash(relpath),
  ])
}
