//! Test utilities for b3-lib.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::address::Address;
use crate::buildfile::BuildFile;
use crate::consts::LANGUAGE_PROPERTY;
use crate::rule::{Capability, Properties, Rule, RuleArgs, RuleId, RuleOrigin, RuleStatus};

/// A throwaway workspace tree. The root is canonicalized so it compares equal to paths the
/// library derives from it.
pub struct TestTree {
  _dir: TempDir,
  root: PathBuf,
}

impl TestTree {
  pub fn new() -> Self {
    let dir = TempDir::new().unwrap();
    let root = dunce::canonicalize(dir.path()).unwrap();
    Self { _dir: dir, root }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Write `content` to `rel`, creating parent directories.
  pub fn write(&self, rel: &str, content: &str) -> PathBuf {
    let path = self.root.join(rel);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
  }
}

/// A declared rule in the tree's root family with only a name and language set.
pub fn declared_rule(tree: &TestTree, id: usize, name: &str, language: Option<&str>) -> Rule {
  let buildfile = match BuildFile::new(tree.root(), "") {
    Ok(bf) => bf,
    Err(_) => {
      tree.write("BUILD", "");
      BuildFile::new(tree.root(), "").unwrap()
    }
  };
  let mut properties = Properties::new();
  if let Some(lang) = language {
    properties.insert(LANGUAGE_PROPERTY.to_string(), lang.to_string());
  }
  Rule {
    id: RuleId(id),
    name: name.to_string(),
    rule_type: "test".to_string(),
    origin: RuleOrigin::Declared {
      address: Address::new(buildfile.clone(), name),
      source: buildfile,
    },
    specialization: None,
    args: RuleArgs::default(),
    properties,
    deps: Vec::new(),
    is_abstract: false,
    status: RuleStatus::Pending,
  }
}

pub fn fork_rule(id: usize, capability: &str) -> Rule {
  Rule::fork(RuleId(id), Capability::new(capability))
}

/// Shell invocation running `script`.
pub fn shell_cmd(script: &str) -> (String, Vec<String>) {
  ("/bin/sh".to_string(), vec!["-c".to_string(), script.to_string()])
}
