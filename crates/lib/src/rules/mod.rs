//! The built-in rule library.
//!
//! `library` and `binary` are abstract bases. Their language-specific children set
//! `programming_language`, which is what fork resolution matches on. `fileset` and `genrule`
//! carry no language and therefore satisfy any consumer.

pub mod cc;
pub mod fileset;
pub mod genrule;
pub mod go;
pub mod java;
pub mod rust;

use std::path::{Component, Path, PathBuf};

use crate::rule::{BuildPlan, PlanCtx, RuleBehavior, RuleError, RuleTypeDef, RuleTypeRegistry};
use crate::util::path::normalize;

pub use cc::{CcBinary, CcLibrary};
pub use fileset::Fileset;
pub use genrule::Genrule;
pub use go::{GoBinary, GoLibrary};
pub use java::{JavaBinary, JavaLibrary};
pub use rust::{RustBinary, RustLibrary};

/// Behavior of the abstract base types: nothing to do.
#[derive(Debug, Default)]
pub struct Abstract;

impl RuleBehavior for Abstract {
  fn plan(&self, _ctx: &PlanCtx<'_>) -> Result<BuildPlan, RuleError> {
    Ok(BuildPlan::default())
  }
}

/// Register every built-in type. Parents come before their children.
pub fn register_builtin_rules(registry: &mut RuleTypeRegistry) {
  registry.insert(RuleTypeDef::new("library", Abstract).into_abstract());
  registry.insert(RuleTypeDef::new("binary", Abstract).into_abstract());

  registry.insert(RuleTypeDef::of::<CcLibrary>().with_parent("library").with_language("cc"));
  registry.insert(RuleTypeDef::of::<CcBinary>().with_parent("binary").with_language("cc"));
  registry.insert(RuleTypeDef::of::<JavaLibrary>().with_parent("library").with_language("java"));
  registry.insert(RuleTypeDef::of::<JavaBinary>().with_parent("binary").with_language("java"));
  registry.insert(RuleTypeDef::of::<GoLibrary>().with_parent("library").with_language("go"));
  registry.insert(RuleTypeDef::of::<GoBinary>().with_parent("binary").with_language("go"));
  registry.insert(RuleTypeDef::of::<RustLibrary>().with_parent("library").with_language("rust"));
  registry.insert(RuleTypeDef::of::<RustBinary>().with_parent("binary").with_language("rust"));

  registry.insert(RuleTypeDef::of::<Fileset>());
  registry.insert(RuleTypeDef::of::<Genrule>());
}

/// Require a non-empty `srcs` list at declaration time.
pub(crate) fn validate_srcs(args: &crate::rule::RuleArgs) -> Result<(), RuleError> {
  if args.string_list("srcs")?.is_empty() {
    return Err(RuleError::Missing("srcs"));
  }
  Ok(())
}

/// `<out>/<src relative to the package>.<ext>`, so `a/x.c` and `b/x.c` (or `x.c` and `x.cc`)
/// get distinct objects. Sources outside the package fall back to their file name.
pub(crate) fn object_path(out_dir: &Path, package_dir: &Path, src: &Path, ext: &str) -> PathBuf {
  let relative = src
    .strip_prefix(package_dir)
    .map(normalize)
    .ok()
    .filter(|rel| !rel.as_os_str().is_empty() && rel.components().all(|c| matches!(c, Component::Normal(_))))
    .or_else(|| src.file_name().map(PathBuf::from))
    .unwrap_or_default();
  let mut name = relative.into_os_string();
  name.push(".");
  name.push(ext);
  out_dir.join(name)
}

pub(crate) fn path_arg(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}

#[cfg(test)]
pub(crate) mod testing {
  use std::path::Path;

  use crate::config::Toolchain;
  use crate::rule::{BuildPlan, DepOutputs, Properties, PlanCtx, RuleArgs, RuleBehavior, RuleError};

  pub const PACKAGE_DIR: &str = "/ws/pkg";
  pub const OUT_DIR: &str = "/ws/b3-out/pkg/x";

  pub fn plan(
    behavior: &dyn RuleBehavior,
    args: &RuleArgs,
    deps: &[DepOutputs],
    passthrough: &[String],
  ) -> Result<BuildPlan, RuleError> {
    let properties = Properties::new();
    let toolchain = Toolchain::default();
    let ctx = PlanCtx {
      label: "//pkg:x",
      name: "x",
      args,
      properties: &properties,
      package_dir: Path::new(PACKAGE_DIR),
      out_dir: Path::new(OUT_DIR),
      deps,
      toolchain: &toolchain,
      passthrough,
    };
    behavior.plan(&ctx)
  }

  pub fn dep(label: &str, rule_type: &str, outputs: &[&str]) -> DepOutputs {
    DepOutputs {
      label: label.to_string(),
      rule_type: rule_type.to_string(),
      language: None,
      package_dir: Path::new("/ws/dep").to_path_buf(),
      outputs: outputs.iter().map(|o| Path::new(o).to_path_buf()).collect(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builtin_types_are_registered_with_languages() {
    let registry = RuleTypeRegistry::with_builtin_rules();

    assert!(registry.get("library").unwrap().is_abstract);
    assert!(registry.get("binary").unwrap().is_abstract);
    assert_eq!(registry.language("cc_library"), Some("cc"));
    assert_eq!(registry.language("java_binary"), Some("java"));
    assert_eq!(registry.language("go_library"), Some("go"));
    assert_eq!(registry.language("rust_binary"), Some("rust"));
    assert_eq!(registry.language("genrule"), None);
    assert_eq!(registry.language("fileset"), None);

    let chain: Vec<_> = registry.ancestors("cc_library").iter().map(|d| d.name.clone()).collect();
    assert_eq!(chain, vec!["library".to_string()]);
    assert_eq!(registry.len(), 12);
  }
}
