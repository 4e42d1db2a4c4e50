//! Explicit registry of rule types.
//!
//! Every registered type is callable from declaration files under its DSL name and, as a
//! parameterizable factory, under `<name>_factory`.

use std::any::type_name;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::behavior::RuleBehavior;
use crate::consts::FACTORY_SUFFIX;

/// Names that declaration files use for other purposes: b3 helpers and
/// constants, then the Lua base library and standard modules.
const RESERVED_NAMES: &[&str] = &[
  "capability",
  "path",
  "fork",
  "ROOT_DIR",
  "BUILD_FILE",
  "BUILD_DIR",
  "_G",
  "_VERSION",
  "assert",
  "collectgarbage",
  "dofile",
  "error",
  "getmetatable",
  "ipairs",
  "load",
  "loadfile",
  "next",
  "pairs",
  "pcall",
  "print",
  "rawequal",
  "rawget",
  "rawlen",
  "rawset",
  "require",
  "select",
  "setmetatable",
  "tonumber",
  "tostring",
  "type",
  "warn",
  "xpcall",
  "coroutine",
  "debug",
  "io",
  "math",
  "os",
  "package",
  "string",
  "table",
  "utf8",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
  #[error("rule type '{0}' is already registered")]
  Duplicate(String),

  #[error("rule type '{name}' names unknown parent '{parent}'")]
  UnknownParent { name: String, parent: String },

  #[error("'{0}' cannot be used as a rule type name")]
  Reserved(String),
}

/// A registered rule type.
#[derive(Clone)]
pub struct RuleTypeDef {
  pub name: String,
  /// Nearest ancestor type, used to find inherited specializations.
  pub parent: Option<String>,
  pub language: Option<String>,
  pub is_abstract: bool,
  pub behavior: Arc<dyn RuleBehavior>,
}

impl RuleTypeDef {
  pub fn new(name: impl Into<String>, behavior: impl RuleBehavior + 'static) -> Self {
    Self {
      name: name.into(),
      parent: None,
      language: None,
      is_abstract: false,
      behavior: Arc::new(behavior),
    }
  }

  /// Register `T` under the DSL form of its type name, e.g. `CcBinary` as `cc_binary`.
  pub fn of<T: RuleBehavior + Default + 'static>() -> Self {
    let full = type_name::<T>();
    let short = full.rsplit("::").next().unwrap_or(full);
    Self::new(dsl_name(short), T::default())
  }

  pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
    self.parent = Some(parent.into());
    self
  }

  pub fn with_language(mut self, language: impl Into<String>) -> Self {
    self.language = Some(language.into());
    self
  }

  pub fn into_abstract(mut self) -> Self {
    self.is_abstract = true;
    self
  }
}

impl fmt::Debug for RuleTypeDef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RuleTypeDef")
      .field("name", &self.name)
      .field("parent", &self.parent)
      .field("language", &self.language)
      .field("is_abstract", &self.is_abstract)
      .finish_non_exhaustive()
  }
}

/// Split a type name at case boundaries: `CCBinary` -> `cc_binary`, `JavaLibrary` -> `java_library`.
pub fn dsl_name(type_name: &str) -> String {
  let chars: Vec<char> = type_name.chars().collect();
  let mut out = String::with_capacity(type_name.len() + 4);

  for (i, &c) in chars.iter().enumerate() {
    if c.is_uppercase() && i > 0 {
      let prev = chars[i - 1];
      let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
      if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
        out.push('_');
      }
    }
    out.extend(c.to_lowercase());
  }
  out
}

/// The DSL name of the factory for `rule_type`.
pub fn factory_name(rule_type: &str) -> String {
  format!("{}{}", rule_type, FACTORY_SUFFIX)
}

/// All rule types known to a workspace.
#[derive(Debug, Clone, Default)]
pub struct RuleTypeRegistry {
  types: BTreeMap<String, RuleTypeDef>,
}

impl RuleTypeRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// A registry holding the built-in rule library.
  pub fn with_builtin_rules() -> Self {
    let mut registry = Self::new();
    crate::rules::register_builtin_rules(&mut registry);
    registry
  }

  /// Register a type. Its parent, if any, must already be registered.
  pub fn register(&mut self, def: RuleTypeDef) -> Result<(), RegistryError> {
    if RESERVED_NAMES.contains(&def.name.as_str()) || def.name.ends_with(FACTORY_SUFFIX) || def.name.is_empty() {
      return Err(RegistryError::Reserved(def.name));
    }
    if self.types.contains_key(&def.name) {
      return Err(RegistryError::Duplicate(def.name));
    }
    if let Some(parent) = &def.parent
      && !self.types.contains_key(parent)
    {
      return Err(RegistryError::UnknownParent {
        name: def.name.clone(),
        parent: parent.clone(),
      });
    }
    self.types.insert(def.name.clone(), def);
    Ok(())
  }

  /// Insert without validation, for the built-in library whose order is fixed.
  pub(crate) fn insert(&mut self, def: RuleTypeDef) {
    self.types.insert(def.name.clone(), def);
  }

  pub fn get(&self, name: &str) -> Option<&RuleTypeDef> {
    self.types.get(name)
  }

  /// Resolve a `<name>_factory` DSL name back to its rule type.
  pub fn factory(&self, factory: &str) -> Option<&RuleTypeDef> {
    self.get(factory.strip_suffix(FACTORY_SUFFIX)?)
  }

  /// Parent chain of `name`, nearest first, excluding `name` itself.
  pub fn ancestors(&self, name: &str) -> Vec<&RuleTypeDef> {
    let mut chain = Vec::new();
    let mut current = self.get(name).and_then(|def| def.parent.as_deref());
    while let Some(parent) = current.and_then(|p| self.get(p)) {
      // Parents are registered first, so the chain cannot loop.
      chain.push(parent);
      current = parent.parent.as_deref();
    }
    chain
  }

  /// Language of `name`, falling back to the nearest ancestor that declares one.
  pub fn language(&self, name: &str) -> Option<&str> {
    let def = self.get(name)?;
    def
      .language
      .as_deref()
      .or_else(|| self.ancestors(name).into_iter().find_map(|a| a.language.as_deref()))
  }

  pub fn names(&self) -> Vec<String> {
    self.types.keys().cloned().collect()
  }

  pub fn len(&self) -> usize {
    self.types.len()
  }

  pub fn is_empty(&self) -> bool {
    self.types.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::rule::behavior::{BuildPlan, PlanCtx, RuleError};

  #[derive(Default)]
  struct Noop;

  impl RuleBehavior for Noop {
    fn plan(&self, _ctx: &PlanCtx<'_>) -> Result<BuildPlan, RuleError> {
      Ok(BuildPlan::default())
    }
  }

  #[derive(Default)]
  struct CCBinary;

  impl RuleBehavior for CCBinary {
    fn plan(&self, _ctx: &PlanCtx<'_>) -> Result<BuildPlan, RuleError> {
      Ok(BuildPlan::default())
    }
  }

  #[test]
  fn dsl_names_split_at_case_boundaries() {
    assert_eq!(dsl_name("CCBinary"), "cc_binary");
    assert_eq!(dsl_name("CcBinary"), "cc_binary");
    assert_eq!(dsl_name("JavaLibrary"), "java_library");
    assert_eq!(dsl_name("Fileset"), "fileset");
    assert_eq!(dsl_name("HTTPArchive2Zip"), "http_archive2_zip");
  }

  #[test]
  fn of_uses_the_type_name() {
    let def = RuleTypeDef::of::<CCBinary>();
    assert_eq!(def.name, "cc_binary");
    assert_eq!(factory_name(&def.name), "cc_binary_factory");
  }

  #[test]
  fn rejects_duplicates_and_unknown_parents() {
    let mut registry = RuleTypeRegistry::new();
    registry.register(RuleTypeDef::new("library", Noop).into_abstract()).unwrap();

    assert_eq!(
      registry.register(RuleTypeDef::new("library", Noop)),
      Err(RegistryError::Duplicate("library".to_string()))
    );
    assert!(matches!(
      registry.register(RuleTypeDef::new("cc_library", Noop).with_parent("nope")),
      Err(RegistryError::UnknownParent { .. })
    ));
    assert!(matches!(
      registry.register(RuleTypeDef::new("x_factory", Noop)),
      Err(RegistryError::Reserved(_))
    ));
  }

  #[test]
  fn lua_globals_and_build_constants_are_reserved() {
    let mut registry = RuleTypeRegistry::new();
    for name in ["string", "pairs", "_G", "BUILD_DIR", "ROOT_DIR", "BUILD_FILE", "capability"] {
      assert_eq!(
        registry.register(RuleTypeDef::new(name, Noop)),
        Err(RegistryError::Reserved(name.to_string())),
        "{name} should be reserved"
      );
    }
    assert!(registry.register(RuleTypeDef::new("strings", Noop)).is_ok());
  }

  #[test]
  fn ancestors_walk_nearest_first() {
    let mut registry = RuleTypeRegistry::new();
    registry.register(RuleTypeDef::new("library", Noop).into_abstract()).unwrap();
    registry
      .register(RuleTypeDef::new("cc_library", Noop).with_parent("library").with_language("cc"))
      .unwrap();
    registry
      .register(RuleTypeDef::new("static_cc_library", Noop).with_parent("cc_library"))
      .unwrap();

    let chain: Vec<_> = registry
      .ancestors("static_cc_library")
      .iter()
      .map(|d| d.name.as_str())
      .collect();
    assert_eq!(chain, vec!["cc_library", "library"]);
    assert_eq!(registry.language("static_cc_library"), Some("cc"));
    assert_eq!(registry.language("library"), None);
    assert_eq!(registry.factory("cc_library_factory").map(|d| d.name.as_str()), Some("cc_library"));
  }
}
