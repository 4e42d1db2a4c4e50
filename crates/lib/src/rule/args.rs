//! Rule construction arguments as recorded from declaration files.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A language-agnostic handle naming what a Fork is built for.
///
/// `hint` is an optional address whose build file declares the capability's variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capability {
  pub name: String,
  pub hint: Option<String>,
}

impl Capability {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      hint: None,
    }
  }

  pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
    self.hint = Some(hint.into());
    self
  }
}

impl fmt::Display for Capability {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "capability({})", self.name)
  }
}

/// A single argument value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ArgValue {
  String(String),
  Number(f64),
  Boolean(bool),
  Array(Vec<ArgValue>),
  Table(BTreeMap<String, ArgValue>),
  Capability(Capability),
  /// A rule declared earlier in the same file, by name.
  RuleRef(String),
}

impl ArgValue {
  pub fn type_name(&self) -> &'static str {
    match self {
      ArgValue::String(_) => "string",
      ArgValue::Number(_) => "number",
      ArgValue::Boolean(_) => "boolean",
      ArgValue::Array(_) => "array",
      ArgValue::Table(_) => "table",
      ArgValue::Capability(_) => "capability",
      ArgValue::RuleRef(_) => "rule",
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      ArgValue::String(s) => Some(s),
      _ => None,
    }
  }
}

impl From<&str> for ArgValue {
  fn from(s: &str) -> Self {
    ArgValue::String(s.to_string())
  }
}

impl From<bool> for ArgValue {
  fn from(b: bool) -> Self {
    ArgValue::Boolean(b)
  }
}

impl From<f64> for ArgValue {
  fn from(n: f64) -> Self {
    ArgValue::Number(n)
  }
}

impl<T: Into<ArgValue>> From<Vec<T>> for ArgValue {
  fn from(values: Vec<T>) -> Self {
    ArgValue::Array(values.into_iter().map(Into::into).collect())
  }
}

/// An argument had the wrong shape.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("argument '{key}' must be {expected}, got {actual}")]
pub struct ArgError {
  pub key: String,
  pub expected: &'static str,
  pub actual: &'static str,
}

/// Positional and keyword arguments of one constructor call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleArgs {
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub positional: Vec<ArgValue>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub keywords: BTreeMap<String, ArgValue>,
}

impl RuleArgs {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, key: impl Into<String>, value: impl Into<ArgValue>) -> Self {
    self.keywords.insert(key.into(), value.into());
    self
  }

  pub fn with_positional(mut self, value: impl Into<ArgValue>) -> Self {
    self.positional.push(value.into());
    self
  }

  pub fn get(&self, key: &str) -> Option<&ArgValue> {
    self.keywords.get(key)
  }

  /// Overlay `other` on top of `self`: keywords in `other` win, positional are appended.
  pub fn overlay(&self, other: &RuleArgs) -> RuleArgs {
    let mut keywords = self.keywords.clone();
    keywords.extend(other.keywords.iter().map(|(k, v)| (k.clone(), v.clone())));
    let mut positional = self.positional.clone();
    positional.extend(other.positional.iter().cloned());
    RuleArgs { positional, keywords }
  }

  /// The `name` keyword, else the first positional string.
  pub fn declared_name(&self) -> Option<&str> {
    match self.keywords.get("name") {
      Some(value) => value.as_str(),
      None => self.positional.iter().find_map(ArgValue::as_str),
    }
  }

  pub fn string(&self, key: &str) -> Result<Option<&str>, ArgError> {
    match self.keywords.get(key) {
      None => Ok(None),
      Some(ArgValue::String(s)) => Ok(Some(s)),
      Some(other) => Err(wrong_type(key, "a string", other)),
    }
  }

  pub fn boolean(&self, key: &str) -> Result<Option<bool>, ArgError> {
    match self.keywords.get(key) {
      None => Ok(None),
      Some(ArgValue::Boolean(b)) => Ok(Some(*b)),
      Some(other) => Err(wrong_type(key, "a boolean", other)),
    }
  }

  /// A list of strings. A lone string is accepted as a one-element list.
  pub fn string_list(&self, key: &str) -> Result<Vec<String>, ArgError> {
    match self.keywords.get(key) {
      None => Ok(Vec::new()),
      Some(ArgValue::String(s)) => Ok(vec![s.clone()]),
      Some(ArgValue::Array(items)) => items
        .iter()
        .map(|item| {
          item
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| wrong_type(key, "a list of strings", item))
        })
        .collect(),
      Some(other) => Err(wrong_type(key, "a list of strings", other)),
    }
  }

  /// A table of string values.
  pub fn string_table(&self, key: &str) -> Result<BTreeMap<String, String>, ArgError> {
    match self.keywords.get(key) {
      None => Ok(BTreeMap::new()),
      Some(ArgValue::Array(items)) if items.is_empty() => Ok(BTreeMap::new()),
      Some(ArgValue::Table(map)) => map
        .iter()
        .map(|(k, v)| match v {
          ArgValue::String(s) => Ok((k.clone(), s.clone())),
          other => Err(wrong_type(key, "a table of strings", other)),
        })
        .collect(),
      Some(other) => Err(wrong_type(key, "a table of strings", other)),
    }
  }
}

fn wrong_type(key: &str, expected: &'static str, actual: &ArgValue) -> ArgError {
  ArgError {
    key: key.to_string(),
    expected,
    actual: actual.type_name(),
  }
}

/// An unresolved dependency as written in a `deps` list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepSpec {
  /// `":name"`, `"path:name"`, `"path"` or `"//path:name"`.
  Address(String),
  /// A rule returned by an earlier constructor call in the same file.
  RuleRef(String),
  /// Whatever implements the capability for the consumer's language.
  Capability(Capability),
}

impl TryFrom<&ArgValue> for DepSpec {
  type Error = &'static str;

  fn try_from(value: &ArgValue) -> Result<Self, Self::Error> {
    match value {
      ArgValue::String(s) => Ok(DepSpec::Address(s.clone())),
      ArgValue::RuleRef(name) => Ok(DepSpec::RuleRef(name.clone())),
      ArgValue::Capability(c) => Ok(DepSpec::Capability(c.clone())),
      other => Err(other.type_name()),
    }
  }
}

impl fmt::Display for DepSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      DepSpec::Address(spec) => write!(f, "{}", spec),
      DepSpec::RuleRef(name) => write!(f, ":{}", name),
      DepSpec::Capability(c) => write!(f, "{}", c),
    }
  }
}
