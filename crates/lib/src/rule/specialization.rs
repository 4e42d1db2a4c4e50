//! Parameter-inheriting specializations of rule types.
//!
//! `cc_library_factory(zlib, { copts = { "-O2" } })` does not create a new type. It records a
//! [`Specialization`]: the rule type, the capability it implements, the bound arguments and,
//! if an ancestor type was already specialized for the same capability, a link to that parent.
//! [`SpecializationTable::resolve`] merges the layers with call-site arguments.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use thiserror::Error;
use tracing::debug;

use super::RuleId;
use super::args::{ArgValue, Capability, RuleArgs};
use super::registry::RuleTypeRegistry;
use crate::buildfile::BuildFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpecializationId(pub usize);

impl fmt::Display for SpecializationId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpecializationError {
  #[error("unknown rule type '{0}'")]
  UnknownRuleType(String),

  #[error("specialization '{name}' was already created with different arguments")]
  Conflict { name: String },
}

/// One factory invocation.
#[derive(Debug, Clone)]
pub struct Specialization {
  pub id: SpecializationId,
  /// `<target>_<rule_type>`; also the default name of rules built from it.
  pub name: String,
  pub rule_type: String,
  pub target: Capability,
  pub bound: RuleArgs,
  pub parent: Option<SpecializationId>,
  /// File that invoked the factory. Rules instantiated on demand are declared there.
  pub origin: BuildFile,
}

/// Deterministic name for the specialization of `rule_type` for `target`.
pub fn specialization_name(target: &Capability, rule_type: &str) -> String {
  format!("{}_{}", target.name, rule_type)
}

/// Every specialization created in a workspace, grouped by capability.
#[derive(Debug, Default)]
pub struct SpecializationTable {
  entries: Vec<Specialization>,
  by_name: HashMap<String, SpecializationId>,
  groups: BTreeMap<String, Vec<SpecializationId>>,
  instances: HashMap<SpecializationId, Vec<RuleId>>,
}

impl SpecializationTable {
  pub fn new() -> Self {
    Self::default()
  }

  /// Create (or reuse) the specialization of `rule_type` for `target`.
  ///
  /// The parent is the specialization for the same target of the nearest ancestor type.
  pub fn specialize(
    &mut self,
    registry: &RuleTypeRegistry,
    rule_type: &str,
    target: Capability,
    bound: RuleArgs,
    origin: &BuildFile,
  ) -> Result<SpecializationId, SpecializationError> {
    if registry.get(rule_type).is_none() {
      return Err(SpecializationError::UnknownRuleType(rule_type.to_string()));
    }

    let name = specialization_name(&target, rule_type);
    if let Some(&existing) = self.by_name.get(&name) {
      if self.entries[existing.0].bound == bound {
        return Ok(existing);
      }
      return Err(SpecializationError::Conflict { name });
    }

    let parent = registry
      .ancestors(rule_type)
      .into_iter()
      .find_map(|ancestor| self.by_name.get(&specialization_name(&target, &ancestor.name)).copied());

    let id = SpecializationId(self.entries.len());
    debug!(specialization = %name, parent = ?parent, "created specialization");

    self.by_name.insert(name.clone(), id);
    self.groups.entry(target.name.clone()).or_default().push(id);
    self.entries.push(Specialization {
      id,
      name,
      rule_type: rule_type.to_string(),
      target,
      bound,
      parent,
      origin: origin.clone(),
    });
    Ok(id)
  }

  pub fn get(&self, id: SpecializationId) -> Option<&Specialization> {
    self.entries.get(id.0)
  }

  pub fn by_name(&self, name: &str) -> Option<&Specialization> {
    self.by_name.get(name).and_then(|id| self.get(*id))
  }

  /// Specializations registered for the capability `target`, in creation order.
  pub fn group(&self, target: &str) -> &[SpecializationId] {
    self.groups.get(target).map(Vec::as_slice).unwrap_or(&[])
  }

  /// Keywords accumulated along the parent chain, nearest layer winning.
  fn keywords(&self, id: SpecializationId) -> BTreeMap<String, ArgValue> {
    let Some(spec) = self.get(id) else {
      return BTreeMap::new();
    };
    let mut keywords = spec.parent.map(|p| self.keywords(p)).unwrap_or_default();
    keywords.extend(spec.bound.keywords.iter().map(|(k, v)| (k.clone(), v.clone())));
    keywords
  }

  /// Merge a call site with the specialization.
  ///
  /// Keyword precedence: call site, then this specialization, then its ancestors. Positional
  /// arguments are this specialization's bound ones followed by the call site's.
  pub fn resolve(&self, id: SpecializationId, call_site: &RuleArgs) -> RuleArgs {
    let positional = self.get(id).map(|s| s.bound.positional.clone()).unwrap_or_default();
    let inherited = RuleArgs {
      positional,
      keywords: self.keywords(id),
    };
    inherited.overlay(call_site)
  }

  pub(crate) fn record_instance(&mut self, id: SpecializationId, rule: RuleId) {
    self.instances.entry(id).or_default().push(rule);
  }

  /// Rules declared from the specialization so far.
  pub fn instances(&self, id: SpecializationId) -> &[RuleId] {
    self.instances.get(&id).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}
