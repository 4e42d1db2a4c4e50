//! Rules: the nodes of the dependency graph.
//!
//! A [`Rule`] is created when a declaration file's statements are replayed. It records its
//! address, merged arguments, properties and raw dependency specs; the workspace links the
//! specs into graph edges once the declaring family has been read completely.

pub mod args;
pub mod behavior;
pub mod registry;
pub mod specialization;

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::address::Address;
use crate::buildfile::BuildFile;
use crate::consts::LANGUAGE_PROPERTY;

pub use args::{ArgError, ArgValue, Capability, DepSpec, RuleArgs};
pub use behavior::{BuildPlan, DepOutputs, PlanCtx, RuleBehavior, RuleError};
pub use registry::{RegistryError, RuleTypeDef, RuleTypeRegistry, dsl_name, factory_name};
pub use specialization::{Specialization, SpecializationError, SpecializationId, SpecializationTable};

/// Index of a rule in its workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RuleId(pub usize);

impl fmt::Display for RuleId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "rule#{}", self.0)
  }
}

/// Rule properties. `programming_language` drives Fork resolution.
pub type Properties = BTreeMap<String, String>;

/// Where a rule came from.
#[derive(Debug, Clone)]
pub enum RuleOrigin {
  /// Declared by `source`, which may be any member of the address's family.
  Declared { address: Address, source: BuildFile },
  /// Synthesized to stand for every variant of a capability.
  Fork(Capability),
}

/// Execution state. A rule runs at most once per workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
  #[default]
  Pending,
  Running,
  Done,
  Failed,
  Skipped,
}

impl RuleStatus {
  pub fn is_finished(self) -> bool {
    matches!(self, RuleStatus::Done | RuleStatus::Failed | RuleStatus::Skipped)
  }
}

#[derive(Debug, Clone)]
pub struct Rule {
  pub(crate) id: RuleId,
  pub(crate) name: String,
  pub(crate) rule_type: String,
  pub(crate) origin: RuleOrigin,
  pub(crate) specialization: Option<SpecializationId>,
  pub(crate) args: RuleArgs,
  pub(crate) properties: Properties,
  pub(crate) deps: Vec<DepSpec>,
  pub(crate) is_abstract: bool,
  pub(crate) status: RuleStatus,
}

impl Rule {
  pub(crate) fn fork(id: RuleId, capability: Capability) -> Self {
    Self {
      id,
      name: capability.name.clone(),
      rule_type: "fork".to_string(),
      origin: RuleOrigin::Fork(capability),
      specialization: None,
      args: RuleArgs::default(),
      properties: Properties::new(),
      deps: Vec::new(),
      is_abstract: true,
      status: RuleStatus::Pending,
    }
  }

  pub fn id(&self) -> RuleId {
    self.id
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn rule_type(&self) -> &str {
    &self.rule_type
  }

  pub fn origin(&self) -> &RuleOrigin {
    &self.origin
  }

  pub fn address(&self) -> Option<&Address> {
    match &self.origin {
      RuleOrigin::Declared { address, .. } => Some(address),
      RuleOrigin::Fork(_) => None,
    }
  }

  /// The file whose statements declared the rule.
  pub fn source(&self) -> Option<&BuildFile> {
    match &self.origin {
      RuleOrigin::Declared { source, .. } => Some(source),
      RuleOrigin::Fork(_) => None,
    }
  }

  pub fn is_fork(&self) -> bool {
    matches!(self.origin, RuleOrigin::Fork(_))
  }

  pub fn specialization(&self) -> Option<SpecializationId> {
    self.specialization
  }

  pub fn args(&self) -> &RuleArgs {
    &self.args
  }

  pub fn properties(&self) -> &Properties {
    &self.properties
  }

  pub fn language(&self) -> Option<&str> {
    self.properties.get(LANGUAGE_PROPERTY).map(String::as_str)
  }

  /// Dependencies as written, before linking.
  pub fn dep_specs(&self) -> &[DepSpec] {
    &self.deps
  }

  pub fn is_abstract(&self) -> bool {
    self.is_abstract
  }

  pub fn status(&self) -> RuleStatus {
    self.status
  }

  /// `//pkg:name` for declared rules, `fork(capability)` for forks.
  pub fn label(&self) -> String {
    match &self.origin {
      RuleOrigin::Declared { address, .. } => address.to_string(),
      RuleOrigin::Fork(capability) => format!("fork({})", capability.name),
    }
  }
}

impl fmt::Display for Rule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ({})", self.label(), self.rule_type)
  }
}
