//! The compiled form of a declaration file.
//!
//! Evaluating a declaration file does not touch the workspace. It only records, in order, each
//! constructor and factory call it makes. The workspace replays these statements to declare
//! rules, which is what makes the on-disk cache transparent.

use serde::{Deserialize, Serialize};

use crate::rule::args::{Capability, RuleArgs};

/// One recorded call from a declaration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Statement {
  /// `<rule_type>_factory(target, { ... })`.
  Specialize {
    rule_type: String,
    target: Capability,
    args: RuleArgs,
  },
  /// A constructor call declaring one rule.
  Declare { constructor: Constructor, args: RuleArgs },
}

/// What a [`Statement::Declare`] was called on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constructor {
  /// A registered rule type, by DSL name.
  RuleType(String),
  /// The n-th `Specialize` statement of the same file.
  Specialization(usize),
}
