//! The workspace: every rule, address and edge known to one build invocation.
//!
//! Families are parsed lazily, in two phases. Declaring replays a family's statements and
//! registers rules with their dependency specs as written. Once every member is declared, the
//! context closes and the deferred link actions run in registration order, resolving each spec
//! to a rule. Resolving may parse further families, which is why a rule may depend on one
//! declared later in its own file.

mod context;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::address::{Address, get_address, is_valid_rule_name};
use crate::buildfile::{BuildFile, BuildFileError};
use crate::consts::LANGUAGE_PROPERTY;
use crate::graph::{DependencyGraph, ForkReport};
use crate::rule::{
  ArgValue, Capability, DepSpec, Rule, RuleArgs, RuleError, RuleId, RuleOrigin, RuleStatus, RuleTypeRegistry,
  SpecializationError, SpecializationId, SpecializationTable,
};
use crate::statement::{Constructor, Statement};

pub use context::{Context, Deferred};

#[derive(Debug, Error)]
pub enum WorkspaceError {
  /// No rule exists at the address, even after parsing its family.
  #[error("no rule found for '{0}'")]
  NotFound(String),

  #[error("{address} is already declared in {existing}")]
  AddressConflict { address: String, existing: String },

  #[error("no parse context is active")]
  ContextError,

  #[error("{rule}: cannot depend on {value}: {reason}")]
  DependencyTypeError {
    rule: String,
    value: String,
    reason: String,
  },

  #[error("specialization '{0}' was already created with different arguments")]
  SpecializationConflict(String),

  #[error("unknown rule type '{0}'")]
  UnknownRuleType(String),

  #[error("invalid declaration in {file}: {reason}")]
  InvalidDeclaration { file: String, reason: String },

  #[error("invalid rule {label}: {source}")]
  InvalidRule {
    label: String,
    #[source]
    source: RuleError,
  },

  #[error("workspace is unusable after '{file}' failed to parse")]
  Poisoned { file: String },

  #[error(transparent)]
  BuildFile(#[from] BuildFileError),
}

impl From<SpecializationError> for WorkspaceError {
  fn from(err: SpecializationError) -> Self {
    match err {
      SpecializationError::UnknownRuleType(name) => WorkspaceError::UnknownRuleType(name),
      SpecializationError::Conflict { name } => WorkspaceError::SpecializationConflict(name),
    }
  }
}

#[derive(Debug)]
pub struct Workspace {
  root: PathBuf,
  registry: RuleTypeRegistry,
  use_cache: bool,
  rules: Vec<Rule>,
  addresses: HashMap<Address, RuleId>,
  graph: DependencyGraph,
  /// Absolute paths of every family member whose family has been parsed.
  parsed: HashSet<PathBuf>,
  specializations: SpecializationTable,
  /// Fork rule per capability name.
  forks: HashMap<String, RuleId>,
  contexts: Vec<Context>,
  families_parsed: usize,
  /// First build file whose family failed to parse; its rules may be missing edges.
  failed: Option<String>,
}

impl Workspace {
  /// An empty workspace rooted at `root`, which should be absolute and canonical.
  pub fn new(root: impl Into<PathBuf>, registry: RuleTypeRegistry) -> Self {
    Self {
      root: root.into(),
      registry,
      use_cache: true,
      rules: Vec::new(),
      addresses: HashMap::new(),
      graph: DependencyGraph::new(),
      parsed: HashSet::new(),
      specializations: SpecializationTable::new(),
      forks: HashMap::new(),
      contexts: Vec::new(),
      families_parsed: 0,
      failed: None,
    }
  }

  pub fn with_cache(mut self, use_cache: bool) -> Self {
    self.use_cache = use_cache;
    self
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn registry(&self) -> &RuleTypeRegistry {
    &self.registry
  }

  pub fn rules(&self) -> &[Rule] {
    &self.rules
  }

  pub fn rule(&self, id: RuleId) -> Option<&Rule> {
    self.rules.get(id.0)
  }

  pub fn graph(&self) -> &DependencyGraph {
    &self.graph
  }

  pub fn specializations(&self) -> &SpecializationTable {
    &self.specializations
  }

  /// Number of families parsed so far.
  pub fn families_parsed(&self) -> usize {
    self.families_parsed
  }

  pub fn is_parsed(&self, buildfile: &BuildFile) -> bool {
    self.parsed.contains(buildfile.path())
  }

  /// The innermost active context, if a family is being declared.
  pub fn current_context(&self) -> Option<&Context> {
    self.contexts.last()
  }

  /// The rule registered at `address`, without parsing anything.
  pub fn lookup(&self, address: &Address) -> Option<RuleId> {
    self.addresses.get(address).copied()
  }

  /// Direct dependencies of a rule.
  pub fn dependencies(&self, id: RuleId) -> Vec<RuleId> {
    self.graph.dependencies(id)
  }

  pub fn fork(&self, capability: &str) -> Option<RuleId> {
    self.forks.get(capability).copied()
  }

  pub(crate) fn set_status(&mut self, id: RuleId, status: RuleStatus) {
    if let Some(rule) = self.rules.get_mut(id.0) {
      rule.status = status;
    }
  }

  /// Rewire edges into forks. See [`DependencyGraph::resolve_forks`].
  pub fn resolve_forks(&mut self) -> ForkReport {
    self.graph.resolve_forks(&self.rules)
  }

  /// Resolve a textual address relative to the workspace root.
  pub fn resolve_address(&self, spec: &str) -> Option<Address> {
    get_address(&self.root, &self.root, spec)
  }

  /// The rule at `address`, parsing its family if it is not yet known.
  pub fn get_rule(&mut self, address: &Address) -> Result<RuleId, WorkspaceError> {
    self.ensure_usable()?;
    if let Some(id) = self.lookup(address) {
      return Ok(id);
    }
    self.parse(address.buildfile())?;
    self.lookup(address).ok_or_else(|| WorkspaceError::NotFound(address.to_string()))
  }

  /// Parse the family of `buildfile` unless any member was parsed before.
  ///
  /// A failure leaves the workspace unusable: later lookups and parses report
  /// [`WorkspaceError::Poisoned`] instead of serving half-linked rules.
  pub fn parse(&mut self, buildfile: &BuildFile) -> Result<(), WorkspaceError> {
    self.ensure_usable()?;
    let family = buildfile.family()?;
    if family.iter().any(|member| self.is_parsed(member)) {
      debug!(buildfile = %buildfile, "family already parsed");
      return Ok(());
    }
    for member in &family {
      self.parsed.insert(member.path().to_path_buf());
    }
    self.families_parsed += 1;
    info!(buildfile = %buildfile, members = family.len(), "parsing family");

    self.contexts.push(Context::new(buildfile.clone()));
    let result = self.declare_and_link(&family);
    if let Err(err) = &result {
      warn!(buildfile = %buildfile, error = %err, "family failed to parse");
      self.failed.get_or_insert_with(|| buildfile.to_string());
    }
    result
  }

  fn declare_and_link(&mut self, family: &[BuildFile]) -> Result<(), WorkspaceError> {
    let declared = self.declare_family(family);
    let context = self.pop_context()?;
    declared?;
    self.run_deferred(context)
  }

  fn ensure_usable(&self) -> Result<(), WorkspaceError> {
    match &self.failed {
      Some(file) => Err(WorkspaceError::Poisoned { file: file.clone() }),
      None => Ok(()),
    }
  }

  /// Run `action` when the innermost active context closes.
  pub fn on_context_exit(
    &mut self,
    action: impl FnOnce(&mut Workspace) -> Result<(), WorkspaceError> + 'static,
  ) -> Result<(), WorkspaceError> {
    let context = self.contexts.last_mut().ok_or(WorkspaceError::ContextError)?;
    context.defer(Box::new(action));
    Ok(())
  }

  fn pop_context(&mut self) -> Result<Context, WorkspaceError> {
    self.contexts.pop().ok_or(WorkspaceError::ContextError)
  }

  fn run_deferred(&mut self, context: Context) -> Result<(), WorkspaceError> {
    debug!(buildfile = %context.buildfile(), actions = context.pending(), "closing context");
    for action in context.into_deferred() {
      action(self)?;
    }
    Ok(())
  }

  fn declare_family(&mut self, family: &[BuildFile]) -> Result<(), WorkspaceError> {
    let rule_types = self.registry.names();
    for member in family {
      let statements = member.statements(&rule_types, self.use_cache)?;
      self.replay(member, statements)?;
    }
    Ok(())
  }

  /// Declare everything `member` recorded, in order.
  fn replay(&mut self, member: &BuildFile, statements: Vec<Statement>) -> Result<(), WorkspaceError> {
    let mut local: Vec<SpecializationId> = Vec::new();
    for statement in statements {
      match statement {
        Statement::Specialize { rule_type, target, args } => {
          let id = self
            .specializations
            .specialize(&self.registry, &rule_type, target, args, member)?;
          local.push(id);
        }
        Statement::Declare { constructor, args } => match constructor {
          Constructor::RuleType(rule_type) => {
            self.declare_rule(member, &rule_type, None, args)?;
          }
          Constructor::Specialization(index) => {
            let id = *local.get(index).ok_or_else(|| WorkspaceError::InvalidDeclaration {
              file: member.to_string(),
              reason: format!("specialization #{} is not defined", index),
            })?;
            let rule_type = self
              .specializations
              .get(id)
              .map(|s| s.rule_type.clone())
              .ok_or_else(|| WorkspaceError::InvalidDeclaration {
                file: member.to_string(),
                reason: format!("specialization {} is not defined", id),
              })?;
            self.declare_rule(member, &rule_type, Some(id), args)?;
          }
        },
      }
    }
    Ok(())
  }

  /// Register a rule declared by `source` and arrange for its dependencies to be linked.
  ///
  /// With a specialization, `call_args` are merged over its bound arguments and the rule is
  /// named after it unless the call site names it.
  pub(crate) fn declare_rule(
    &mut self,
    source: &BuildFile,
    rule_type: &str,
    specialization: Option<SpecializationId>,
    call_args: RuleArgs,
  ) -> Result<RuleId, WorkspaceError> {
    let def = self
      .registry
      .get(rule_type)
      .cloned()
      .ok_or_else(|| WorkspaceError::UnknownRuleType(rule_type.to_string()))?;
    let invalid = |reason: String| WorkspaceError::InvalidDeclaration {
      file: source.to_string(),
      reason,
    };

    let fallback = specialization.and_then(|id| self.specializations.get(id)).map(|s| s.name.clone());
    let name = call_args
      .declared_name()
      .map(str::to_string)
      .or(fallback)
      .ok_or_else(|| invalid(format!("{} declared without a name", rule_type)))?;
    if !is_valid_rule_name(&name) {
      return Err(invalid(format!("'{}' is not a valid rule name", name)));
    }

    let args = match specialization {
      Some(id) => self.specializations.resolve(id, &call_args),
      None => call_args,
    };

    let address = Address::new(source.clone(), &name);
    if let Some(existing) = self.lookup(&address) {
      let existing = self.rules[existing.0]
        .source()
        .map(|s| s.to_string())
        .unwrap_or_default();
      return Err(WorkspaceError::AddressConflict {
        address: address.to_string(),
        existing,
      });
    }
    let label = address.to_string();

    let mut properties = args.string_table("properties").map_err(|e| invalid(e.to_string()))?;
    let language = args
      .string(LANGUAGE_PROPERTY)
      .map_err(|e| invalid(e.to_string()))?
      .map(str::to_string)
      .or_else(|| self.registry.language(rule_type).map(str::to_string));
    if let Some(language) = language {
      properties.insert(LANGUAGE_PROPERTY.to_string(), language);
    }

    let is_abstract = def.is_abstract || args.boolean("abstract").map_err(|e| invalid(e.to_string()))?.unwrap_or(false);
    let deps = dep_specs(&label, &args)?;
    if !is_abstract {
      def
        .behavior
        .validate(&args)
        .map_err(|source| WorkspaceError::InvalidRule {
          label: label.clone(),
          source,
        })?;
    }

    let id = RuleId(self.rules.len());
    self.rules.push(Rule {
      id,
      name,
      rule_type: rule_type.to_string(),
      origin: RuleOrigin::Declared {
        address: address.clone(),
        source: source.clone(),
      },
      specialization,
      args,
      properties,
      deps,
      is_abstract,
      status: RuleStatus::Pending,
    });
    self.addresses.insert(address, id);
    self.graph.add_rule(id);
    if let Some(spec) = specialization {
      self.specializations.record_instance(spec, id);
    }
    debug!(rule = %label, rule_type = %rule_type, id = %id, "declared rule");

    if self.contexts.is_empty() {
      self.link(id)?;
    } else {
      self.on_context_exit(move |ws| ws.link(id))?;
    }
    Ok(id)
  }

  /// Resolve a rule's dependency specs into graph edges.
  fn link(&mut self, id: RuleId) -> Result<(), WorkspaceError> {
    let Some(rule) = self.rules.get(id.0) else {
      return Ok(());
    };
    let Some(source) = rule.source().cloned() else {
      return Ok(());
    };
    let deps = rule.deps.clone();
    let label = rule.label();

    for dep in &deps {
      let target = self.parse_address(&source, &label, dep)?;
      self.graph.add_dependency(id, target);
    }
    Ok(())
  }

  /// Resolve one dependency spec of a rule declared in `source`.
  ///
  /// Strings are addresses relative to the declaring directory, rule references name rules of
  /// the declaring family and capabilities resolve to their fork.
  pub fn parse_address(&mut self, source: &BuildFile, rule: &str, dep: &DepSpec) -> Result<RuleId, WorkspaceError> {
    match dep {
      DepSpec::Address(spec) => {
        let address =
          get_address(&self.root, source.dir(), spec).ok_or_else(|| WorkspaceError::NotFound(spec.clone()))?;
        self.get_rule(&address)
      }
      DepSpec::RuleRef(name) => {
        let address = Address::new(source.clone(), name);
        self.get_rule(&address)
      }
      DepSpec::Capability(capability) => self.fork_for(source, rule, capability),
    }
  }

  /// The fork for `capability`, with every specialization registered for it as a candidate.
  ///
  /// Specializations that have not been instantiated yet get a rule named after them, declared
  /// in the family that created the specialization.
  fn fork_for(&mut self, source: &BuildFile, rule: &str, capability: &Capability) -> Result<RuleId, WorkspaceError> {
    if let Some(hint) = &capability.hint {
      let address =
        get_address(&self.root, source.dir(), hint).ok_or_else(|| WorkspaceError::NotFound(hint.clone()))?;
      self.parse(address.buildfile())?;
    }

    let group = self.specializations.group(&capability.name).to_vec();
    if group.is_empty() {
      return Err(WorkspaceError::DependencyTypeError {
        rule: rule.to_string(),
        value: capability.to_string(),
        reason: "no specialization is registered for it".to_string(),
      });
    }

    let fork = match self.forks.get(&capability.name) {
      Some(&fork) => fork,
      None => {
        let id = RuleId(self.rules.len());
        self.rules.push(Rule::fork(id, capability.clone()));
        self.graph.add_rule(id);
        self.forks.insert(capability.name.clone(), id);
        info!(capability = %capability.name, id = %id, "created fork");
        id
      }
    };

    for spec_id in group {
      let mut candidates = self.specializations.instances(spec_id).to_vec();
      if candidates.is_empty() {
        let Some(spec) = self.specializations.get(spec_id) else {
          continue;
        };
        let instantiable = self.registry.get(&spec.rule_type).is_some_and(|def| !def.is_abstract);
        if instantiable {
          let (origin, rule_type) = (spec.origin.clone(), spec.rule_type.clone());
          debug!(specialization = %spec.name, "instantiating specialization for fork");
          candidates.push(self.declare_rule(&origin, &rule_type, Some(spec_id), RuleArgs::new())?);
        }
      }
      for candidate in candidates {
        self.graph.add_dependency(fork, candidate);
      }
    }

    Ok(fork)
  }
}

/// The `deps` keyword as dependency specs. A single value is a one-element list.
fn dep_specs(label: &str, args: &RuleArgs) -> Result<Vec<DepSpec>, WorkspaceError> {
  let values: Vec<&ArgValue> = match args.get("deps") {
    None => Vec::new(),
    Some(ArgValue::Array(items)) => items.iter().collect(),
    Some(single) => vec![single],
  };
  values
    .into_iter()
    .map(|value| {
      DepSpec::try_from(value).map_err(|type_name| WorkspaceError::DependencyTypeError {
        rule: label.to_string(),
        value: format!("a {}", type_name),
        reason: "dependencies must be addresses, rules or capabilities".to_string(),
      })
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use std::cell::RefCell;
  use std::rc::Rc;

  use tracing_test::traced_test;

  use super::*;
  use crate::util::testutil::TestTree;

  fn workspace(tree: &TestTree) -> Workspace {
    Workspace::new(tree.root(), RuleTypeRegistry::with_builtin_rules())
  }

  fn rule_id(ws: &mut Workspace, spec: &str) -> RuleId {
    let address = ws.resolve_address(spec).unwrap();
    ws.get_rule(&address).unwrap()
  }

  fn labels(ws: &Workspace, ids: &[RuleId]) -> Vec<String> {
    ids.iter().map(|id| ws.rule(*id).unwrap().label()).collect()
  }

  #[test]
  fn family_is_parsed_once() {
    let tree = TestTree::new();
    tree.write("a/BUILD", r#"cc_library { name = "x", srcs = { "x.c" } }"#);
    tree.write("a/BUILD.extras", r#"java_library { name = "x2", srcs = { "X.java" } }"#);
    let mut ws = workspace(&tree);

    let canonical = BuildFile::new(tree.root(), "a").unwrap();
    let extras = BuildFile::new(tree.root(), "a/BUILD.extras").unwrap();
    ws.parse(&canonical).unwrap();
    ws.parse(&canonical).unwrap();
    ws.parse(&extras).unwrap();

    assert_eq!(ws.families_parsed(), 1);
    assert_eq!(ws.rules().len(), 2);
    assert!(ws.is_parsed(&extras));
  }

  #[test]
  fn forward_references_within_a_file_resolve() {
    let tree = TestTree::new();
    tree.write(
      "BUILD",
      r#"
      cc_binary { name = "app", srcs = { "main.c" }, deps = { ":lib" } }
      cc_library { name = "lib", srcs = { "lib.c" } }
      "#,
    );
    let mut ws = workspace(&tree);

    let app = rule_id(&mut ws, ":app");
    let lib = rule_id(&mut ws, ":lib");
    assert_eq!(ws.dependencies(app), vec![lib]);
  }

  #[test]
  fn rule_handles_resolve_within_the_family() {
    let tree = TestTree::new();
    tree.write(
      "BUILD",
      r#"
      local lib = cc_library { name = "lib", srcs = { "lib.c" } }
      cc_binary { name = "app", srcs = { "main.c" }, deps = lib }
      "#,
    );
    let mut ws = workspace(&tree);

    let app = rule_id(&mut ws, ":app");
    assert_eq!(labels(&ws, &ws.dependencies(app)), vec!["//:lib".to_string()]);
  }

  #[test]
  fn dependencies_in_other_packages_are_parsed_lazily() {
    let tree = TestTree::new();
    tree.write("app/BUILD", r#"cc_binary { name = "app", srcs = { "m.c" }, deps = { "//libs/z" } }"#);
    tree.write("libs/z/BUILD", r#"cc_library { name = "z", srcs = { "z.c" } }"#);
    tree.write("unrelated/BUILD", r#"cc_library { name = "u", srcs = { "u.c" } }"#);
    let mut ws = workspace(&tree);

    let app = rule_id(&mut ws, "app");
    assert_eq!(labels(&ws, &ws.dependencies(app)), vec!["//libs/z:z".to_string()]);
    assert_eq!(ws.families_parsed(), 2);
  }

  #[test]
  fn cyclic_families_terminate() {
    let tree = TestTree::new();
    tree.write("a/BUILD", r#"cc_library { name = "a", srcs = { "a.c" }, deps = { "../b" } }"#);
    tree.write("b/BUILD", r#"cc_library { name = "b", srcs = { "b.c" }, deps = { "../a" } }"#);
    let mut ws = workspace(&tree);

    let a = rule_id(&mut ws, "a");
    let b = rule_id(&mut ws, "b");
    assert_eq!(ws.dependencies(a), vec![b]);
    assert_eq!(ws.dependencies(b), vec![a]);
    assert!(ws.graph().verify_acyclic().is_err());
  }

  #[test]
  fn on_context_exit_requires_an_active_context() {
    let tree = TestTree::new();
    let mut ws = workspace(&tree);

    let result = ws.on_context_exit(|_| Ok(()));
    assert!(matches!(result, Err(WorkspaceError::ContextError)));
  }

  #[test]
  fn deferred_actions_run_in_registration_order() {
    let tree = TestTree::new();
    tree.write("BUILD", "");
    let mut ws = workspace(&tree);
    let order = Rc::new(RefCell::new(Vec::new()));

    ws.contexts.push(Context::new(BuildFile::new(tree.root(), "").unwrap()));
    for step in 0..3 {
      let order = order.clone();
      ws.on_context_exit(move |_| {
        order.borrow_mut().push(step);
        Ok(())
      })
      .unwrap();
    }
    assert_eq!(ws.current_context().unwrap().pending(), 3);

    let context = ws.pop_context().unwrap();
    ws.run_deferred(context).unwrap();
    assert_eq!(*order.borrow(), vec![0, 1, 2]);
    assert!(ws.current_context().is_none());
  }

  #[test]
  fn siblings_share_one_address_namespace() {
    let tree = TestTree::new();
    tree.write("a/BUILD", r#"cc_library { name = "x", srcs = { "x.c" } }"#);
    tree.write("a/BUILD.extras", r#"java_library { name = "x2", srcs = { "X.java" } }"#);
    let mut ws = workspace(&tree);

    let x2_via_dir = rule_id(&mut ws, "a:x2");
    let x2_via_file = rule_id(&mut ws, "a/BUILD.extras:x2");
    assert_eq!(x2_via_dir, x2_via_file);

    let rule = ws.rule(x2_via_dir).unwrap();
    assert_eq!(rule.label(), "//a:x2");
    assert_eq!(rule.source().unwrap().file_name(), "BUILD.extras");
    assert_eq!(rule.language(), Some("java"));
  }

  #[test]
  fn redeclaring_an_address_from_a_sibling_conflicts() {
    let tree = TestTree::new();
    tree.write("a/BUILD", r#"cc_library { name = "x", srcs = { "x.c" } }"#);
    tree.write("a/BUILD.extras", r#"java_library { name = "x", srcs = { "X.java" } }"#);
    let mut ws = workspace(&tree);

    let address = ws.resolve_address("a:x").unwrap();
    let err = ws.get_rule(&address).unwrap_err();
    assert!(matches!(err, WorkspaceError::AddressConflict { .. }), "unexpected error: {err}");
  }

  #[test]
  fn default_name_is_the_directory_basename() {
    let tree = TestTree::new();
    tree.write("libs/foo/BUILD", r#"cc_library { "foo", srcs = { "foo.c" } }"#);
    let mut ws = workspace(&tree);

    let foo = rule_id(&mut ws, "libs/foo");
    assert_eq!(ws.rule(foo).unwrap().name(), "foo");
  }

  #[test]
  fn missing_rules_and_bad_dependencies_are_errors() {
    let tree = TestTree::new();
    tree.write("a/BUILD", r#"cc_library { name = "a", srcs = { "a.c" }, deps = { ":nope" } }"#);
    tree.write("b/BUILD", r#"cc_library { name = "b", srcs = { "b.c" }, deps = { 42 } }"#);
    tree.write("c/BUILD", r#"cc_library { name = "c", srcs = { "c.c" }, deps = { capability("nothing") } }"#);
    tree.write("d/BUILD", r#"cc_library { name = "d" }"#);

    let get = |spec: &str| {
      let mut ws = workspace(&tree);
      let address = ws.resolve_address(spec).unwrap();
      ws.get_rule(&address)
    };
    assert!(matches!(get("a"), Err(WorkspaceError::NotFound(_))));
    assert!(matches!(get("b"), Err(WorkspaceError::DependencyTypeError { .. })));
    assert!(matches!(get("c"), Err(WorkspaceError::DependencyTypeError { .. })));
    assert!(matches!(get("d"), Err(WorkspaceError::InvalidRule { .. })));
  }

  #[test]
  #[traced_test]
  fn failed_family_leaves_the_workspace_unusable() {
    let tree = TestTree::new();
    tree.write(
      "a/BUILD",
      r#"
      cc_library { name = "early", srcs = { "e.c" }, deps = { "//b" } }
      cc_library { name = "broken", srcs = { "x.c" }, deps = { ":nope" } }
      "#,
    );
    tree.write("b/BUILD", r#"cc_library { name = "b", srcs = { "b.c" } }"#);
    tree.write("c/BUILD", r#"cc_library { name = "c", srcs = { "c.c" } }"#);
    let mut ws = workspace(&tree);

    let broken = ws.resolve_address("a:broken").unwrap();
    assert!(matches!(ws.get_rule(&broken), Err(WorkspaceError::NotFound(_))));
    assert!(logs_contain("family failed to parse"));

    let early = ws.resolve_address("a:early").unwrap();
    let err = ws.get_rule(&early).unwrap_err();
    assert!(matches!(&err, WorkspaceError::Poisoned { file } if file.ends_with("a/BUILD")), "unexpected error: {err}");
    let c = ws.resolve_address("c").unwrap();
    assert!(matches!(ws.get_rule(&c), Err(WorkspaceError::Poisoned { .. })));
  }

  #[test]
  fn abstract_rules_skip_validation() {
    let tree = TestTree::new();
    tree.write(
      "BUILD",
      r#"
      library { name = "base" }
      cc_library { name = "proto", abstract = true }
      "#,
    );
    let mut ws = workspace(&tree);

    let base = rule_id(&mut ws, ":base");
    let proto = rule_id(&mut ws, ":proto");
    assert!(ws.rule(base).unwrap().is_abstract());
    assert!(ws.rule(proto).unwrap().is_abstract());
  }

  #[test]
  fn specialization_call_sites_merge_arguments() {
    let tree = TestTree::new();
    tree.write(
      "BUILD",
      r#"
      local zlib_cc = cc_library_factory(capability("zlib"), { copts = { "-O2" }, srcs = { "z.c" } })
      zlib_cc { copts = { "-O3" } }
      zlib_cc { name = "zlib_fast", srcs = { "fast.c" } }
      "#,
    );
    let mut ws = workspace(&tree);

    let default = rule_id(&mut ws, ":zlib_cc_library");
    let fast = rule_id(&mut ws, ":zlib_fast");
    let default = ws.rule(default).unwrap();
    assert_eq!(default.args().string_list("copts").unwrap(), vec!["-O3"]);
    assert_eq!(default.args().string_list("srcs").unwrap(), vec!["z.c"]);
    let fast = ws.rule(fast).unwrap();
    assert_eq!(fast.args().string_list("copts").unwrap(), vec!["-O2"]);
    assert_eq!(fast.args().string_list("srcs").unwrap(), vec!["fast.c"]);
    assert_eq!(fast.specialization(), default.specialization());
  }

  #[test]
  fn capabilities_become_forks_over_every_variant() {
    let tree = TestTree::new();
    tree.write(
      "third_party/zlib/BUILD",
      r#"
      local zlib = capability("zlib")
      cc_library_factory(zlib, { srcs = { "z.c" } })
      java_library_factory(zlib, { srcs = { "Z.java" } })
      "#,
    );
    tree.write(
      "app/BUILD",
      r#"
      cc_binary { name = "app", srcs = { "m.c" }, deps = { capability("zlib", "//third_party/zlib") } }
      "#,
    );
    let mut ws = workspace(&tree);

    let app = rule_id(&mut ws, "app");
    let fork = ws.fork("zlib").unwrap();
    assert_eq!(ws.dependencies(app), vec![fork]);
    assert_eq!(
      labels(&ws, &ws.dependencies(fork)),
      vec![
        "//third_party/zlib:zlib_cc_library".to_string(),
        "//third_party/zlib:zlib_java_library".to_string()
      ]
    );

    let report = ws.resolve_forks();
    assert!(report.unresolved.is_empty());
    assert_eq!(
      labels(&ws, &ws.dependencies(app)),
      vec!["//third_party/zlib:zlib_cc_library".to_string()]
    );
  }

  #[test]
  fn forks_reuse_declared_instances() {
    let tree = TestTree::new();
    tree.write(
      "BUILD",
      r#"
      local zlib_go = go_library_factory("zlib", { srcs = { "z.go" } })
      local z = zlib_go { name = "zgo" }
      go_binary { name = "app", srcs = { "m.go" }, deps = { capability("zlib") } }
      "#,
    );
    let mut ws = workspace(&tree);

    let app = rule_id(&mut ws, ":app");
    let zgo = rule_id(&mut ws, ":zgo");
    let fork = ws.fork("zlib").unwrap();
    assert_eq!(ws.dependencies(fork), vec![zgo]);
    assert!(ws.resolve_address(":zlib_go_library").and_then(|a| ws.lookup(&a)).is_none());

    ws.resolve_forks();
    assert_eq!(ws.dependencies(app), vec![zgo]);
  }

  #[test]
  fn conflicting_specializations_are_rejected() {
    let tree = TestTree::new();
    tree.write(
      "BUILD",
      r#"
      cc_library_factory("zlib", { copts = { "-O1" } })
      cc_library_factory("zlib", { copts = { "-O2" } })
      "#,
    );
    let mut ws = workspace(&tree);

    let err = ws.parse(&BuildFile::new(tree.root(), "").unwrap()).unwrap_err();
    assert!(matches!(err, WorkspaceError::SpecializationConflict(_)));
  }

  #[test]
  fn cached_statements_declare_identical_rules() {
    let tree = TestTree::new();
    tree.write(
      "BUILD",
      r#"
      local zlib_cc = cc_library_factory("zlib", { srcs = { "z.c" } })
      zlib_cc { }
      cc_binary { name = "app", srcs = { "m.c" }, deps = { ":zlib_cc_library" }, properties = { tier = "core" } }
      "#,
    );

    let snapshot = |ws: &Workspace| -> Vec<(String, RuleArgs, Vec<String>)> {
      ws.rules()
        .iter()
        .map(|r| {
          let deps = labels(ws, &ws.dependencies(r.id()));
          (r.label(), r.args().clone(), deps)
        })
        .collect()
    };

    let mut first = workspace(&tree);
    rule_id(&mut first, ":app");
    assert!(tree.root().join(".b3cache/BUILD.json").is_file());

    let mut second = workspace(&tree);
    rule_id(&mut second, ":app");

    let mut uncached = workspace(&tree).with_cache(false);
    rule_id(&mut uncached, ":app");

    assert_eq!(snapshot(&first), snapshot(&second));
    assert_eq!(snapshot(&first), snapshot(&uncached));
    let app = rule_id(&mut second, ":app");
    assert_eq!(second.rule(app).unwrap().properties()["tier"], "core");
  }

  #[test]
  fn evaluation_cannot_observe_other_files() {
    let tree = TestTree::new();
    tree.write("name.txt", "first");
    tree.write(
      "BUILD",
      r#"
      local ok, opened = pcall(function() return io.open(BUILD_DIR .. "/name.txt") end)
      genrule { name = (ok and opened) and "leaked" or "sealed", cmd = "true" }
      "#,
    );

    let mut cached = workspace(&tree);
    rule_id(&mut cached, ":sealed");

    tree.write("name.txt", "second");
    let mut reused = workspace(&tree);
    rule_id(&mut reused, ":sealed");
    let mut uncached = workspace(&tree).with_cache(false);
    rule_id(&mut uncached, ":sealed");

    let all = |ws: &Workspace| labels(ws, &ws.rules().iter().map(|r| r.id()).collect::<Vec<_>>());
    assert_eq!(all(&cached), all(&uncached));
    assert_eq!(all(&reused), all(&uncached));
    assert!(uncached.resolve_address(":leaked").and_then(|a| uncached.lookup(&a)).is_none());
  }
}
