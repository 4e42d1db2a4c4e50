//! The workspace dependency graph.
//!
//! Nodes are rules (forks included); an edge `a -> b` means `a` depends on `b`. Besides plain
//! graph queries this module owns fork resolution, which rewrites edges into forks as direct
//! edges to the language-matching candidates, and the wave computation used for execution.

use std::collections::{BTreeSet, HashMap};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use thiserror::Error;
use tracing::{debug, warn};

use crate::rule::{Rule, RuleId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  /// The graph is not a DAG; the rule is one member of a cycle.
  #[error("dependency cycle detected involving {0}")]
  CycleDetected(RuleId),
}

/// A consumer whose language none of a fork's candidates provide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedFork {
  pub fork: RuleId,
  pub consumer: RuleId,
  pub language: Option<String>,
}

/// Outcome of [`DependencyGraph::resolve_forks`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForkReport {
  /// `(consumer, candidate)` edges added.
  pub rewired: Vec<(RuleId, RuleId)>,
  pub unresolved: Vec<UnresolvedFork>,
}

#[derive(Debug, Default)]
pub struct DependencyGraph {
  graph: DiGraph<RuleId, ()>,
  nodes: HashMap<RuleId, NodeIndex>,
}

impl DependencyGraph {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_rule(&mut self, id: RuleId) {
    if !self.nodes.contains_key(&id) {
      let idx = self.graph.add_node(id);
      self.nodes.insert(id, idx);
    }
  }

  pub fn contains(&self, id: RuleId) -> bool {
    self.nodes.contains_key(&id)
  }

  /// Record that `dependent` depends on `dependency`. Returns false if the edge already existed.
  pub fn add_dependency(&mut self, dependent: RuleId, dependency: RuleId) -> bool {
    self.add_rule(dependent);
    self.add_rule(dependency);
    let (from, to) = (self.nodes[&dependent], self.nodes[&dependency]);
    if self.graph.contains_edge(from, to) {
      return false;
    }
    self.graph.add_edge(from, to, ());
    true
  }

  pub fn remove_dependency(&mut self, dependent: RuleId, dependency: RuleId) -> bool {
    let (Some(&from), Some(&to)) = (self.nodes.get(&dependent), self.nodes.get(&dependency)) else {
      return false;
    };
    match self.graph.find_edge(from, to) {
      Some(edge) => {
        self.graph.remove_edge(edge);
        true
      }
      None => false,
    }
  }

  pub fn has_dependency(&self, dependent: RuleId, dependency: RuleId) -> bool {
    match (self.nodes.get(&dependent), self.nodes.get(&dependency)) {
      (Some(&from), Some(&to)) => self.graph.contains_edge(from, to),
      _ => false,
    }
  }

  fn neighbors(&self, id: RuleId, direction: Direction) -> Vec<RuleId> {
    let Some(&idx) = self.nodes.get(&id) else {
      return Vec::new();
    };
    let mut ids: Vec<RuleId> = self
      .graph
      .neighbors_directed(idx, direction)
      .map(|n| self.graph[n])
      .collect();
    ids.sort();
    ids.dedup();
    ids
  }

  /// Direct dependencies of `id`, ordered by id.
  pub fn dependencies(&self, id: RuleId) -> Vec<RuleId> {
    self.neighbors(id, Direction::Outgoing)
  }

  /// Rules that directly depend on `id`, ordered by id.
  pub fn dependents(&self, id: RuleId) -> Vec<RuleId> {
    self.neighbors(id, Direction::Incoming)
  }

  pub fn rule_count(&self) -> usize {
    self.graph.node_count()
  }

  pub fn edge_count(&self) -> usize {
    self.graph.edge_count()
  }

  /// Replace every `consumer -> fork` edge with edges to the fork's matching candidates.
  ///
  /// A candidate matches when it is not abstract and its `programming_language` is unset or
  /// equal to the consumer's. Every match is wired. Consumers with no match keep their edge to
  /// the fork and are listed in the report; forks nobody depends on are left alone.
  pub fn resolve_forks(&mut self, rules: &[Rule]) -> ForkReport {
    let mut report = ForkReport::default();
    let mut forks: Vec<RuleId> = self
      .nodes
      .keys()
      .copied()
      .filter(|id| rules.get(id.0).is_some_and(Rule::is_fork))
      .collect();
    forks.sort();

    for fork in forks {
      let candidates: Vec<&Rule> = self
        .dependencies(fork)
        .into_iter()
        .filter_map(|c| rules.get(c.0))
        .filter(|c| !c.is_abstract())
        .collect();

      for consumer in self.dependents(fork) {
        let parent_lang = rules.get(consumer.0).and_then(Rule::language);
        let mut matched = false;

        for candidate in &candidates {
          let child_lang = candidate.language();
          if child_lang.is_none() || child_lang == parent_lang {
            if candidate.id() != consumer && self.add_dependency(consumer, candidate.id()) {
              report.rewired.push((consumer, candidate.id()));
            }
            matched = true;
          }
        }

        if matched {
          self.remove_dependency(consumer, fork);
          debug!(fork = %fork, consumer = %consumer, "resolved fork");
        } else {
          warn!(fork = %fork, consumer = %consumer, language = ?parent_lang, "no fork candidate matches consumer");
          report.unresolved.push(UnresolvedFork {
            fork,
            consumer,
            language: parent_lang.map(str::to_string),
          });
        }
      }
    }

    report
  }

  /// Languages offered by a fork's candidates that at least one of its consumers uses.
  pub fn common_languages(&self, fork: RuleId, rules: &[Rule]) -> BTreeSet<String> {
    let offered: BTreeSet<&str> = self
      .dependencies(fork)
      .into_iter()
      .filter_map(|c| rules.get(c.0))
      .filter(|c| !c.is_abstract())
      .filter_map(Rule::language)
      .collect();

    self
      .dependents(fork)
      .into_iter()
      .filter_map(|p| rules.get(p.0).and_then(Rule::language))
      .filter(|lang| offered.contains(lang))
      .map(str::to_string)
      .collect()
  }

  /// `roots` and everything reachable from them.
  pub fn subgraph(&self, roots: &[RuleId]) -> BTreeSet<RuleId> {
    let mut reached = BTreeSet::new();
    for root in roots {
      let Some(&start) = self.nodes.get(root) else {
        continue;
      };
      let mut dfs = Dfs::new(&self.graph, start);
      while let Some(idx) = dfs.next(&self.graph) {
        reached.insert(self.graph[idx]);
      }
    }
    reached
  }

  /// Fail if the whole graph contains a cycle.
  pub fn verify_acyclic(&self) -> Result<(), GraphError> {
    toposort(&self.graph, None)
      .map(|_| ())
      .map_err(|cycle| GraphError::CycleDetected(self.graph[cycle.node_id()]))
  }

  /// Group `members` into waves: every rule's dependencies (within `members`) are in earlier
  /// waves. Rules in one wave may run concurrently.
  pub fn waves(&self, members: &BTreeSet<RuleId>) -> Result<Vec<Vec<RuleId>>, GraphError> {
    let mut pending: HashMap<RuleId, usize> = members
      .iter()
      .map(|&id| {
        let count = self.dependencies(id).iter().filter(|d| members.contains(d)).count();
        (id, count)
      })
      .collect();

    let mut waves = Vec::new();
    while !pending.is_empty() {
      let mut ready: Vec<RuleId> = pending.iter().filter(|(_, count)| **count == 0).map(|(id, _)| *id).collect();
      if ready.is_empty() {
        let stuck = pending.keys().min().copied().unwrap_or(RuleId(0));
        return Err(GraphError::CycleDetected(stuck));
      }
      ready.sort();

      for id in &ready {
        pending.remove(id);
        for dependent in self.dependents(*id) {
          if let Some(count) = pending.get_mut(&dependent) {
            *count = count.saturating_sub(1);
          }
        }
      }
      waves.push(ready);
    }
    Ok(waves)
  }

  /// `members` in dependency order.
  pub fn topological(&self, members: &BTreeSet<RuleId>) -> Result<Vec<RuleId>, GraphError> {
    Ok(self.waves(members)?.into_iter().flatten().collect())
  }
}
