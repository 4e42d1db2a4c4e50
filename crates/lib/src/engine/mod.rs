//! Build execution.
//!
//! The [`Engine`] owns a [`Workspace`] for one build invocation. Preparing a build resolves the
//! requested addresses (parsing families as needed), resolves forks, checks that the requested
//! subgraph is acyclic and groups it into waves. Executing runs each wave's rules concurrently,
//! bounded by `jobs`:
//! - Each rule runs at most once; a rule that is already done is a no-op
//! - A failing rule skips its dependents, while unrelated rules continue
//! - Outputs of finished rules are handed to their dependents

pub mod types;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::BuildConfig;
use crate::execute::{self, Action, ExecuteError};
use crate::rule::{DepOutputs, PlanCtx, RuleId, RuleStatus, RuleTypeRegistry};
use crate::workspace::{Workspace, WorkspaceError};

pub use types::{BuildReport, BuiltRule, EngineError, ExecutionPlan, FailedRule, RuleFailure, SkippedRule};

/// A rule whose plan is ready to run.
struct Job {
  id: RuleId,
  label: String,
  rule_type: String,
  out_dir: PathBuf,
  actions: Vec<Action>,
  outputs: Vec<PathBuf>,
}

struct JobOutcome {
  id: RuleId,
  label: String,
  rule_type: String,
  actions: usize,
  outputs: Vec<PathBuf>,
  duration: Duration,
  result: Result<(), ExecuteError>,
}

#[derive(Debug)]
pub struct Engine {
  config: BuildConfig,
  workspace: Workspace,
  outputs: HashMap<RuleId, Vec<PathBuf>>,
}

impl Engine {
  /// An engine with the built-in rule library.
  pub fn new(config: BuildConfig) -> Result<Self, EngineError> {
    Self::with_registry(config, RuleTypeRegistry::with_builtin_rules())
  }

  pub fn with_registry(mut config: BuildConfig, registry: RuleTypeRegistry) -> Result<Self, EngineError> {
    let root = dunce::canonicalize(&config.root).map_err(|source| EngineError::Root {
      path: config.root.clone(),
      source,
    })?;
    config.root = root.clone();
    let workspace = Workspace::new(root, registry).with_cache(config.use_cache);
    Ok(Self {
      config,
      workspace,
      outputs: HashMap::new(),
    })
  }

  pub fn config(&self) -> &BuildConfig {
    &self.config
  }

  pub fn workspace(&self) -> &Workspace {
    &self.workspace
  }

  pub fn workspace_mut(&mut self) -> &mut Workspace {
    &mut self.workspace
  }

  /// Outputs recorded for a finished rule.
  pub fn outputs(&self, id: RuleId) -> Option<&[PathBuf]> {
    self.outputs.get(&id).map(Vec::as_slice)
  }

  /// Resolve address strings, relative to the workspace root, to rules.
  pub fn resolve(&mut self, specs: &[String]) -> Result<Vec<RuleId>, EngineError> {
    let mut targets = Vec::with_capacity(specs.len());
    for spec in specs {
      let address = self
        .workspace
        .resolve_address(spec)
        .ok_or_else(|| WorkspaceError::NotFound(spec.clone()))?;
      let id = self.workspace.get_rule(&address)?;
      if !targets.contains(&id) {
        targets.push(id);
      }
    }
    Ok(targets)
  }

  /// Resolve `specs` and compute the waves that build them.
  pub fn prepare(&mut self, specs: &[String]) -> Result<ExecutionPlan, EngineError> {
    let targets = self.resolve(specs)?;

    let report = self.workspace.resolve_forks();
    debug!(rewired = report.rewired.len(), unresolved = report.unresolved.len(), "resolved forks");

    let members = self.workspace.graph().subgraph(&targets);
    for unresolved in report.unresolved.iter().filter(|u| members.contains(&u.consumer)) {
      let label = |id: RuleId| self.workspace.rule(id).map(|r| r.label()).unwrap_or_else(|| id.to_string());
      if self.config.allow_unresolved_forks {
        warn!(fork = %label(unresolved.fork), consumer = %label(unresolved.consumer), "ignoring unresolved fork");
        continue;
      }
      return Err(EngineError::UnresolvedFork {
        fork: label(unresolved.fork),
        consumer: label(unresolved.consumer),
        language: unresolved.language.clone(),
      });
    }

    let waves = self.workspace.graph().waves(&members)?;
    info!(targets = targets.len(), rules = members.len(), waves = waves.len(), "prepared build");
    Ok(ExecutionPlan { targets, waves })
  }

  /// Prepare and execute in one step.
  pub async fn build(&mut self, specs: &[String], passthrough: &[String]) -> Result<BuildReport, EngineError> {
    let plan = self.prepare(specs)?;
    Ok(self.execute(&plan, passthrough).await)
  }

  /// Execute a prepared plan wave by wave.
  pub async fn execute(&mut self, plan: &ExecutionPlan, passthrough: &[String]) -> BuildReport {
    let started = Instant::now();
    let mut report = BuildReport::default();
    let mut broken: HashSet<RuleId> = HashSet::new();
    let semaphore = Arc::new(Semaphore::new(self.config.jobs.max(1)));

    for (wave_idx, wave) in plan.waves.iter().enumerate() {
      debug!(wave = wave_idx, rules = wave.len(), "executing wave");
      let mut jobs = Vec::new();

      for &id in wave {
        let Some(rule) = self.workspace.rule(id) else {
          continue;
        };
        let label = rule.label();

        match rule.status() {
          RuleStatus::Done => {
            report.up_to_date.push(label);
            continue;
          }
          RuleStatus::Failed | RuleStatus::Skipped => {
            broken.insert(id);
            continue;
          }
          RuleStatus::Pending | RuleStatus::Running => {}
        }

        let failed_dep = self
          .workspace
          .dependencies(id)
          .into_iter()
          .find(|dep| broken.contains(dep));
        if let Some(dep) = failed_dep {
          let failed_dependency = self.label(dep);
          warn!(rule = %label, failed_dep = %failed_dependency, "skipping rule due to failed dependency");
          self.workspace.set_status(id, RuleStatus::Skipped);
          broken.insert(id);
          report.skipped.push(SkippedRule {
            id,
            label,
            failed_dependency,
          });
          continue;
        }

        if rule.is_fork() || rule.is_abstract() {
          debug!(rule = %label, "nothing to execute");
          self.workspace.set_status(id, RuleStatus::Done);
          self.outputs.insert(id, Vec::new());
          continue;
        }

        match self.plan_rule(id, passthrough) {
          Ok(job) => jobs.push(job),
          Err(e) => {
            error!(rule = %label, error = %e, "cannot plan rule");
            self.workspace.set_status(id, RuleStatus::Failed);
            broken.insert(id);
            report.failed.push(FailedRule {
              id,
              label,
              error: RuleFailure::Plan(e),
            });
          }
        }
      }

      if jobs.is_empty() {
        continue;
      }
      for job in &jobs {
        self.workspace.set_status(job.id, RuleStatus::Running);
      }

      for outcome in self.execute_wave(jobs, semaphore.clone()).await {
        match outcome.result {
          Ok(()) => {
            info!(rule = %outcome.label, duration = ?outcome.duration, "rule succeeded");
            self.workspace.set_status(outcome.id, RuleStatus::Done);
            self.outputs.insert(outcome.id, outcome.outputs.clone());
            report.built.push(BuiltRule {
              id: outcome.id,
              label: outcome.label,
              rule_type: outcome.rule_type,
              outputs: outcome.outputs,
              actions: outcome.actions,
              duration: outcome.duration,
            });
          }
          Err(e) => {
            error!(rule = %outcome.label, error = %e, "rule failed");
            self.workspace.set_status(outcome.id, RuleStatus::Failed);
            broken.insert(outcome.id);
            report.failed.push(FailedRule {
              id: outcome.id,
              label: outcome.label,
              error: RuleFailure::Execute(e),
            });
          }
        }
      }
    }

    // A panicked task never reports back; its rule is still marked running.
    for id in plan.order() {
      if self.workspace.rule(id).is_some_and(|r| r.status() == RuleStatus::Running) {
        self.workspace.set_status(id, RuleStatus::Failed);
        report.failed.push(FailedRule {
          id,
          label: self.label(id),
          error: RuleFailure::Panicked("task did not complete".to_string()),
        });
      }
    }

    report.duration = started.elapsed();
    info!(
      built = report.built.len(),
      failed = report.failed.len(),
      skipped = report.skipped.len(),
      "build complete"
    );
    report
  }

  fn label(&self, id: RuleId) -> String {
    self.workspace.rule(id).map(|r| r.label()).unwrap_or_else(|| id.to_string())
  }

  /// Directory reserved for a rule's artifacts: `<out>/<package>/<name>`.
  pub fn rule_out_dir(&self, id: RuleId) -> Option<PathBuf> {
    let rule = self.workspace.rule(id)?;
    let address = rule.address()?;
    Some(self.config.out_dir().join(address.package()).join(rule.name()))
  }

  fn plan_rule(&self, id: RuleId, passthrough: &[String]) -> Result<Job, crate::rule::RuleError> {
    let invalid = |what: &str| crate::rule::RuleError::Invalid(format!("{} has no {}", id, what));
    let rule = self.workspace.rule(id).ok_or_else(|| invalid("rule"))?;
    let def = self
      .workspace
      .registry()
      .get(rule.rule_type())
      .ok_or_else(|| invalid("registered type"))?;
    let source = rule.source().ok_or_else(|| invalid("declaring file"))?;
    let out_dir = self.rule_out_dir(id).ok_or_else(|| invalid("address"))?;
    let label = rule.label();

    let deps: Vec<DepOutputs> = self
      .workspace
      .dependencies(id)
      .into_iter()
      .filter_map(|dep| self.workspace.rule(dep))
      .map(|dep| DepOutputs {
        label: dep.label(),
        rule_type: dep.rule_type().to_string(),
        language: dep.language().map(str::to_string),
        package_dir: dep.source().map(|s| s.dir().to_path_buf()).unwrap_or_default(),
        outputs: self.outputs.get(&dep.id()).cloned().unwrap_or_default(),
      })
      .collect();

    let ctx = PlanCtx {
      label: &label,
      name: rule.name(),
      args: rule.args(),
      properties: rule.properties(),
      package_dir: source.dir(),
      out_dir: &out_dir,
      deps: &deps,
      toolchain: &self.config.toolchain,
      passthrough,
    };
    let plan = def.behavior.plan(&ctx)?;
    debug!(rule = %label, actions = plan.actions.len(), "planned rule");

    Ok(Job {
      id,
      label,
      rule_type: rule.rule_type().to_string(),
      out_dir,
      actions: plan.actions,
      outputs: plan.outputs,
    })
  }

  /// Run one wave's jobs in parallel, at most `jobs` at a time.
  async fn execute_wave(&self, jobs: Vec<Job>, semaphore: Arc<Semaphore>) -> Vec<JobOutcome> {
    let timeout = self.config.action_timeout;
    let mut join_set = JoinSet::new();

    for job in jobs {
      let semaphore = semaphore.clone();
      join_set.spawn(async move {
        let _permit = semaphore.acquire_owned().await.ok();
        let started = Instant::now();
        let result = run_job(&job.out_dir, &job.actions, timeout).await;
        JobOutcome {
          id: job.id,
          label: job.label,
          rule_type: job.rule_type,
          actions: job.actions.len(),
          outputs: job.outputs,
          duration: started.elapsed(),
          result,
        }
      });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = join_set.join_next().await {
      match joined {
        Ok(outcome) => outcomes.push(outcome),
        Err(e) => error!(error = %e, "rule task panicked"),
      }
    }
    outcomes.sort_by_key(|o| o.id);
    outcomes
  }
}

async fn run_job(out_dir: &Path, actions: &[Action], timeout: Option<Duration>) -> Result<(), ExecuteError> {
  tokio::fs::create_dir_all(out_dir).await?;
  execute::execute_actions(actions, timeout).await?;
  Ok(())
}
