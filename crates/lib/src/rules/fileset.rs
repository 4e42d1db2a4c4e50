//! `fileset`: copies its sources, keeping their relative layout, into its output directory.

use std::path::{Component, Path};

use super::validate_srcs;
use crate::execute::Action;
use crate::rule::{BuildPlan, PlanCtx, RuleArgs, RuleBehavior, RuleError};
use crate::util::path::normalize;

#[derive(Debug, Default)]
pub struct Fileset;

impl RuleBehavior for Fileset {
  fn validate(&self, args: &RuleArgs) -> Result<(), RuleError> {
    validate_srcs(args)
  }

  fn plan(&self, ctx: &PlanCtx<'_>) -> Result<BuildPlan, RuleError> {
    let mut plan = BuildPlan::default();
    for src in ctx.args.string_list("srcs")? {
      let written = Path::new(&src);
      if written.is_absolute() || written.components().any(|c| c == Component::ParentDir) {
        return Err(RuleError::Invalid(format!("fileset source '{}' leaves the package", src)));
      }
      let relative = normalize(written);
      let to = ctx.output(&relative);
      plan.actions.push(Action::Copy {
        from: ctx.package_dir.join(&relative),
        to: to.clone(),
      });
      plan.outputs.push(to);
    }
    if plan.outputs.is_empty() {
      return Err(RuleError::Missing("srcs"));
    }
    Ok(plan)
  }
}
