//! Go rules.
//!
//! A `go_library` stages its sources into its output directory; a `go_binary` builds its own
//! sources together with the staged sources of its dependencies.

use super::{path_arg, validate_srcs};
use crate::execute::Action;
use crate::rule::{BuildPlan, PlanCtx, RuleArgs, RuleBehavior, RuleError};

#[derive(Debug, Default)]
pub struct GoLibrary;

#[derive(Debug, Default)]
pub struct GoBinary;

impl RuleBehavior for GoLibrary {
  fn validate(&self, args: &RuleArgs) -> Result<(), RuleError> {
    validate_srcs(args)
  }

  fn plan(&self, ctx: &PlanCtx<'_>) -> Result<BuildPlan, RuleError> {
    let mut plan = BuildPlan::default();
    for src in ctx.required_srcs()? {
      let Some(file_name) = src.file_name() else {
        return Err(RuleError::Invalid(format!("'{}' is not a file", src.display())));
      };
      let to = ctx.output(file_name);
      plan.actions.push(Action::Copy { from: src, to: to.clone() });
      plan.outputs.push(to);
    }
    Ok(plan)
  }
}

impl RuleBehavior for GoBinary {
  fn validate(&self, args: &RuleArgs) -> Result<(), RuleError> {
    validate_srcs(args)
  }

  fn plan(&self, ctx: &PlanCtx<'_>) -> Result<BuildPlan, RuleError> {
    let binary = ctx.output(ctx.name);
    let mut args = vec!["build".to_string(), "-o".to_string(), path_arg(&binary)];
    args.extend(ctx.required_srcs()?.iter().map(|s| path_arg(s)));
    args.extend(ctx.dep_outputs_with_extension("go").iter().map(|s| path_arg(s)));

    Ok(BuildPlan {
      actions: vec![Action::cmd(&ctx.toolchain.go, args, ctx.package_dir)],
      outputs: vec![binary],
    })
  }
}

#[cfg(test)]
mod tests {
  use std::path::PathBuf;

  use super::*;
  use crate::rules::testing::{OUT_DIR, dep, plan};

  #[test]
  fn library_stages_sources() {
    let args = RuleArgs::new().with("srcs", vec!["z.go", "sub/y.go"]);
    let plan = plan(&GoLibrary, &args, &[], &[]).unwrap();

    assert_eq!(
      plan.actions[1],
      Action::Copy {
        from: PathBuf::from("/ws/pkg/sub/y.go"),
        to: PathBuf::from(format!("{OUT_DIR}/y.go")),
      }
    );
    assert_eq!(plan.outputs.len(), 2);
  }

  #[test]
  fn binary_builds_with_dependency_sources() {
    let args = RuleArgs::new().with("srcs", "main.go");
    let deps = [dep("//z:z", "go_library", &["/o/z/z.go"])];
    let plan = plan(&GoBinary, &args, &deps, &[]).unwrap();

    assert_eq!(
      plan.actions[0].to_string(),
      format!("go build -o {OUT_DIR}/x /ws/pkg/main.go /o/z/z.go")
    );
  }
}
