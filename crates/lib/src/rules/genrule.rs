//! `genrule`: run a shell command.
//!
//! The command runs through `/bin/sh -c` in the package directory. Passthrough arguments
//! become `$1..$n`. The environment carries `OUT` (the rule's output directory), `NAME`,
//! `SRCS` (space separated, absolute) and `DEPS` (outputs of direct dependencies). Declared
//! `outs` are relative to `OUT`.

use std::collections::BTreeMap;

use super::path_arg;
use crate::execute::Action;
use crate::rule::{BuildPlan, PlanCtx, RuleArgs, RuleBehavior, RuleError};

const SHELL: &str = "/bin/sh";

#[derive(Debug, Default)]
pub struct Genrule;

impl RuleBehavior for Genrule {
  fn validate(&self, args: &RuleArgs) -> Result<(), RuleError> {
    match args.string("cmd")? {
      Some(cmd) if !cmd.trim().is_empty() => {}
      _ => return Err(RuleError::Missing("cmd")),
    }
    args.string_list("srcs")?;
    args.string_list("outs")?;
    Ok(())
  }

  fn plan(&self, ctx: &PlanCtx<'_>) -> Result<BuildPlan, RuleError> {
    let cmd = ctx.args.string("cmd")?.ok_or(RuleError::Missing("cmd"))?;

    let mut args = vec!["-c".to_string(), cmd.to_string(), ctx.name.to_string()];
    args.extend(ctx.passthrough.iter().cloned());

    let srcs: Vec<String> = ctx.srcs()?.iter().map(|s| path_arg(s)).collect();
    let deps: Vec<String> = ctx
      .deps
      .iter()
      .flat_map(|d| d.outputs.iter())
      .map(|o| path_arg(o))
      .collect();
    let env = BTreeMap::from([
      ("OUT".to_string(), path_arg(ctx.out_dir)),
      ("NAME".to_string(), ctx.name.to_string()),
      ("SRCS".to_string(), srcs.join(" ")),
      ("DEPS".to_string(), deps.join(" ")),
    ]);

    let outputs = ctx
      .args
      .string_list("outs")?
      .iter()
      .map(|out| ctx.output(out))
      .collect();

    Ok(BuildPlan {
      actions: vec![Action::Cmd {
        program: SHELL.to_string(),
        args,
        cwd: ctx.package_dir.to_path_buf(),
        env,
      }],
      outputs,
    })
  }
}
