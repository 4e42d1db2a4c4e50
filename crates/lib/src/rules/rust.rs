//! Rust rules, driving `rustc` directly.
//!
//! The crate root is the `crate_root` argument, else the first source. Dependency rlibs are
//! passed with `--extern`, named after their file (`lib<crate>.rlib`).

use std::path::{Path, PathBuf};

use super::{path_arg, validate_srcs};
use crate::execute::Action;
use crate::rule::{BuildPlan, PlanCtx, RuleArgs, RuleBehavior, RuleError};

const DEFAULT_EDITION: &str = "2021";

#[derive(Debug, Default)]
pub struct RustLibrary;

#[derive(Debug, Default)]
pub struct RustBinary;

fn crate_name(name: &str) -> String {
  name.replace('-', "_")
}

fn crate_root(ctx: &PlanCtx<'_>) -> Result<PathBuf, RuleError> {
  if let Some(root) = ctx.args.string("crate_root")? {
    return Ok(ctx.package_dir.join(root));
  }
  ctx
    .required_srcs()?
    .into_iter()
    .next()
    .ok_or(RuleError::Missing("srcs"))
}

fn validate(args: &RuleArgs) -> Result<(), RuleError> {
  if args.string("crate_root")?.is_none() {
    validate_srcs(args)?;
  }
  args.string("edition")?;
  Ok(())
}

fn rustc(ctx: &PlanCtx<'_>, crate_type: &str, output: &Path) -> Result<Action, RuleError> {
  let name = crate_name(ctx.name);
  let edition = ctx.args.string("edition")?.unwrap_or(DEFAULT_EDITION);

  let mut args = vec![
    "--crate-type".to_string(),
    crate_type.to_string(),
    "--crate-name".to_string(),
    name,
    "--edition".to_string(),
    edition.to_string(),
    "-o".to_string(),
    path_arg(output),
  ];
  for rlib in ctx.dep_outputs_with_extension("rlib") {
    let Some(extern_name) = rlib
      .file_stem()
      .and_then(|s| s.to_str())
      .and_then(|s| s.strip_prefix("lib"))
    else {
      continue;
    };
    args.push("--extern".to_string());
    args.push(format!("{}={}", extern_name, rlib.display()));
    if let Some(dir) = rlib.parent() {
      args.push("-L".to_string());
      args.push(format!("dependency={}", dir.display()));
    }
  }
  args.extend(ctx.args.string_list("rustc_flags")?);
  args.push(path_arg(&crate_root(ctx)?));

  Ok(Action::cmd(&ctx.toolchain.rustc, args, ctx.package_dir))
}

impl RuleBehavior for RustLibrary {
  fn validate(&self, args: &RuleArgs) -> Result<(), RuleError> {
    validate(args)
  }

  fn plan(&self, ctx: &PlanCtx<'_>) -> Result<BuildPlan, RuleError> {
    let rlib = ctx.output(format!("lib{}.rlib", crate_name(ctx.name)));
    Ok(BuildPlan {
      actions: vec![rustc(ctx, "rlib", &rlib)?],
      outputs: vec![rlib],
    })
  }
}

impl RuleBehavior for RustBinary {
  fn validate(&self, args: &RuleArgs) -> Result<(), RuleError> {
    validate(args)
  }

  fn plan(&self, ctx: &PlanCtx<'_>) -> Result<BuildPlan, RuleError> {
    let binary = ctx.output(ctx.name);
    Ok(BuildPlan {
      actions: vec![rustc(ctx, "bin", &binary)?],
      outputs: vec![binary],
    })
  }
}
