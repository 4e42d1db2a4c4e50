//! C and C++ rules.
//!
//! `cc_library` compiles each source to an object and archives them into `lib<name>.a`.
//! `cc_binary` compiles and links its sources against the archives of its dependencies.

use std::path::{Path, PathBuf};

use super::{object_path, path_arg, validate_srcs};
use crate::execute::Action;
use crate::rule::{BuildPlan, PlanCtx, RuleArgs, RuleBehavior, RuleError};

#[derive(Debug, Default)]
pub struct CcLibrary;

#[derive(Debug, Default)]
pub struct CcBinary;

/// `-I` flags for the package and every direct dependency's package.
fn include_flags(ctx: &PlanCtx<'_>) -> Vec<String> {
  let mut dirs: Vec<PathBuf> = vec![ctx.package_dir.to_path_buf()];
  for dep in ctx.deps {
    if !dirs.contains(&dep.package_dir) {
      dirs.push(dep.package_dir.clone());
    }
  }
  dirs.iter().map(|d| format!("-I{}", d.display())).collect()
}

impl RuleBehavior for CcLibrary {
  fn validate(&self, args: &RuleArgs) -> Result<(), RuleError> {
    validate_srcs(args)?;
    args.string_list("copts")?;
    Ok(())
  }

  fn plan(&self, ctx: &PlanCtx<'_>) -> Result<BuildPlan, RuleError> {
    let srcs = ctx.required_srcs()?;
    let copts = ctx.args.string_list("copts")?;
    let includes = include_flags(ctx);

    let objects: Vec<PathBuf> = srcs
      .iter()
      .map(|src| object_path(ctx.out_dir, ctx.package_dir, src, "o"))
      .collect();

    let mut actions = Vec::with_capacity(srcs.len() + 2);
    let mut object_dirs: Vec<&Path> = objects
      .iter()
      .filter_map(|o| o.parent())
      .filter(|dir| *dir != ctx.out_dir)
      .collect();
    object_dirs.sort();
    object_dirs.dedup();
    actions.extend(object_dirs.into_iter().map(|dir| Action::Mkdir { path: dir.to_path_buf() }));

    for (src, object) in srcs.iter().zip(&objects) {
      let mut args = vec!["-c".to_string(), path_arg(src), "-o".to_string(), path_arg(&object)];
      args.extend(copts.iter().cloned());
      args.extend(includes.iter().cloned());
      actions.push(Action::cmd(&ctx.toolchain.cc, args, ctx.package_dir));
    }

    let archive = ctx.output(format!("lib{}.a", ctx.name));
    let mut args = vec!["rcs".to_string(), path_arg(&archive)];
    args.extend(objects.iter().map(|o| path_arg(o)));
    actions.push(Action::cmd(&ctx.toolchain.ar, args, ctx.out_dir));

    Ok(BuildPlan {
      actions,
      outputs: vec![archive],
    })
  }
}

impl RuleBehavior for CcBinary {
  fn validate(&self, args: &RuleArgs) -> Result<(), RuleError> {
    validate_srcs(args)?;
    args.string_list("copts")?;
    args.string_list("linkopts")?;
    Ok(())
  }

  fn plan(&self, ctx: &PlanCtx<'_>) -> Result<BuildPlan, RuleError> {
    let srcs = ctx.required_srcs()?;
    let binary = ctx.output(ctx.name);

    let mut args = vec!["-o".to_string(), path_arg(&binary)];
    args.extend(ctx.args.string_list("copts")?);
    args.extend(include_flags(ctx));
    args.extend(srcs.iter().map(|s| path_arg(s)));
    args.extend(ctx.dep_outputs_with_extension("a").iter().map(|a| path_arg(a)));
    args.extend(ctx.args.string_list("linkopts")?);

    Ok(BuildPlan {
      actions: vec![Action::cmd(&ctx.toolchain.cc, args, ctx.package_dir)],
      outputs: vec![binary],
    })
  }
}
