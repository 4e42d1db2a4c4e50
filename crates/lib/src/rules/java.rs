//! Java rules. Both compile into `<out>/classes` and package a jar; `java_binary` also records
//! its entry point.

use super::{path_arg, validate_srcs};
use crate::execute::Action;
use crate::rule::{BuildPlan, PlanCtx, RuleArgs, RuleBehavior, RuleError};

#[derive(Debug, Default)]
pub struct JavaLibrary;

#[derive(Debug, Default)]
pub struct JavaBinary;

fn compile_and_package(ctx: &PlanCtx<'_>, main_class: Option<&str>) -> Result<BuildPlan, RuleError> {
  let srcs = ctx.required_srcs()?;
  let classes = ctx.output("classes");
  let jar = ctx.output(format!("{}.jar", ctx.name));

  let mut javac = vec!["-d".to_string(), path_arg(&classes)];
  let classpath: Vec<String> = ctx.dep_outputs_with_extension("jar").iter().map(|j| path_arg(j)).collect();
  if !classpath.is_empty() {
    javac.push("-cp".to_string());
    javac.push(classpath.join(":"));
  }
  javac.extend(ctx.args.string_list("javacopts")?);
  javac.extend(srcs.iter().map(|s| path_arg(s)));

  let mut jar_args = match main_class {
    Some(main) => vec!["cfe".to_string(), path_arg(&jar), main.to_string()],
    None => vec!["cf".to_string(), path_arg(&jar)],
  };
  jar_args.extend(["-C".to_string(), path_arg(&classes), ".".to_string()]);

  Ok(BuildPlan {
    actions: vec![
      Action::cmd(&ctx.toolchain.javac, javac, ctx.package_dir),
      Action::cmd(&ctx.toolchain.jar, jar_args, ctx.out_dir),
    ],
    outputs: vec![jar],
  })
}

impl RuleBehavior for JavaLibrary {
  fn validate(&self, args: &RuleArgs) -> Result<(), RuleError> {
    validate_srcs(args)
  }

  fn plan(&self, ctx: &PlanCtx<'_>) -> Result<BuildPlan, RuleError> {
    compile_and_package(ctx, None)
  }
}

impl RuleBehavior for JavaBinary {
  fn validate(&self, args: &RuleArgs) -> Result<(), RuleError> {
    validate_srcs(args)?;
    if args.string("main_class")?.is_none() {
      return Err(RuleError::Missing("main_class"));
    }
    Ok(())
  }

  fn plan(&self, ctx: &PlanCtx<'_>) -> Result<BuildPlan, RuleError> {
    let main_class = ctx.args.string("main_class")?.ok_or(RuleError::Missing("main_class"))?;
    compile_and_package(ctx, Some(main_class))
  }
}
