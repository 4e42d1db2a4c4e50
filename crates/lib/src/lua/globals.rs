//! Globals available to declaration files.
//!
//! - `ROOT_DIR`, `BUILD_FILE`, `BUILD_DIR` - Workspace root, the file's relative path, its
//!   absolute directory
//! - `path` - Path manipulation utilities
//! - `capability(name[, hint])` - A capability handle usable in `deps` and factories
//! - `<rule_type>{ ... }` - Declare a rule; returns a rule handle
//! - `<rule_type>_factory(target, { ... })` - Specialize a rule type for a capability; returns a
//!   callable that declares rules of that specialization

use std::cell::RefCell;
use std::rc::Rc;

use mlua::prelude::*;

use super::convert::{capability_to_lua, handle_type, lua_value_to_rule_args, rule_ref_to_lua, table_to_capability};
use super::path::create_path_helpers;
use crate::buildfile::BuildFile;
use crate::consts::{CAPABILITY_TYPE, FACTORY_SUFFIX, SPECIALIZATION_TYPE};
use crate::rule::{Capability, RuleArgs};
use crate::rule::specialization::specialization_name;
use crate::statement::{Constructor, Statement};

/// Statements recorded while a file is evaluated.
#[derive(Debug, Default)]
pub struct Recorder {
  pub statements: Vec<Statement>,
  specializations: usize,
}

impl Recorder {
  fn declare(&mut self, constructor: Constructor, args: RuleArgs) {
    self.statements.push(Statement::Declare { constructor, args });
  }

  fn specialize(&mut self, rule_type: &str, target: Capability, args: RuleArgs) -> usize {
    self.statements.push(Statement::Specialize {
      rule_type: rule_type.to_string(),
      target,
      args,
    });
    self.specializations += 1;
    self.specializations - 1
  }
}

/// Register every global for evaluating `buildfile`.
pub fn register_globals(
  lua: &Lua,
  buildfile: &BuildFile,
  rule_types: &[String],
  recorder: Rc<RefCell<Recorder>>,
) -> LuaResult<()> {
  let globals = lua.globals();

  globals.set("ROOT_DIR", buildfile.root().to_string_lossy().into_owned())?;
  globals.set("BUILD_FILE", buildfile.to_string())?;
  globals.set("BUILD_DIR", buildfile.dir().to_string_lossy().into_owned())?;
  globals.set("path", create_path_helpers(lua, buildfile.dir())?)?;

  globals.set(
    "capability",
    lua.create_function(|lua, (name, hint): (String, Option<String>)| {
      if name.is_empty() {
        return Err(LuaError::external("capability name must not be empty"));
      }
      let capability = Capability { name, hint };
      capability_to_lua(lua, &capability)
    })?,
  )?;

  for rule_type in rule_types {
    register_constructor(lua, rule_type, recorder.clone())?;
    register_factory(lua, rule_type, recorder.clone())?;
  }

  Ok(())
}

fn register_constructor(lua: &Lua, rule_type: &str, recorder: Rc<RefCell<Recorder>>) -> LuaResult<()> {
  let type_name = rule_type.to_string();
  let constructor = lua.create_function(move |lua, value: LuaValue| {
    let args = lua_value_to_rule_args(value)?;
    let name = args
      .declared_name()
      .map(str::to_string)
      .ok_or_else(|| LuaError::external(format!("{} declared without a name", type_name)))?;

    recorder
      .borrow_mut()
      .declare(Constructor::RuleType(type_name.clone()), args);
    rule_ref_to_lua(lua, &name)
  })?;
  lua.globals().set(rule_type, constructor)
}

fn register_factory(lua: &Lua, rule_type: &str, recorder: Rc<RefCell<Recorder>>) -> LuaResult<()> {
  let type_name = rule_type.to_string();
  let factory = lua.create_function(move |lua, (target, bound): (LuaValue, LuaValue)| {
    let target = match target {
      LuaValue::String(s) => Capability::new(s.to_str()?.to_string()),
      LuaValue::Table(t) if handle_type(&t).as_deref() == Some(CAPABILITY_TYPE) => table_to_capability(&t)?,
      other => {
        return Err(LuaError::external(format!(
          "{}{} target must be a capability or a name, got {}",
          type_name,
          FACTORY_SUFFIX,
          other.type_name()
        )));
      }
    };
    let bound = lua_value_to_rule_args(bound)?;
    let default_name = specialization_name(&target, &type_name);
    let index = recorder.borrow_mut().specialize(&type_name, target.clone(), bound);

    let handle = lua.create_table()?;
    handle.set("name", default_name.as_str())?;
    handle.set("rule_type", type_name.as_str())?;
    handle.set("target", capability_to_lua(lua, &target)?)?;

    let mt = lua.create_table()?;
    mt.set("__type", SPECIALIZATION_TYPE)?;
    let recorder = recorder.clone();
    mt.set(
      "__call",
      lua.create_function(move |lua, (_, value): (LuaTable, LuaValue)| {
        let args = lua_value_to_rule_args(value)?;
        let name = args.declared_name().unwrap_or(default_name.as_str()).to_string();
        recorder.borrow_mut().declare(Constructor::Specialization(index), args);
        rule_ref_to_lua(lua, &name)
      })?,
    )?;
    handle.set_metatable(Some(mt))?;
    Ok(handle)
  })?;
  lua.globals().set(format!("{}{}", rule_type, FACTORY_SUFFIX), factory)
}
