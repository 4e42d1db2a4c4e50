use std::cell::RefCell;
use std::rc::Rc;

use mlua::prelude::*;
use mlua::{LuaOptions, StdLib};

use crate::buildfile::BuildFile;
use crate::lua::globals::{self, Recorder};
use crate::statement::Statement;

/// Base functions that reach outside the file being evaluated.
const UNSAFE_BASE_GLOBALS: &[&str] = &["dofile", "loadfile", "load", "require", "collectgarbage"];

/// Create a fresh Lua runtime for evaluating `buildfile`.
///
/// Evaluation must depend on nothing but the file's text: compiled statements are cached
/// keyed on it. Only the pure libraries are loaded and `io`, `os`, `package` and file
/// loading are unavailable.
pub fn create_runtime(buildfile: &BuildFile, rule_types: &[String], recorder: Rc<RefCell<Recorder>>) -> LuaResult<Lua> {
  let libs = StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8;
  let lua = Lua::new_with(libs, LuaOptions::default())?;
  let env = lua.globals();
  for name in UNSAFE_BASE_GLOBALS {
    env.raw_set(*name, LuaNil)?;
  }
  globals::register_globals(&lua, buildfile, rule_types, recorder)?;
  Ok(lua)
}

/// Evaluate a declaration file and return the statements it recorded.
pub fn compile_file(buildfile: &BuildFile, rule_types: &[String]) -> LuaResult<Vec<Statement>> {
  let content = std::fs::read_to_string(buildfile.path())
    .map_err(|e| LuaError::external(format!("cannot read '{}': {}", buildfile.path().display(), e)))?;
  compile_source(buildfile, &content, rule_types)
}

/// Evaluate `content` as if it were the contents of `buildfile`.
pub fn compile_source(buildfile: &BuildFile, content: &str, rule_types: &[String]) -> LuaResult<Vec<Statement>> {
  let recorder = Rc::new(RefCell::new(Recorder::default()));
  let lua = create_runtime(buildfile, rule_types, recorder.clone())?;

  lua
    .load(content)
    .set_name(format!("@{}", buildfile.path().display()))
    .exec()?;
  drop(lua);

  let statements = std::mem::take(&mut recorder.borrow_mut().statements);
  Ok(statements)
}
