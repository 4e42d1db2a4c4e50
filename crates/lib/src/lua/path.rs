use std::path::{Path, PathBuf};

use mlua::prelude::*;

use crate::util::path::{normalize, resolve};

/// Create the `path` table with path manipulation utilities.
///
/// `base_dir` is the directory of the file being evaluated; `path.resolve` is relative to it.
pub fn create_path_helpers(lua: &Lua, base_dir: &Path) -> LuaResult<LuaTable> {
  let path = lua.create_table()?;

  // path.join(...) - Join multiple path segments
  path.set(
    "join",
    lua.create_function(|_, segments: LuaMultiValue| {
      let mut result = PathBuf::new();
      for segment in segments {
        if let LuaValue::String(s) = segment {
          result.push(s.to_str()?.as_ref());
        }
      }
      Ok(result.to_string_lossy().into_owned())
    })?,
  )?;

  path.set(
    "dirname",
    lua.create_function(|_, path_str: String| {
      Ok(
        Path::new(&path_str)
          .parent()
          .map(|p| p.to_string_lossy().into_owned())
          .unwrap_or_default(),
      )
    })?,
  )?;

  path.set(
    "basename",
    lua.create_function(|_, path_str: String| {
      Ok(
        Path::new(&path_str)
          .file_name()
          .map(|n| n.to_string_lossy().into_owned())
          .unwrap_or_default(),
      )
    })?,
  )?;

  // path.extname(path) - File extension including the dot
  path.set(
    "extname",
    lua.create_function(|_, path_str: String| {
      Ok(
        Path::new(&path_str)
          .extension()
          .map(|e| format!(".{}", e.to_string_lossy()))
          .unwrap_or_default(),
      )
    })?,
  )?;

  path.set(
    "normalize",
    lua.create_function(|_, path_str: String| Ok(normalize(Path::new(&path_str)).to_string_lossy().into_owned()))?,
  )?;

  // path.resolve(...) - Absolute path, relative segments taken from the declaring directory
  let base = base_dir.to_path_buf();
  path.set(
    "resolve",
    lua.create_function(move |_, segments: LuaMultiValue| {
      let mut result = base.clone();
      for segment in segments {
        if let LuaValue::String(s) = segment {
          let segment = s.to_str()?.to_string();
          result = resolve(&result, Path::new(&segment));
        }
      }
      Ok(result.to_string_lossy().into_owned())
    })?,
  )?;

  Ok(path)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn create_test_lua() -> LuaResult<Lua> {
    let lua = Lua::new();
    let path = create_path_helpers(&lua, Path::new("/ws/pkg"))?;
    lua.globals().set("path", path)?;
    Ok(lua)
  }

  #[test]
  fn join_and_split() -> LuaResult<()> {
    let lua = create_test_lua()?;
    let joined: String = lua.load(r#"return path.join("a", "b", "c.txt")"#).eval()?;
    assert_eq!(joined, "a/b/c.txt");

    let dir: String = lua.load(r#"return path.dirname("a/b/c.txt")"#).eval()?;
    assert_eq!(dir, "a/b");
    let base: String = lua.load(r#"return path.basename("a/b/c.txt")"#).eval()?;
    assert_eq!(base, "c.txt");
    let ext: String = lua.load(r#"return path.extname("a/b/c.txt")"#).eval()?;
    assert_eq!(ext, ".txt");
    Ok(())
  }

  #[test]
  fn normalize_removes_dots() -> LuaResult<()> {
    let lua = create_test_lua()?;
    let normalized: String = lua.load(r#"return path.normalize("a/./b/../c")"#).eval()?;
    assert_eq!(normalized, "a/c");
    Ok(())
  }

  #[test]
  fn resolve_is_relative_to_declaring_directory() -> LuaResult<()> {
    let lua = create_test_lua()?;
    let resolved: String = lua.load(r#"return path.resolve("src", "../gen/x.c")"#).eval()?;
    assert_eq!(resolved, "/ws/pkg/gen/x.c");
    let absolute: String = lua.load(r#"return path.resolve("/tmp/y")"#).eval()?;
    assert_eq!(absolute, "/tmp/y");
    Ok(())
  }
}
