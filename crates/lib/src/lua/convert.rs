//! Conversion from Lua values to rule arguments.

use std::collections::BTreeMap;

use mlua::prelude::*;

use crate::consts::{CAPABILITY_TYPE, RULE_REF_TYPE, SPECIALIZATION_TYPE};
use crate::rule::{ArgValue, Capability, RuleArgs};

/// The `__type` marker of a handle table, if it has one.
pub fn handle_type(t: &LuaTable) -> Option<String> {
  t.metatable().and_then(|mt| mt.get::<String>("__type").ok())
}

/// Convert a Lua value to an argument value.
///
/// Handles primitives, arrays, string-keyed tables and the capability and rule handles
/// (detected via metatable `__type` field). An empty table converts to an empty array.
pub fn lua_value_to_arg(value: LuaValue) -> LuaResult<ArgValue> {
  match value {
    LuaValue::String(s) => Ok(ArgValue::String(s.to_str()?.to_string())),
    LuaValue::Number(n) => Ok(ArgValue::Number(n)),
    LuaValue::Integer(i) => Ok(ArgValue::Number(i as f64)),
    LuaValue::Boolean(b) => Ok(ArgValue::Boolean(b)),
    LuaValue::Table(t) => {
      match handle_type(&t).as_deref() {
        Some(CAPABILITY_TYPE) => return Ok(ArgValue::Capability(table_to_capability(&t)?)),
        Some(RULE_REF_TYPE) => return Ok(ArgValue::RuleRef(t.get("name")?)),
        Some(SPECIALIZATION_TYPE) => {
          return Err(LuaError::external(
            "a specialization cannot be used as a value; call it to declare a rule",
          ));
        }
        _ => {}
      }

      let len = t.raw_len();
      if len > 0 && !matches!(t.raw_get::<LuaValue>(1)?, LuaValue::Nil) {
        if t.pairs::<LuaValue, LuaValue>().count() != len {
          return Err(LuaError::external(
            "tables must be either lists or keyed maps, not both",
          ));
        }
        let mut items = Vec::with_capacity(len);
        for i in 1..=len {
          items.push(lua_value_to_arg(t.raw_get(i)?)?);
        }
        return Ok(ArgValue::Array(items));
      }

      let mut map = BTreeMap::new();
      for pair in t.pairs::<LuaValue, LuaValue>() {
        let (k, v) = pair?;
        let LuaValue::String(key) = k else {
          return Err(LuaError::external(format!(
            "table keys must be strings, got {}",
            k.type_name()
          )));
        };
        map.insert(key.to_str()?.to_string(), lua_value_to_arg(v)?);
      }
      if map.is_empty() {
        return Ok(ArgValue::Array(Vec::new()));
      }
      Ok(ArgValue::Table(map))
    }
    LuaValue::Nil => Err(LuaError::external("nil values not allowed in rule arguments")),
    _ => Err(LuaError::external(format!(
      "unsupported argument type: {}",
      value.type_name()
    ))),
  }
}

/// Convert the argument of a constructor or factory call.
///
/// Integer keys become positional arguments (in key order), string keys keyword arguments. A
/// bare string is a single positional argument and `nil` means no arguments.
pub fn lua_value_to_rule_args(value: LuaValue) -> LuaResult<RuleArgs> {
  let table = match value {
    LuaValue::Nil => return Ok(RuleArgs::new()),
    LuaValue::String(s) => return Ok(RuleArgs::new().with_positional(ArgValue::String(s.to_str()?.to_string()))),
    LuaValue::Table(t) if handle_type(&t).is_none() => t,
    other => {
      return Err(LuaError::external(format!(
        "rule arguments must be a table, got {}",
        other.type_name()
      )));
    }
  };

  let mut positional = Vec::new();
  let mut keywords = BTreeMap::new();
  for pair in table.pairs::<LuaValue, LuaValue>() {
    let (k, v) = pair?;
    match k {
      LuaValue::Integer(i) => positional.push((i, lua_value_to_arg(v)?)),
      LuaValue::String(s) => {
        keywords.insert(s.to_str()?.to_string(), lua_value_to_arg(v)?);
      }
      other => {
        return Err(LuaError::external(format!(
          "rule argument keys must be strings or integers, got {}",
          other.type_name()
        )));
      }
    }
  }
  positional.sort_by_key(|(i, _)| *i);

  Ok(RuleArgs {
    positional: positional.into_iter().map(|(_, v)| v).collect(),
    keywords,
  })
}

/// Read a capability back from its handle table.
pub fn table_to_capability(t: &LuaTable) -> LuaResult<Capability> {
  let name: String = t.get("name")?;
  let hint: Option<String> = t.get("hint")?;
  Ok(Capability { name, hint })
}

/// Build the Lua handle for a capability.
pub fn capability_to_lua(lua: &Lua, capability: &Capability) -> LuaResult<LuaTable> {
  let t = lua.create_table()?;
  t.set("name", capability.name.as_str())?;
  if let Some(hint) = &capability.hint {
    t.set("hint", hint.as_str())?;
  }

  let mt = lua.create_table()?;
  mt.set("__type", CAPABILITY_TYPE)?;
  mt.set(
    "__tostring",
    lua.create_function(|_, t: LuaTable| {
      let name: String = t.get("name")?;
      Ok(format!("capability({})", name))
    })?,
  )?;
  t.set_metatable(Some(mt))?;
  Ok(t)
}

/// Build the Lua handle returned by constructor calls.
pub fn rule_ref_to_lua(lua: &Lua, name: &str) -> LuaResult<LuaTable> {
  let t = lua.create_table()?;
  t.set("name", name)?;

  let mt = lua.create_table()?;
  mt.set("__type", RULE_REF_TYPE)?;
  mt.set(
    "__tostring",
    lua.create_function(|_, t: LuaTable| {
      let name: String = t.get("name")?;
      Ok(format!(":{}", name))
    })?,
  )?;
  t.set_metatable(Some(mt))?;
  Ok(t)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn eval_args(lua: &Lua, code: &str) -> LuaResult<RuleArgs> {
    let value: LuaValue = lua.load(code).eval()?;
    lua_value_to_rule_args(value)
  }

  #[test]
  fn integer_keys_are_positional_and_string_keys_are_keywords() -> LuaResult<()> {
    let lua = Lua::new();
    let args = eval_args(&lua, r#"return { "first", "second", name = "x", opt = 3, flag = true }"#)?;

    assert_eq!(args.positional, vec![ArgValue::from("first"), ArgValue::from("second")]);
    assert_eq!(args.get("name"), Some(&ArgValue::from("x")));
    assert_eq!(args.get("opt"), Some(&ArgValue::Number(3.0)));
    assert_eq!(args.get("flag"), Some(&ArgValue::Boolean(true)));
    Ok(())
  }

  #[test]
  fn nested_arrays_and_tables() -> LuaResult<()> {
    let lua = Lua::new();
    let args = eval_args(&lua, r#"return { srcs = { "a.c", "b.c" }, properties = { tier = "core" }, deps = {} }"#)?;

    assert_eq!(args.string_list("srcs").unwrap(), vec!["a.c", "b.c"]);
    assert_eq!(args.string_table("properties").unwrap()["tier"], "core");
    assert_eq!(args.get("deps"), Some(&ArgValue::Array(Vec::new())));
    Ok(())
  }

  #[test]
  fn nested_tables_cannot_mix_lists_and_keys() {
    let lua = Lua::new();
    let err = eval_args(&lua, r#"return { srcs = { "a.c", extra = "b.c" } }"#).unwrap_err();
    assert!(err.to_string().contains("not both"), "unexpected error: {err}");

    let err = eval_args(&lua, r#"return { properties = { "x", tier = "core" } }"#).unwrap_err();
    assert!(err.to_string().contains("not both"), "unexpected error: {err}");
  }

  #[test]
  fn handles_convert_to_their_arg_values() -> LuaResult<()> {
    let lua = Lua::new();
    let cap = capability_to_lua(&lua, &Capability::new("zlib").with_hint("third_party/zlib"))?;
    let rule = rule_ref_to_lua(&lua, "x")?;

    assert_eq!(
      lua_value_to_arg(LuaValue::Table(cap))?,
      ArgValue::Capability(Capability::new("zlib").with_hint("third_party/zlib"))
    );
    assert_eq!(lua_value_to_arg(LuaValue::Table(rule))?, ArgValue::RuleRef("x".to_string()));
    Ok(())
  }

  #[test]
  fn functions_are_rejected() {
    let lua = Lua::new();
    let result = eval_args(&lua, r#"return { cmd = function() end }"#);
    assert!(result.is_err());
  }

  #[test]
  fn bare_string_is_one_positional() -> LuaResult<()> {
    let lua = Lua::new();
    let args = eval_args(&lua, r#"return "x""#)?;
    assert_eq!(args.declared_name(), Some("x"));
    Ok(())
  }
}
