use b3_lib::{EngineError, WorkspaceError};

use super::common::{Tree, targets};

#[test]
fn sibling_files_declare_into_one_package() {
  let tree = Tree::new();
  tree.write("a/BUILD", r#"cc_library { name = "x", srcs = { "x.c" } }"#);
  tree.write("a/BUILD.extras", r#"java_library { name = "x2", srcs = { "X2.java" } }"#);
  let mut engine = tree.engine();

  let ids = engine.resolve(&targets(&["a:x", "a:x2"])).unwrap();
  let labels: Vec<String> = ids.iter().map(|id| engine.workspace().rule(*id).unwrap().label()).collect();
  assert_eq!(labels, ["//a:x", "//a:x2"]);

  let x2 = engine.workspace().rule(ids[1]).unwrap();
  assert_eq!(x2.source().unwrap().file_name(), "BUILD.extras");
  assert_eq!(x2.language(), Some("java"));
  assert_eq!(engine.workspace().families_parsed(), 1);
}

#[test]
fn sibling_redeclaring_an_address_conflicts() {
  let tree = Tree::new();
  tree.write("a/BUILD", r#"cc_library { name = "x", srcs = { "x.c" } }"#);
  tree.write(
    "a/BUILD.extras",
    r#"
    java_library { name = "x2", srcs = { "X2.java" } }
    cc_library { name = "x", srcs = { "other.c" } }
    "#,
  );
  let mut engine = tree.engine();

  let err = engine.resolve(&targets(&["a:x"])).unwrap_err();
  assert!(
    matches!(err, EngineError::Workspace(WorkspaceError::AddressConflict { .. })),
    "unexpected error: {err}"
  );
}

#[test]
fn plan_orders_dependencies_first() {
  let tree = Tree::new();
  tree.write("base/BUILD", r#"cc_library { name = "base", srcs = { "base.c" } }"#);
  tree.write(
    "app/BUILD",
    r#"
    cc_library { name = "util", srcs = { "util.c" }, deps = { "//base" } }
    cc_binary { name = "app", srcs = { "main.c" }, deps = { ":util", "//base" } }
    "#,
  );
  let mut engine = tree.engine();

  let plan = engine.prepare(&targets(&["app"])).unwrap();
  let order: Vec<String> = plan
    .order()
    .map(|id| engine.workspace().rule(id).unwrap().label())
    .collect();
  assert_eq!(order, ["//base:base", "//app:util", "//app:app"]);
  assert_eq!(plan.waves.len(), 3);
}

#[test]
fn compiled_statements_are_cached_next_to_the_build_file() {
  let tree = Tree::new();
  tree.write("lib/BUILD", r#"genrule { name = "lib", cmd = "true" }"#);

  let mut engine = tree.engine();
  engine.resolve(&targets(&["lib"])).unwrap();
  assert!(tree.root().join("lib/.b3cache/BUILD.json").is_file());

  // A fresh engine resolves the same rules from the cache.
  let mut again = tree.engine();
  let ids = again.resolve(&targets(&["lib"])).unwrap();
  assert_eq!(again.workspace().rule(ids[0]).unwrap().label(), "//lib:lib");
}

#[test]
fn disabling_the_cache_writes_nothing() {
  let tree = Tree::new();
  tree.write("lib/BUILD", r#"genrule { name = "lib", cmd = "true" }"#);

  let mut config = tree.config();
  config.use_cache = false;
  let mut engine = b3_lib::Engine::new(config).unwrap();
  engine.resolve(&targets(&["lib"])).unwrap();
  assert!(!tree.root().join("lib/.b3cache").exists());
}

#[test]
fn fork_specializations_are_instantiated_for_consumers() {
  let tree = Tree::new();
  tree.write(
    "third_party/BUILD",
    r#"
    cc_library_factory("zlib", { srcs = { "zlib.c" } })
    java_library_factory("zlib", { srcs = { "Zlib.java" } })
    "#,
  );
  tree.write(
    "app/BUILD",
    r#"
    cc_binary { name = "app", srcs = { "main.c" }, deps = { capability("zlib", "//third_party") } }
    "#,
  );
  let mut engine = tree.engine();

  let plan = engine.prepare(&targets(&["app"])).unwrap();
  let labels: Vec<String> = plan
    .order()
    .map(|id| engine.workspace().rule(id).unwrap().label())
    .collect();
  assert_eq!(labels, ["//third_party:zlib_cc_library", "//app:app"]);

  let fork = engine.workspace().fork("zlib").unwrap();
  assert_eq!(engine.workspace().dependencies(fork).len(), 2);
}
