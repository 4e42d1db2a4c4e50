use std::fs;
use std::time::Duration;

use b3_lib::EngineError;
use b3_lib::engine::RuleFailure;
use b3_lib::execute::ExecuteError;

use super::common::{Tree, targets};

#[tokio::test]
async fn shared_dependency_runs_once_per_session() {
  let tree = Tree::new();
  let counter = tree.root().join("counter");
  tree.write(
    "BUILD",
    &format!(
      r#"
      local counter = "{counter}"
      genrule {{ name = "shared", cmd = "echo x >> " .. counter }}
      genrule {{ name = "a", cmd = "true", deps = {{ ":shared" }} }}
      genrule {{ name = "b", cmd = "true", deps = {{ ":shared" }} }}
      "#,
      counter = counter.display()
    ),
  );
  let mut engine = tree.engine();

  let first = engine.build(&targets(&[":a", ":b"]), &[]).await.unwrap();
  assert!(first.success(), "{first}");
  assert_eq!(first.built.len(), 3);

  let second = engine.build(&targets(&[":a", ":b"]), &[]).await.unwrap();
  assert!(second.built.is_empty());
  assert_eq!(second.up_to_date.len(), 3);

  assert_eq!(fs::read_to_string(&counter).unwrap(), "x\n");
}

#[tokio::test]
async fn failing_rule_only_affects_its_dependents() {
  let tree = Tree::new();
  tree.write(
    "bad/BUILD",
    r#"genrule { name = "bad", cmd = "echo broken >&2; exit 3" }"#,
  );
  tree.write(
    "app/BUILD",
    r#"
    genrule { name = "app", cmd = "true", deps = { "//bad" } }
    genrule { name = "tool", cmd = "touch $OUT/tool", outs = { "tool" } }
    "#,
  );
  let mut engine = tree.engine();

  let report = engine.build(&targets(&["app", "app:tool"]), &[]).await.unwrap();

  assert_eq!(report.failed.len(), 1);
  match &report.failed[0].error {
    RuleFailure::Execute(ExecuteError::CmdFailed { code, stderr, .. }) => {
      assert_eq!(*code, Some(3));
      assert!(stderr.contains("broken"));
    }
    other => panic!("unexpected failure: {other}"),
  }
  assert_eq!(report.skipped.len(), 1);
  assert_eq!(report.skipped[0].label, "//app:app");
  assert_eq!(report.built.len(), 1);
  assert!(report.built[0].outputs[0].is_file());
}

#[tokio::test]
async fn fileset_copies_sources_into_the_output_tree() {
  let tree = Tree::new();
  tree.write("assets/img/logo.txt", "logo");
  tree.write("assets/readme.txt", "readme");
  tree.write(
    "assets/BUILD",
    r#"fileset { name = "assets", srcs = { "img/logo.txt", "readme.txt" } }"#,
  );
  let mut engine = tree.engine();

  let report = engine.build(&targets(&["assets"]), &[]).await.unwrap();
  assert!(report.success(), "{report}");

  let out = engine.config().out_dir().join("assets/assets");
  assert_eq!(fs::read_to_string(out.join("img/logo.txt")).unwrap(), "logo");
  assert_eq!(fs::read_to_string(out.join("readme.txt")).unwrap(), "readme");
}

#[tokio::test]
async fn slow_actions_time_out() {
  let tree = Tree::new();
  tree.write("BUILD", r#"genrule { name = "slow", cmd = "sleep 5" }"#);
  let mut config = tree.config();
  config.action_timeout = Some(Duration::from_millis(200));
  let mut engine = b3_lib::Engine::new(config).unwrap();

  let report = engine.build(&targets(&[":slow"]), &[]).await.unwrap();
  assert!(matches!(
    report.failed[0].error,
    RuleFailure::Execute(ExecuteError::Timeout { .. })
  ));
}

#[tokio::test]
async fn consumer_without_matching_candidate_is_rejected() {
  let tree = Tree::new();
  tree.write(
    "BUILD",
    r#"
    go_library_factory("codec", { srcs = { "codec.go" } })
    rust_binary { name = "app", srcs = { "main.rs" }, deps = { capability("codec") } }
    "#,
  );
  let mut engine = tree.engine();

  let err = engine.build(&targets(&[":app"]), &[]).await.unwrap_err();
  match err {
    EngineError::UnresolvedFork { consumer, language, .. } => {
      assert_eq!(consumer, "//:app");
      assert_eq!(language.as_deref(), Some("rust"));
    }
    other => panic!("unexpected error: {other}"),
  }
}
