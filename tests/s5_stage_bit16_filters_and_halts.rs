//! S5 — stage exit bit 16 filters and halts stages (spec §8).

mod support;

use colophon::directory::Directory;
use colophon::manifest::Manifest;
use colophon::pipeline::Context;
use colophon::suite::Suite;
use serde_json::json;

#[test]
fn early_stage_bit16_skips_late_stage_and_is_reported_as_skipped() {
    let config = support::tempdir();
    let source = support::tempdir();
    let workdir = support::tempdir();

    let manifest_path = support::write_manifest(&config, "id\n1\n");
    let suite_path = support::write_suite(
        &config,
        r#"
manifest:
  id: "{{ id }}"
  files:
    - label: doc
      optional: true
      endswith: ".pdf"
stages:
  early:
    script: "exit 16"
  late:
    script: "touch late-ran.txt"
"#,
    );

    let mut ctx = Context {
        directory: Directory::load(source.path()).unwrap(),
        manifest: Manifest::load(&manifest_path).unwrap(),
        suite: Suite::load(&suite_path).unwrap(),
        workdir: workdir.path().to_path_buf(),
        global_context: json!({}),
        strict: false,
        ignore_missing: false,
    };
    let code = ctx.run().unwrap();
    assert_eq!(code, 0);

    let row = ctx.manifest.iter().next().unwrap();
    assert!(row.filtered.contains("early"));

    let late_dir = workdir.path().join("1").join("late");
    assert!(!late_dir.exists(), "late stage must not have run");

    let summary = support::read_summary(workdir.path());
    assert!(summary["skipped"]
        .as_array()
        .unwrap()
        .iter()
        .any(|v| v == "1"));
    assert!(summary["rows"]["1"]["skipped-because"]
        .as_str()
        .unwrap()
        .contains("early"));
}
