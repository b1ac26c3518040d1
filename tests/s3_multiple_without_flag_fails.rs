//! S3 — multiple without flag fails (spec §8).

mod support;

use colophon::directory::Directory;
use colophon::manifest::Manifest;
use colophon::pipeline::Context;
use colophon::suite::Suite;
use serde_json::json;

#[test]
fn two_logs_both_associate_but_matcher_records_failure() {
    let config = support::tempdir();
    let source = support::tempdir();
    let workdir = support::tempdir();

    support::write_source_file(&source, "a.log", "a");
    support::write_source_file(&source, "b.log", "b");

    let manifest_path = support::write_manifest(&config, "id\n1\n");
    let suite_path = support::write_suite(
        &config,
        r#"
manifest:
  id: "{{ id }}"
  files:
    - label: x
      endswith: ".log"
stages:
  noop:
    script: "true"
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
    assert_eq!(code, 2);

    let row = ctx.manifest.iter().next().unwrap();
    assert_eq!(row.failures.len(), 1);
    assert!(row.failures[0].contains("only a single file match was allowed"));
    assert!(ctx.directory.get("a.log").unwrap().associated == "1");
    assert!(ctx.directory.get("b.log").unwrap().associated == "1");
}
