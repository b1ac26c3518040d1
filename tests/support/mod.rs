//! Shared fixtures for the end-to-end scenario tests (spec §8).

use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn tempdir() -> tempfile::TempDir {
    tempfile::tempdir().unwrap()
}

pub fn write_manifest(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("manifest.csv");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
}

pub fn write_suite(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("suite.yaml");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
}

pub fn write_source_file(dir: &tempfile::TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

pub fn read_summary(workdir: &Path) -> Value {
    let raw = std::fs::read_to_string(workdir.join("summary.json")).unwrap();
    serde_json::from_str(&raw).unwrap()
}

pub fn read_ignored(workdir: &Path) -> Value {
    let raw = std::fs::read_to_string(workdir.join("ignored.json")).unwrap();
    serde_json::from_str(&raw).unwrap()
}
