//! Suite (§4.E, §3 Suite shape).
//!
//! Loads and validates the suite YAML document, the natural Rust
//! equivalent of the original's cerberus schema wiring (§A.7): the
//! `serde_yaml`/`serde` deserialization into strongly-typed structs *is*
//! the validation — a malformed document fails to deserialize and
//! surfaces as a Configuration error.

use crate::condition::Condition;
use anyhow::{bail, Context, Result};
use serde::Deserialize;

fn default_value() -> String {
    "{{ file.name }}".to_string()
}

/// One entry of `manifest.filter`: a templated value plus comparators.
#[derive(Debug, Clone, Deserialize)]
pub struct FilterCondition {
    pub value: String,
    #[serde(flatten)]
    pub condition: Condition,
}

/// One entry of `manifest.files`: a templated value, comparators, plus the
/// matcher-specific flags (label/multiple/optional/linkedto).
#[derive(Debug, Clone, Deserialize)]
pub struct FileMatch {
    pub label: String,
    #[serde(default = "default_value")]
    pub value: String,
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub optional: bool,
    pub linkedto: Option<String>,
    #[serde(flatten)]
    pub condition: Condition,
}

#[derive(Debug, Clone, Deserialize)]
struct ManifestSpec {
    id: String,
    #[serde(default)]
    filter: Vec<FilterCondition>,
    files: Vec<FileMatch>,
}

/// One stage: a script template plus optional loopvars.
#[derive(Debug, Clone, Deserialize)]
pub struct StageSpec {
    pub script: String,
    #[serde(default)]
    pub loopvars: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawSuite {
    manifest: ManifestSpec,
    stages: serde_yaml::Value,
}

/// The validated suite document.
pub struct Suite {
    manifest_id_tpl: String,
    filters: Vec<FilterCondition>,
    files: Vec<FileMatch>,
    stages: Vec<(String, StageSpec)>,
}

impl Suite {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let raw_text = std::fs::read_to_string(path)
            .with_context(|| format!("Unable to open suite - file missing: {}", path.display()))?;
        let raw: RawSuite = serde_yaml::from_str(&raw_text)
            .with_context(|| "Unable to parse suite -- invalid YAML or structure.".to_string())?;

        if raw.manifest.files.is_empty() {
            bail!("Invalid suite structure: manifest.files must be non-empty");
        }

        let mapping = raw
            .stages
            .as_mapping()
            .ok_or_else(|| anyhow::anyhow!("Invalid suite structure: stages must be a mapping"))?;
        if mapping.is_empty() {
            bail!("Invalid suite structure: stages must contain at least one stage");
        }
        let mut stages = Vec::with_capacity(mapping.len());
        for (key, value) in mapping {
            let name = key
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("Invalid suite structure: stage name must be a string"))?
                .to_string();
            let spec: StageSpec = serde_yaml::from_value(value.clone())
                .with_context(|| format!("Invalid suite structure: stage `{name}`"))?;
            stages.push((name, spec));
        }

        Ok(Suite {
            manifest_id_tpl: raw.manifest.id,
            filters: raw.manifest.filter,
            files: raw.manifest.files,
            stages,
        })
    }

    /// Render the id template against `row` and sanitize it into a safe
    /// directory component by replacing `/` with `_`.
    pub fn manifest_id(&self, row_ctx: &serde_json::Value) -> crate::error::Result<String> {
        let rendered = crate::template::render_template_string(&self.manifest_id_tpl, row_ctx, false)?;
        Ok(rendered.replace('/', "_"))
    }

    /// Returns the first failing filter's stringified representation, or
    /// an empty string if every filter matches (or there are none).
    pub fn filter(&self, row_ctx: &serde_json::Value) -> crate::error::Result<String> {
        for fc in &self.filters {
            if !crate::condition::value_match(&fc.value, &fc.condition, row_ctx)? {
                return Ok(format!(
                    "Filter did not match: value=\"{}\" condition={:?}",
                    fc.value, fc.condition
                ));
            }
        }
        Ok(String::new())
    }

    pub fn files(&self) -> &[FileMatch] {
        &self.files
    }

    /// Stages in declaration order.
    pub fn stages(&self) -> impl Iterator<Item = &(String, StageSpec)> {
        self.stages.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_suite(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_basic_suite() {
        let f = write_suite(
            r#"
manifest:
  id: "{{ id }}"
  filter:
    - value: "{{ kind }}"
      equals: "a"
  files:
    - label: doc
      endswith: ".pdf"
stages:
  build:
    script: "echo hi"
"#,
        );
        let suite = Suite::load(f.path()).unwrap();
        assert_eq!(suite.files().len(), 1);
        assert_eq!(suite.stages().count(), 1);
    }

    #[test]
    fn empty_files_rejected() {
        let f = write_suite(
            r#"
manifest:
  id: "{{ id }}"
  files: []
stages:
  build:
    script: "echo hi"
"#,
        );
        assert!(Suite::load(f.path()).is_err());
    }

    #[test]
    fn stage_order_is_preserved() {
        let f = write_suite(
            r#"
manifest:
  id: "{{ id }}"
  files:
    - label: doc
      endswith: ".pdf"
stages:
  early:
    script: "echo 1"
  late:
    script: "echo 2"
"#,
        );
        let suite = Suite::load(f.path()).unwrap();
        let names: Vec<&str> = suite.stages().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["early", "late"]);
    }

    #[test]
    fn manifest_id_sanitizes_slashes() {
        let f = write_suite(
            r#"
manifest:
  id: "{{ a }}/{{ b }}"
  files:
    - label: doc
      endswith: ".pdf"
stages:
  build:
    script: "echo hi"
"#,
        );
        let suite = Suite::load(f.path()).unwrap();
        let ctx = serde_json::json!({"a": "x", "b": "y"});
        assert_eq!(suite.manifest_id(&ctx).unwrap(), "x_y");
    }
}
