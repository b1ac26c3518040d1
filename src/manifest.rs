//! Manifest (§4.D, §3 ManifestRow).
//!
//! Loads a CSV manifest into ordered rows that accumulate processing state
//! (filtered/ignored/failures/associated) plus dynamically-added label keys
//! as the pipeline runs.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;

/// The value a match label can hold once the matcher has run.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelValue {
    Null,
    Path(String),
    List(Vec<Option<String>>),
}

impl LabelValue {
    pub fn as_json(&self) -> Value {
        match self {
            LabelValue::Null => Value::Null,
            LabelValue::Path(p) => Value::String(p.clone()),
            LabelValue::List(items) => Value::Array(
                items
                    .iter()
                    .map(|i| match i {
                        Some(p) => Value::String(p.clone()),
                        None => Value::Null,
                    })
                    .collect(),
            ),
        }
    }

    pub fn as_csv_field(&self) -> String {
        match self {
            LabelValue::Null => String::new(),
            LabelValue::Path(p) => p.clone(),
            LabelValue::List(items) => serde_json::to_string(&self.as_json()).unwrap_or_default(),
        }
    }
}

/// One manifest row: the original CSV columns (order preserved), plus any
/// match labels added by the file matcher, plus processing state.
#[derive(Debug, Clone, Default)]
pub struct ManifestRow {
    columns: Vec<(String, String)>,
    labels: Vec<(String, LabelValue)>,
    /// Rendered once per row by the pipeline from the suite's `id`
    /// template; empty until then.
    pub manifest_id: String,
    pub filtered: String,
    pub ignored: bool,
    pub failures: Vec<String>,
    pub associated: Vec<String>,
}

impl ManifestRow {
    pub fn new(headers: &[String], values: &[String]) -> Self {
        ManifestRow {
            columns: headers.iter().cloned().zip(values.iter().cloned()).collect(),
            labels: Vec::new(),
            manifest_id: String::new(),
            filtered: String::new(),
            ignored: false,
            failures: Vec::new(),
            associated: Vec::new(),
        }
    }

    pub fn skipped(&self) -> bool {
        !self.filtered.is_empty() || self.ignored
    }

    pub fn headers(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|(k, _)| k.clone())
            .chain(self.labels.iter().map(|(k, _)| k.clone()))
            .collect()
    }

    pub fn values(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|(_, v)| v.clone())
            .chain(self.labels.iter().map(|(_, v)| v.as_csv_field()))
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_label(&self, key: &str) -> Option<&LabelValue> {
        self.labels.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn set_label(&mut self, key: &str, value: LabelValue) {
        if let Some(entry) = self.labels.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value;
        } else {
            self.labels.push((key.to_string(), value));
        }
    }

    /// Build the template/condition context: all columns plus all labels,
    /// as a flat JSON object.
    pub fn to_context(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (k, v) in &self.columns {
            map.insert(k.clone(), Value::String(v.clone()));
        }
        for (k, v) in &self.labels {
            map.insert(k.clone(), v.as_json());
        }
        Value::Object(map)
    }
}

/// The loaded manifest CSV: headers plus ordered rows.
pub struct Manifest {
    pub headers: Vec<String>,
    rows: Vec<ManifestRow>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .with_context(|| format!("Unable to open manifest - file missing: {}", path.display()))?;

        let headers: Vec<String> = reader
            .headers()
            .context("CSV: failed to read headers")?
            .iter()
            .map(|s| s.to_string())
            .collect();

        let mut rows = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("CSV: error on row {}", idx + 2))?;
            if record.len() != headers.len() {
                bail!(
                    "Column count in row {} does not match header",
                    idx + 2
                );
            }
            let values: Vec<String> = record.iter().map(|s| s.to_string()).collect();
            rows.push(ManifestRow::new(&headers, &values));
        }

        Ok(Manifest { headers, rows })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManifestRow> {
        self.rows.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ManifestRow> {
        self.rows.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows that are not skipped (neither filtered nor ignored).
    pub fn selected(&self) -> usize {
        self.rows.iter().filter(|r| !r.skipped()).count()
    }

    /// Count rows matching the given filtered/ignored predicate combination.
    pub fn skipped_count(&self, filtered: Option<bool>, ignored: Option<bool>) -> usize {
        self.rows
            .iter()
            .filter(|r| {
                filtered.map(|f| !r.filtered.is_empty() == f).unwrap_or(true)
                    && ignored.map(|i| r.ignored == i).unwrap_or(true)
            })
            .count()
    }

    /// The widest row's header set (so dynamically-added labels become
    /// manifest.csv columns); falls back to the original CSV headers when
    /// the manifest has no rows.
    pub fn widest_headers(&self) -> Vec<String> {
        self.rows
            .iter()
            .max_by_key(|r| r.headers().len())
            .map(|r| r.headers())
            .unwrap_or_else(|| self.headers.clone())
    }
}
