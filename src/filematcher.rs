//! File matcher (§4.F) — the hardest subsystem.
//!
//! For one row and one filematch spec, resolves zero or more files onto a
//! label, handling the `optional`/`multiple`/`linkedto` switches. Never
//! raises: every failure (precondition violation, double-association,
//! postcondition violation) is appended to a returned failure list, folded
//! by the caller into the row's failures.

use crate::directory::Directory;
use crate::manifest::{LabelValue, ManifestRow};
use crate::suite::FileMatch;
use serde_json::Value;

pub struct MatchOutcome {
    pub files_matched: usize,
    pub failures: Vec<String>,
}

fn append_label(row: &mut ManifestRow, label: &str, fpath: Option<&str>, multiple: bool) {
    if multiple {
        let mut items = match row.get_label(label) {
            Some(LabelValue::List(items)) => items.clone(),
            _ => Vec::new(),
        };
        items.push(fpath.map(|s| s.to_string()));
        row.set_label(label, LabelValue::List(items));
    } else {
        match fpath {
            Some(p) => row.set_label(label, LabelValue::Path(p.to_string())),
            None => row.set_label(label, LabelValue::Null),
        }
    }
}

/// Evaluate the spec's condition against `context` (which carries the
/// current candidate file under `file`). When the spec declares no
/// comparator at all, fall back to an implicit equality between the
/// rendered `value` and the candidate's own name — otherwise a bare
/// `value:` with no comparator would match every file in the directory
/// (per §4.B, an empty condition set is vacuously true), which would make
/// `linkedto` value-templates (e.g. `{{ roots | basename }}.side`) useless
/// for picking out a specific file.
fn evaluate(spec: &FileMatch, context: &Value) -> crate::error::Result<bool> {
    if spec.condition.is_empty() {
        let rendered = crate::template::render_template_string(&spec.value, context, false)?;
        let file_name = context
            .get("file")
            .and_then(|f| f.get("name"))
            .and_then(|v| v.as_str())
            .unwrap_or("");
        Ok(rendered == file_name)
    } else {
        crate::condition::value_match(&spec.value, &spec.condition, context)
    }
}

/// Run the matcher for `spec` against `row`, associating files in
/// `directory` as they match.
pub fn process_file_match(
    row: &mut ManifestRow,
    spec: &FileMatch,
    directory: &mut Directory,
    manifest_id: &str,
) -> MatchOutcome {
    let mut failures = Vec::new();
    let label = spec.label.as_str();

    let mut linked_items: Option<Vec<Option<String>>> = None;
    if let Some(l) = &spec.linkedto {
        match row.get_label(l) {
            None => failures.push(format!(
                "Suite manifest.files has 'linkedto: {l}', a field which does not exist."
            )),
            Some(LabelValue::List(items)) => linked_items = Some(items.clone()),
            Some(_) => failures.push(format!(
                "Suite manifest.files has 'linkedto: {l}', but '{l}' does not have 'multiple: true' set."
            )),
        }
    }

    let effective_multiple = spec.multiple || linked_items.is_some();

    if row.get_label(label).is_none() {
        row.set_label(
            label,
            if effective_multiple {
                LabelValue::List(Vec::new())
            } else {
                LabelValue::Null
            },
        );
    }

    let link_indices: Vec<Option<usize>> = match &linked_items {
        Some(items) => (0..items.len()).map(Some).collect(),
        None => vec![None],
    };

    let base_ctx = row.to_context();
    let filepaths: Vec<(String, Value)> = directory
        .iter()
        .map(|(p, info)| (p.clone(), info.to_context()))
        .collect();

    let mut matched: Vec<Option<String>> = Vec::new();

    'outer: for link_idx in &link_indices {
        let mut entry_ctx = base_ctx.clone();
        if let (Some(idx), Some(l)) = (link_idx, &spec.linkedto) {
            let item_val = linked_items.as_ref().unwrap()[*idx]
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null);
            if let Value::Object(map) = &mut entry_ctx {
                map.insert(l.clone(), item_val);
            }
        }

        let mut linked_filepath: Option<String> = None;

        for (fpath, file_ctx) in &filepaths {
            let mut context = entry_ctx.clone();
            if let Value::Object(map) = &mut context {
                map.insert("file".to_string(), file_ctx.clone());
            }

            match evaluate(spec, &context) {
                Ok(true) => {
                    if directory.associate(fpath, manifest_id) {
                        row.associated.push(fpath.clone());
                    } else {
                        failures.push(format!(
                            "Manifest(id={manifest_id}) matched an already associated file: {fpath}"
                        ));
                    }

                    if let Some(idx) = link_idx {
                        if let Some(prev) = &linked_filepath {
                            failures.push(format!(
                                "Manifest(id={manifest_id}) matched multiple files for linked '{label}' at index {idx}; previously matched: {prev}; ignoring additional match: {fpath}"
                            ));
                        } else {
                            linked_filepath = Some(fpath.clone());
                        }
                    } else {
                        append_label(row, label, Some(fpath), effective_multiple);
                        matched.push(Some(fpath.clone()));
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    failures.push(format!(
                        "Manifest(id={manifest_id}) could not render file-match value for '{label}': {e}"
                    ));
                    break 'outer;
                }
            }
        }

        // One linked index contributes exactly one slot to `row[label]`,
        // keeping it positionally aligned with `row[L]` — `null` when no
        // file matched this index, even if duplicates were found and
        // rejected above.
        if link_idx.is_some() {
            append_label(row, label, linked_filepath.as_deref(), effective_multiple);
            matched.push(linked_filepath.clone());
        }
    }

    let files_matched = matched.len();

    if files_matched == 0 && !spec.optional && linked_items.is_none() {
        failures.push(format!(
            "Manifest(id={manifest_id}) was required to match a file for label '{label}', but no matching files were found."
        ));
    }

    if let Some(items) = &linked_items {
        if !spec.optional && matched.iter().any(|m| m.is_none()) {
            let l = spec.linkedto.as_ref().unwrap();
            let pairs: Vec<String> = items
                .iter()
                .zip(matched.iter())
                .map(|(src, m)| {
                    format!(
                        "{}: {}",
                        src.as_deref().unwrap_or("null"),
                        m.as_deref().unwrap_or("null")
                    )
                })
                .collect();
            failures.push(format!(
                "Manifest(id={manifest_id}) was required and 'linkedto: {l}' for label '{label}', but not all linked files were found:\n - {}",
                pairs.join("\n - ")
            ));
        }
    }

    if files_matched > 1 && !effective_multiple {
        let listed: Vec<String> = matched.iter().filter_map(|m| m.clone()).collect();
        failures.push(format!(
            "Manifest(id={manifest_id}) matched multiple files for '{label}' where only a single file match was allowed:\n - {}",
            listed.join("\n - ")
        ));
    }

    MatchOutcome {
        files_matched,
        failures,
    }
}
