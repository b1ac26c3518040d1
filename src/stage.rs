//! Stage executor (§4.G).
//!
//! Expands a stage's `loopvars` into one or more `(context, suffix)` pairs,
//! renders `script` in shell mode for each, runs it through the default
//! shell, and interprets the exit code as a bitmask. Never panics and never
//! aborts the row loop itself — results are reported through `StageOutcome`
//! per the typed-result dispatch in §9 Design Notes, so the pipeline decides
//! what "next stage" or "next row" means.

use crate::manifest::{LabelValue, ManifestRow};
use crate::suite::StageSpec;
use serde_json::Value;
use std::path::Path;
use std::process::Command;

/// What the row loop should do after a stage has run.
pub enum StageOutcome {
    /// Ran to completion (individual script failures, if any, are already
    /// folded into `row.failures`); proceed to the next stage.
    Continue,
    /// Loopvars were missing/mistyped/mismatched, or a script's template
    /// failed to render; the failure is already recorded. Proceed to the
    /// next stage anyway.
    StageFailed(String),
    /// A script set exit bit 16. The row has been marked filtered; the
    /// caller must stop running stages for this row.
    EndStages(String),
}

fn describe(ecode: i64) -> String {
    if ecode < 0 {
        return "invalid_or_unset".to_string();
    }
    let mut msgs = Vec::new();
    msgs.push(if ecode & 1 != 0 { "failure" } else { "success" }.to_string());
    if ecode & 2 != 0 {
        msgs.push("inaccessible_file".to_string());
    }
    if ecode & 4 != 0 {
        msgs.push("bad_argument".to_string());
    }
    if ecode & 8 != 0 {
        msgs.push("warning_logged".to_string());
    }
    if ecode & 16 != 0 {
        msgs.push("skip_manifest_row".to_string());
    }
    msgs.join(",")
}

/// Build the `(context, suffix)` pairs for one stage invocation.
fn expand_loopvars(
    row: &ManifestRow,
    loopvars: &[String],
) -> Result<Vec<(Value, String)>, String> {
    if loopvars.is_empty() {
        return Ok(vec![(row.to_context(), String::new())]);
    }

    let mut lists: Vec<&Vec<Option<String>>> = Vec::with_capacity(loopvars.len());
    for v in loopvars {
        match row.get_label(v) {
            Some(LabelValue::List(items)) => lists.push(items),
            Some(_) => {
                return Err(format!(
                    "loopvar '{v}' exists but is not a multi-valued label"
                ))
            }
            None => return Err(format!("loopvar '{v}' does not exist on this row")),
        }
    }
    let n = lists[0].len();
    if lists.iter().any(|l| l.len() != n) {
        return Err(format!(
            "loopvars {loopvars:?} do not share the same length"
        ));
    }

    let base = row.to_context();
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let mut ctx = base.clone();
        if let Value::Object(map) = &mut ctx {
            for (v, list) in loopvars.iter().zip(lists.iter()) {
                let elem = match &list[i] {
                    Some(s) => Value::String(s.clone()),
                    None => Value::Null,
                };
                map.insert(v.clone(), elem);
            }
        }
        out.push((ctx, format!(".{i}")));
    }
    Ok(out)
}

fn merge_contexts(row_ctx: &Value, global_ctx: &Value) -> Value {
    let mut merged = global_ctx.clone();
    if let (Value::Object(dst), Value::Object(src)) = (&mut merged, row_ctx) {
        for (k, v) in src {
            dst.insert(k.clone(), v.clone());
        }
    }
    merged
}

/// Run one stage against `row`. `workdir`/`manifest_id`/`stage_name` locate
/// the output directory for each invocation.
pub fn run_stage(
    stage_name: &str,
    spec: &StageSpec,
    row: &mut ManifestRow,
    global_ctx: &Value,
    workdir: &Path,
    manifest_id: &str,
) -> StageOutcome {
    let pairs = match expand_loopvars(row, &spec.loopvars) {
        Ok(pairs) => pairs,
        Err(reason) => {
            let msg = format!("Stage '{stage_name}': {reason}");
            row.failures.push(msg.clone());
            return StageOutcome::StageFailed(msg);
        }
    };

    for (row_ctx, suffix) in pairs {
        let context = merge_contexts(&row_ctx, global_ctx);

        let script = match crate::template::render_template_string(&spec.script, &context, true) {
            Ok(s) => s,
            Err(e) => {
                let msg = format!("Stage '{stage_name}{suffix}': {e}");
                row.failures.push(msg.clone());
                continue;
            }
        };

        let out_dir = workdir.join(manifest_id).join(format!("{stage_name}{suffix}"));
        if let Err(e) = std::fs::create_dir_all(&out_dir) {
            let msg = format!("Stage '{stage_name}{suffix}': could not create output dir: {e}");
            row.failures.push(msg.clone());
            continue;
        }

        let output = match Command::new("sh").arg("-c").arg(&script).output() {
            Ok(o) => o,
            Err(e) => {
                let msg = format!("Stage '{stage_name}{suffix}': failed to spawn shell: {e}");
                row.failures.push(msg.clone());
                continue;
            }
        };

        if let Err(e) = std::fs::write(out_dir.join("stdout.txt"), &output.stdout) {
            row.failures
                .push(format!("Stage '{stage_name}{suffix}': could not write stdout.txt: {e}"));
        }
        if let Err(e) = std::fs::write(out_dir.join("stderr.txt"), &output.stderr) {
            row.failures
                .push(format!("Stage '{stage_name}{suffix}': could not write stderr.txt: {e}"));
        }

        let ecode = output.status.code().unwrap_or(-1) as i64;
        let desc = describe(ecode);
        if let Err(e) = std::fs::write(
            out_dir.join(format!("ecode.{ecode}")),
            format!("{ecode} = {desc}\n"),
        ) {
            row.failures
                .push(format!("Stage '{stage_name}{suffix}': could not write ecode file: {e}"));
        }

        if ecode >= 0 && ecode % 2 == 1 {
            row.failures.push(format!(
                "Stage '{stage_name}{suffix}' exited {ecode} ({desc})"
            ));
        }

        if ecode & 16 != 0 {
            let reason = format!("Stage '{stage_name}{suffix}' set exit bit 16 ({desc})");
            row.filtered = reason.clone();
            return StageOutcome::EndStages(reason);
        }
    }

    StageOutcome::Continue
}
