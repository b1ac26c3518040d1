//! Reporter (§4.I).
//!
//! Writes the three output artifacts under `workdir` and computes the
//! process exit code. Row classification (succeeded/failed/skipped/ignored)
//! is derived here rather than tracked incrementally, so the reporter is
//! the single place that has to agree with §8's invariant 4.

use crate::manifest::Manifest;
use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Count the `ecode.<N>` files written under `<workdir>/<manifest_id>/` by
/// every stage invocation for this row, keyed by the code as a string. The
/// description is read back out of the file's own `"<N> = <desc>"` content
/// rather than recomputed, so it can never drift from what `stage.rs` wrote.
fn ecode_counts(workdir: &Path, manifest_id: &str) -> BTreeMap<String, (u64, String)> {
    let mut counts = BTreeMap::new();
    if manifest_id.is_empty() {
        return counts;
    }
    let dir = workdir.join(manifest_id);
    if !dir.is_dir() {
        return counts;
    }
    let Ok(files) = walk_files(&dir) else {
        return counts;
    };
    for path in files {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(n) = name.strip_prefix("ecode.") else {
            continue;
        };
        let desc = std::fs::read_to_string(&path)
            .ok()
            .and_then(|c| c.splitn(2, " = ").nth(1).map(|d| d.trim().to_string()))
            .unwrap_or_default();
        let entry = counts.entry(n.to_string()).or_insert((0u64, desc));
        entry.0 += 1;
    }
    counts
}

/// Write `manifest.csv`, `summary.json` and (when `ignore_missing`)
/// `ignored.json`. Returns the process exit code (0 or 2).
pub fn write_reports(
    workdir: &Path,
    manifest: &Manifest,
    directory_unassociated: &[String],
    ignore_missing: bool,
    strict: bool,
) -> Result<i32> {
    std::fs::create_dir_all(workdir)
        .with_context(|| format!("could not create workdir: {}", workdir.display()))?;

    write_manifest_csv(workdir, manifest)?;

    let mut ignored_ids = Vec::new();
    let mut skipped_ids = Vec::new();
    let mut failed_ids = Vec::new();
    let mut rows_json = Map::new();
    let mut succeeded = 0u64;

    for row in manifest.iter() {
        let manifest_id = row.manifest_id.clone();
        if row.ignored {
            ignored_ids.push(manifest_id);
            continue;
        }

        let counts = ecode_counts(workdir, &manifest_id);
        let mut entry = Map::new();
        if !counts.is_empty() {
            let mut exit_codes = Map::new();
            for (n, (occurrences, desc)) in counts {
                exit_codes.insert(
                    n,
                    json!({"occurrences": occurrences, "code-meaning": desc}),
                );
            }
            entry.insert("exit-codes".to_string(), Value::Object(exit_codes));
        }

        if !row.filtered.is_empty() {
            skipped_ids.push(manifest_id.clone());
            entry.insert(
                "skipped-because".to_string(),
                Value::String(row.filtered.clone()),
            );
            rows_json.insert(manifest_id, Value::Object(entry));
            continue;
        }

        if row.failures.is_empty() {
            succeeded += 1;
            if !entry.is_empty() {
                rows_json.insert(manifest_id, Value::Object(entry));
            }
            continue;
        }

        failed_ids.push(manifest_id.clone());
        entry.insert(
            "failures".to_string(),
            Value::Array(row.failures.iter().cloned().map(Value::String).collect()),
        );
        rows_json.insert(manifest_id, Value::Object(entry));
    }

    let mut row_overview = Map::new();
    row_overview.insert("succeeded".to_string(), json!(succeeded));
    row_overview.insert("failed".to_string(), json!(failed_ids.len() as u64));
    row_overview.insert("skipped".to_string(), json!(skipped_ids.len() as u64));
    if !ignored_ids.is_empty() {
        row_overview.insert("ignored".to_string(), json!(ignored_ids.len() as u64));
    }

    let summary = json!({
        "row-overview": row_overview,
        "skipped": skipped_ids,
        "failed": failed_ids,
        "unassociated-files": directory_unassociated,
        "rows": rows_json,
    });
    let summary_path = workdir.join("summary.json");
    std::fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)
        .with_context(|| format!("could not write {}", summary_path.display()))?;

    if ignore_missing {
        let ignored_path = workdir.join("ignored.json");
        std::fs::write(&ignored_path, serde_json::to_string_pretty(&ignored_ids)?)
            .with_context(|| format!("could not write {}", ignored_path.display()))?;
    }

    let any_failed = !failed_ids.is_empty();
    let any_skipped_strict = strict && (!skipped_ids.is_empty() || !directory_unassociated.is_empty());
    Ok(if any_failed || any_skipped_strict { 2 } else { 0 })
}

fn write_manifest_csv(workdir: &Path, manifest: &Manifest) -> Result<()> {
    let headers = manifest.widest_headers();
    let path = workdir.join("manifest.csv");
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_path(&path)
        .with_context(|| format!("could not write {}", path.display()))?;
    writer.write_record(&headers)?;
    for row in manifest.iter() {
        let values = row.values();
        let mut record: Vec<String> = Vec::with_capacity(headers.len());
        for h in &headers {
            let idx = row.headers().iter().position(|k| k == h);
            record.push(idx.map(|i| values[i].clone()).unwrap_or_default());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Bundle every file under `workdir` into a fresh zip, deflated. Returns
/// the path to the temporary zip file; the caller decides where it ends up.
pub fn zip_workdir(workdir: &Path) -> Result<PathBuf> {
    let tmp = tempfile::Builder::new()
        .prefix("colophon_")
        .suffix(".zip")
        .tempfile()
        .context("could not create a temporary file for --zip")?;
    let (file, path) = tmp.keep().context("could not persist temporary zip file")?;

    let mut zfile = zip::ZipWriter::new(file);

    for entry in walk_files(workdir)? {
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .compression_level(Some(9));
        let arcname = entry
            .strip_prefix(workdir)
            .unwrap_or(&entry)
            .to_string_lossy()
            .replace('\\', "/");
        zfile
            .start_file(arcname, options)
            .with_context(|| format!("could not add {} to zip", entry.display()))?;
        let bytes = std::fs::read(&entry)
            .with_context(|| format!("could not read {}", entry.display()))?;
        zfile.write_all(&bytes)?;
    }
    zfile.finish().context("could not finalize zip file")?;

    Ok(path)
}

fn walk_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("could not read {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            out.extend(walk_files(&path)?);
        } else {
            out.push(path);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;
    use tempfile::tempdir;

    fn load(contents: &str) -> (tempfile::NamedTempFile, Manifest) {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        let m = Manifest::load(f.path()).unwrap();
        (f, m)
    }

    #[test]
    fn succeeded_row_counts_and_empty_failures() {
        let (_f, m) = load("id\n1\n");
        let dir = tempdir().unwrap();
        let code = write_reports(dir.path(), &m, &[], false, false).unwrap();
        assert_eq!(code, 0);
        let summary: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("summary.json")).unwrap())
                .unwrap();
        assert_eq!(summary["row-overview"]["succeeded"], 1);
        assert!(dir.path().join("manifest.csv").exists());
    }

    #[test]
    fn failed_row_yields_exit_2() {
        let (_f, mut m) = load("id\n1\n");
        m.iter_mut().next().unwrap().failures.push("boom".to_string());
        let dir = tempdir().unwrap();
        let code = write_reports(dir.path(), &m, &[], false, false).unwrap();
        assert_eq!(code, 2);
    }

    #[test]
    fn strict_mode_fails_on_skip_and_unassociated() {
        let (_f, mut m) = load("id\n1\n");
        m.iter_mut().next().unwrap().filtered = "nope".to_string();
        let dir = tempdir().unwrap();
        let code = write_reports(dir.path(), &m, &[], false, true).unwrap();
        assert_eq!(code, 2);

        let dir2 = tempdir().unwrap();
        let (_f2, m2) = load("id\n1\n");
        let code2 = write_reports(dir2.path(), &m2, &["orphan.txt".to_string()], false, true).unwrap();
        assert_eq!(code2, 2);
    }

    #[test]
    fn ignored_rows_excluded_from_rows_and_listed_in_ignored_json() {
        let (_f, mut m) = load("id\n1\n");
        {
            let row = m.iter_mut().next().unwrap();
            row.ignored = true;
            row.manifest_id = "1".to_string();
        }
        let dir = tempdir().unwrap();
        let code = write_reports(dir.path(), &m, &[], true, true).unwrap();
        assert_eq!(code, 0);
        let ignored: Vec<String> =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("ignored.json")).unwrap())
                .unwrap();
        assert_eq!(ignored.len(), 1);
    }

    #[test]
    fn exit_codes_are_counted_from_ecode_files_even_for_succeeded_rows() {
        let (_f, mut m) = load("id\n1\n");
        {
            let row = m.iter_mut().next().unwrap();
            row.manifest_id = "1".to_string();
        }
        let dir = tempdir().unwrap();
        let stage_dir = dir.path().join("1").join("build");
        std::fs::create_dir_all(&stage_dir).unwrap();
        std::fs::write(stage_dir.join("ecode.2"), "2 = inaccessible_file\n").unwrap();
        let stage_dir2 = dir.path().join("1").join("build.1");
        std::fs::create_dir_all(&stage_dir2).unwrap();
        std::fs::write(stage_dir2.join("ecode.2"), "2 = inaccessible_file\n").unwrap();

        let code = write_reports(dir.path(), &m, &[], false, false).unwrap();
        assert_eq!(code, 0);

        let summary: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("summary.json")).unwrap())
                .unwrap();
        assert_eq!(summary["row-overview"]["succeeded"], 1);
        let exit_codes = &summary["rows"]["1"]["exit-codes"]["2"];
        assert_eq!(exit_codes["occurrences"], 2);
        assert_eq!(exit_codes["code-meaning"], "inaccessible_file");
    }

    #[test]
    fn row_overview_omits_ignored_key_when_there_are_none() {
        let (_f, m) = load("id\n1\n");
        let dir = tempdir().unwrap();
        write_reports(dir.path(), &m, &[], false, false).unwrap();
        let summary: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("summary.json")).unwrap())
                .unwrap();
        assert!(summary["row-overview"].get("ignored").is_none());
    }

    #[test]
    fn zip_workdir_bundles_written_files() {
        let (_f, m) = load("id\n1\n");
        let dir = tempdir().unwrap();
        write_reports(dir.path(), &m, &[], false, false).unwrap();

        let zip_path = zip_workdir(dir.path()).unwrap();
        let file = std::fs::File::open(&zip_path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert!(names.contains(&"manifest.csv".to_string()));
        assert!(names.contains(&"summary.json".to_string()));
        std::fs::remove_file(zip_path).unwrap();
    }
}
