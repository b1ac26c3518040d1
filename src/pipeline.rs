//! Row-processing orchestration (§5).
//!
//! Owns the singleton resources (Directory/Manifest/Suite/workdir/global
//! context) in one `Context` record rather than as process globals, per
//! §9 Design Notes. Processes rows strictly in source order: filter, then
//! match (with buffered logging, discarded if the row ends up ignored),
//! then stages in declaration order, then hands the whole manifest to the
//! reporter.

use crate::directory::Directory;
use crate::manifest::Manifest;
use crate::stage::{run_stage, StageOutcome};
use crate::suite::Suite;
use anyhow::Result;
use serde_json::Value;
use std::path::PathBuf;

pub struct Context {
    pub directory: Directory,
    pub manifest: Manifest,
    pub suite: Suite,
    pub workdir: PathBuf,
    pub global_context: Value,
    pub strict: bool,
    pub ignore_missing: bool,
}

impl Context {
    /// Run every row through filter -> match -> stages, then write reports.
    /// Returns the process exit code.
    pub fn run(&mut self) -> Result<i32> {
        for row in self.manifest.iter_mut() {
            let row_ctx = row.to_context();

            let filter_reason = self.suite.filter(&row_ctx)?;
            if !filter_reason.is_empty() {
                row.filtered = filter_reason;
                continue;
            }

            let manifest_id = self.suite.manifest_id(&row_ctx)?;
            row.manifest_id = manifest_id.clone();

            let logger = crate::logbuffer::global();
            logger.start_buffer();

            let mut total_matched = 0usize;
            for spec in self.suite.files() {
                let outcome = crate::filematcher::process_file_match(
                    row,
                    spec,
                    &mut self.directory,
                    &manifest_id,
                );
                total_matched += outcome.files_matched;
                row.failures.extend(outcome.failures);
            }

            row.ignored = self.ignore_missing && total_matched == 0;
            logger.end_buffer(row.ignored);

            if row.ignored {
                continue;
            }

            for (name, spec) in self.suite.stages() {
                match run_stage(
                    name,
                    spec,
                    row,
                    &self.global_context,
                    &self.workdir,
                    &manifest_id,
                ) {
                    StageOutcome::Continue | StageOutcome::StageFailed(_) => {}
                    StageOutcome::EndStages(_) => break,
                }
            }
        }

        let unassociated: Vec<String> = self
            .directory
            .files(false)
            .map(|(path, _)| path.clone())
            .collect();

        crate::reporter::write_reports(
            &self.workdir,
            &self.manifest,
            &unassociated,
            self.ignore_missing,
            self.strict,
        )
    }
}
