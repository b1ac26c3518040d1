//! Error taxonomy for the pipeline.
//!
//! Configuration-class errors (missing files, bad YAML/CSV, schema mismatch,
//! singleton violations) are fatal and bubble up through `anyhow::Result` to
//! `main`. The remaining kinds are caught at specific points in the pipeline
//! (matcher, stage executor) and folded into row state rather than aborting
//! the run.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ColophonError {
    /// Syntax error or undefined name while rendering a template.
    #[error("could not render `{source}`: {message}")]
    TemplateRenderFailure { source: String, message: String },

    /// A stage's loopvars are missing, not a list, or of mismatched length.
    #[error("{0}")]
    StageProcessingFailure(String),

    /// A script set exit bit 16; the row is filtered and remaining stages
    /// for it are skipped.
    #[error("{0}")]
    EndStagesProcessing(String),
}

pub type Result<T> = std::result::Result<T, ColophonError>;
