//! Colophon — batch verification harness: matches files under a source
//! directory onto manifest rows via a suite's declarative file-matches,
//! then runs each row's stages and reports the result.
//!
//! The binary (`main.rs`) is a thin CLI wrapper over this library; it
//! exists as its own crate so the end-to-end scenarios in `tests/` can
//! drive `pipeline::Context` directly instead of shelling out.

pub mod condition;
pub mod directory;
pub mod error;
pub mod filematcher;
pub mod logbuffer;
pub mod manifest;
pub mod pipeline;
pub mod reporter;
pub mod stage;
pub mod suite;
pub mod template;
