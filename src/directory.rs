//! Directory index (§4.C).
//!
//! Walks the source tree once at load time, changes the process working
//! directory to the root (so downstream relative paths read naturally in
//! reports), and exposes the walk in insertion order. A process may only
//! ever load one `Directory`; a second attempt is a configuration error.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

static LOADED: AtomicBool = AtomicBool::new(false);

/// Per-file metadata. `associated` is the empty string when unclaimed,
/// otherwise the `manifest_id` of the row that claimed it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FileInfo {
    pub name: String,
    pub path: String,
    pub base: String,
    pub ext: String,
    pub size: u64,
    #[serde(skip)]
    pub associated: String,
}

impl FileInfo {
    fn from_relpath(relpath: &str, size: u64) -> Self {
        let relpath = relpath.strip_prefix("./").unwrap_or(relpath);
        let (path, name) = match relpath.rfind('/') {
            Some(idx) => (relpath[..idx].to_string(), relpath[idx + 1..].to_string()),
            None => (String::new(), relpath.to_string()),
        };
        let (base, ext) = match name.rfind('.') {
            Some(idx) if idx > 0 => (name[..idx].to_string(), name[idx + 1..].to_string()),
            _ => (name.clone(), String::new()),
        };
        FileInfo {
            name,
            path,
            base,
            ext,
            size,
            associated: String::new(),
        }
    }

    /// A flat `serde_json::Value` view used as `file` in template/condition
    /// contexts.
    pub fn to_context(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "path": self.path,
            "base": self.base,
            "ext": self.ext,
            "size": self.size,
        })
    }
}

/// The ordered filepath -> FileInfo index.
pub struct Directory {
    entries: Vec<(String, FileInfo)>,
}

fn walk(dir: &Path, prefix: &str, out: &mut Vec<(String, FileInfo)>) -> Result<()> {
    let read = std::fs::read_dir(dir)
        .with_context(|| format!("unable to read directory: {}", dir.display()))?;
    for entry in read {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let name = entry.file_name().to_string_lossy().to_string();
        let relpath = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}/{name}")
        };
        if file_type.is_dir() {
            walk(&entry.path(), &relpath, out)?;
        } else if file_type.is_file() {
            let size = entry.metadata()?.len();
            out.push((relpath.clone(), FileInfo::from_relpath(&relpath, size)));
        }
    }
    Ok(())
}

impl Directory {
    /// Load the directory at `root`. Changes the process cwd to `root`.
    /// Fails if a `Directory` has already been successfully loaded in this
    /// process, or if `root` is not a readable directory.
    pub fn load(root: &Path) -> Result<Self> {
        if LOADED.swap(true, Ordering::SeqCst) {
            bail!("a Directory has already been loaded in this process");
        }
        if !root.is_dir() {
            LOADED.store(false, Ordering::SeqCst);
            bail!("Unable to read from specified directory: {}", root.display());
        }
        let abs = root
            .canonicalize()
            .with_context(|| format!("Unable to read from specified directory: {}", root.display()))?;
        std::env::set_current_dir(&abs).with_context(|| {
            format!("Unable to read from specified directory: {}", root.display())
        })?;

        let mut entries = Vec::new();
        if let Err(e) = walk(Path::new("."), "", &mut entries) {
            LOADED.store(false, Ordering::SeqCst);
            return Err(e);
        }
        Ok(Directory { entries })
    }

    #[cfg(test)]
    pub(crate) fn reset_singleton_for_tests() {
        LOADED.store(false, Ordering::SeqCst);
    }

    /// Iterate `(filepath, FileInfo)` pairs in walk (insertion) order.
    pub fn iter(&self) -> impl Iterator<Item = &(String, FileInfo)> {
        self.entries.iter()
    }

    /// Iterate only entries whose association state matches `associated`.
    pub fn files(&self, associated: bool) -> impl Iterator<Item = &(String, FileInfo)> {
        self.entries
            .iter()
            .filter(move |(_, info)| !info.associated.is_empty() == associated)
    }

    pub fn get(&self, filepath: &str) -> Option<&FileInfo> {
        self.entries.iter().find(|(p, _)| p == filepath).map(|(_, i)| i)
    }

    /// Claim `filepath` for `manifest_id`. Returns `false` (and leaves the
    /// file untouched) if it was already associated.
    pub fn associate(&mut self, filepath: &str, manifest_id: &str) -> bool {
        if let Some((_, info)) = self.entries.iter_mut().find(|(p, _)| p == filepath) {
            if !info.associated.is_empty() {
                return false;
            }
            info.associated = manifest_id.to_string();
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
