//! Document and folder creation.

use std::path::{Path, PathBuf};

use notetree_core::{NodeKind, Result, TreeConfig, TreeError};

use crate::fs::FileSystem;
use crate::rename::{SanitizedName, entry_name};

/// Result of a successful create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateResult {
    pub path: PathBuf,
    pub sanitized: SanitizedName,
}

/// Directory a new entry goes into: a file target stands for its parent.
pub fn target_directory(fs: &dyn FileSystem, target: &Path) -> Result<PathBuf> {
    let stat = fs.stat(target).map_err(|e| TreeError::io(target, e))?;
    if stat.is_dir() {
        return Ok(target.to_path_buf());
    }
    target
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| TreeError::invalid(target, "target has no parent directory"))
}

fn create_entry(
    fs: &dyn FileSystem,
    config: &TreeConfig,
    target: &Path,
    name: &str,
    kind: NodeKind,
) -> Result<CreateResult> {
    let dir = target_directory(fs, target)?;
    let sanitized = entry_name(name, kind, config)?;
    let path = dir.join(&sanitized.name);
    if fs.exists(&path) {
        return Err(TreeError::AlreadyExists { path });
    }

    match kind {
        NodeKind::Document => fs.create_file(&path),
        NodeKind::Directory => fs.create_dir(&path),
    }
    .map_err(|e| TreeError::io(&path, e))?;

    tracing::debug!(path = %path.display(), ?kind, "created entry");
    Ok(CreateResult { path, sanitized })
}

/// Create an empty document named `name` (extension appended if missing).
pub fn create_document(
    fs: &dyn FileSystem,
    config: &TreeConfig,
    target: &Path,
    name: &str,
) -> Result<CreateResult> {
    create_entry(fs, config, target, name, NodeKind::Document)
}

/// Create a folder named `name`.
pub fn create_folder(
    fs: &dyn FileSystem,
    config: &TreeConfig,
    target: &Path,
    name: &str,
) -> Result<CreateResult> {
    create_entry(fs, config, target, name, NodeKind::Directory)
}
