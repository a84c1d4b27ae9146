//! Recursive deletion of folders and documents.

use std::path::Path;

use notetree_core::{NodeKind, Result, TreeConfig, TreeError};
use serde::{Deserialize, Serialize};

use crate::fs::{EntryKind, FileSystem};
use crate::rename::qualifying_kind;

/// Immediate contents of a folder about to be deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletePreview {
    pub files: usize,
    pub folders: usize,
}

impl DeletePreview {
    pub fn is_empty(&self) -> bool {
        self.files == 0 && self.folders == 0
    }
}

/// Count what deleting `path` removes at its top level. Documents preview
/// as empty.
pub fn delete_preview(fs: &dyn FileSystem, config: &TreeConfig, path: &Path) -> Result<DeletePreview> {
    if qualifying_kind(fs, path, config)? == NodeKind::Document {
        return Ok(DeletePreview::default());
    }

    let mut preview = DeletePreview::default();
    for child in fs.enumerate(path).map_err(|e| TreeError::io(path, e))? {
        match fs.stat(&child).map(|s| s.kind) {
            Ok(EntryKind::Directory) => preview.folders += 1,
            Ok(EntryKind::File) => preview.files += 1,
            _ => {}
        }
    }
    Ok(preview)
}

/// Delete a qualifying entry; folders are removed with everything in them.
pub fn delete_entry(fs: &dyn FileSystem, config: &TreeConfig, path: &Path) -> Result<NodeKind> {
    let kind = qualifying_kind(fs, path, config)?;
    fs.remove_all(path).map_err(|e| TreeError::io(path, e))?;
    tracing::debug!(path = %path.display(), ?kind, "deleted entry");
    Ok(kind)
}
