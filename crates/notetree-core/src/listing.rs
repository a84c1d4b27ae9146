//! Single-directory enumeration restricted to qualifying entries.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use compact_str::CompactString;

use crate::config::TreeConfig;
use crate::error::TreeError;
use crate::node::NodeKind;

/// One qualifying entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedEntry {
    pub name: CompactString,
    pub path: PathBuf,
    pub kind: NodeKind,
}

/// Result of listing a directory. Failures never propagate: they leave
/// `entries` empty and record the cause in `error`.
#[derive(Debug, Default)]
pub struct Listing {
    pub entries: Vec<ListedEntry>,
    pub error: Option<TreeError>,
}

impl Listing {
    /// Check whether the listing failed.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Classify a directory entry, returning `None` for non-qualifying entries.
fn classify(path: &Path, name: &str, config: &TreeConfig) -> Option<NodeKind> {
    if config.should_skip_hidden(name) {
        return None;
    }

    let metadata = if config.follow_symlinks {
        fs::metadata(path)
    } else {
        fs::symlink_metadata(path)
    }
    .ok()?;

    if metadata.is_dir() {
        Some(NodeKind::Directory)
    } else if metadata.is_file() && config.is_document_name(name) {
        Some(NodeKind::Document)
    } else {
        None
    }
}

/// Check whether a path is a qualifying entry: a directory, or a file
/// bearing the document extension.
pub fn qualifying_kind(path: &Path, config: &TreeConfig) -> Option<NodeKind> {
    let name = path.file_name()?.to_string_lossy();
    let metadata = fs::metadata(path).ok()?;
    if metadata.is_dir() {
        Some(NodeKind::Directory)
    } else if metadata.is_file() && config.is_document_name(&name) {
        Some(NodeKind::Document)
    } else {
        None
    }
}

/// Sort order for siblings: directories first, then case-insensitive name,
/// with the exact name as a tiebreaker so the order is total.
pub fn sibling_order(a_kind: NodeKind, a_name: &str, b_kind: NodeKind, b_name: &str) -> Ordering {
    b_kind
        .is_dir()
        .cmp(&a_kind.is_dir())
        .then_with(|| a_name.to_lowercase().cmp(&b_name.to_lowercase()))
        .then_with(|| a_name.cmp(b_name))
}

/// List the qualifying children of a directory in display order.
pub fn list_children(path: &Path, config: &TreeConfig) -> Listing {
    let read_dir = match fs::read_dir(path) {
        Ok(rd) => rd,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "directory listing failed");
            return Listing {
                entries: Vec::new(),
                error: Some(TreeError::io(path, err)),
            };
        }
    };

    let mut entries = Vec::new();
    for entry in read_dir {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                return Listing {
                    entries: Vec::new(),
                    error: Some(TreeError::io(path, err)),
                };
            }
        };

        let name = entry.file_name().to_string_lossy().to_string();
        let child_path = entry.path();
        if let Some(kind) = classify(&child_path, &name, config) {
            entries.push(ListedEntry {
                name: name.into(),
                path: child_path,
                kind,
            });
        }
    }

    entries.sort_by(|a, b| sibling_order(a.kind, &a.name, b.kind, &b.name));

    Listing {
        entries,
        error: None,
    }
}

/// Cheap check for at least one qualifying entry, without materializing
/// children. Errors resolve to `false`.
pub fn has_loadable_children(path: &Path, config: &TreeConfig) -> bool {
    let Ok(read_dir) = fs::read_dir(path) else {
        return false;
    };

    read_dir.flatten().any(|entry| {
        let name = entry.file_name();
        classify(&entry.path(), &name.to_string_lossy(), config).is_some()
    })
}
