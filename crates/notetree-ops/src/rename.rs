//! Name sanitization and renaming.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use notetree_core::{NodeKind, Result, TreeConfig, TreeError};
use regex::Regex;

use crate::fs::{EntryKind, FileSystem};

const MAX_NAME_LEN: usize = 64;

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._\- ]").expect("valid character filter regex"));
static SPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" {2,}").expect("valid space run regex"));
static SEPARATOR_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[._-]{2,}").expect("valid separator run regex"));

/// A user-supplied name reduced to a safe file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedName {
    pub name: String,
    /// Sanitization changed the (trimmed) input.
    pub modified: bool,
}

/// Reduce `input` to a portable file name.
///
/// Only ASCII letters, digits, `.`, `_`, `-` and space survive. The result
/// never starts with a dot, is at most 64 characters and never collides
/// with a reserved device name.
pub fn sanitize_filename(input: &str) -> Result<SanitizedName> {
    let trimmed = input.trim();

    let mut name = DISALLOWED.replace_all(trimmed, "").into_owned();
    name = SPACE_RUNS.replace_all(&name, " ").into_owned();
    name = name.trim_matches([' ', '.', '-']).trim_start_matches('.').to_string();
    name = SEPARATOR_RUNS.replace_all(&name, "_").into_owned();

    if name.len() > MAX_NAME_LEN {
        name = name[..MAX_NAME_LEN].trim_matches([' ', '.', '-', '_']).to_string();
    }

    let base = name.split('.').next().unwrap_or_default().to_ascii_uppercase();
    if RESERVED_NAMES.contains(&base.as_str()) {
        name = format!("file_{name}");
    }

    if name.is_empty() {
        return Err(TreeError::invalid(
            PathBuf::from(input),
            "name must contain letters, digits, spaces, periods, hyphens or underscores",
        ));
    }

    Ok(SanitizedName {
        modified: name != trimmed,
        name,
    })
}

/// Sanitize a name for a new or renamed entry of `kind`, appending the
/// document extension for documents.
pub fn entry_name(input: &str, kind: NodeKind, config: &TreeConfig) -> Result<SanitizedName> {
    let mut sanitized = sanitize_filename(input)?;
    let suffix = config.document_suffix();
    if kind.is_document() && !sanitized.name.ends_with(&suffix) {
        sanitized.name.push_str(&suffix);
    }
    Ok(sanitized)
}

/// Name shown to the user when renaming: documents omit their extension.
pub fn display_name(path: &Path, kind: NodeKind, config: &TreeConfig) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match kind {
        NodeKind::Document => name
            .strip_suffix(&config.document_suffix())
            .map(str::to_string)
            .unwrap_or(name),
        NodeKind::Directory => name,
    }
}

/// Kind of a qualifying entry, or `InvalidOperation` for anything else.
pub(crate) fn qualifying_kind(
    fs: &dyn FileSystem,
    path: &Path,
    config: &TreeConfig,
) -> Result<NodeKind> {
    let stat = fs.stat(path).map_err(|e| TreeError::io(path, e))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match stat.kind {
        EntryKind::Directory => Ok(NodeKind::Directory),
        EntryKind::File if config.is_document_name(&name) => Ok(NodeKind::Document),
        _ => Err(TreeError::invalid(path, "only folders and documents can be changed")),
    }
}

/// Result of a rename request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameOutcome {
    /// The sanitized name equals the current one; nothing was touched.
    Unchanged,
    Renamed {
        from: PathBuf,
        to: PathBuf,
        sanitized: SanitizedName,
    },
}

/// Rename a qualifying entry within its parent directory.
pub fn rename_entry(
    fs: &dyn FileSystem,
    config: &TreeConfig,
    path: &Path,
    new_name: &str,
) -> Result<RenameOutcome> {
    let kind = qualifying_kind(fs, path, config)?;
    let sanitized = entry_name(new_name, kind, config)?;

    let current = path.file_name().map(|n| n.to_string_lossy());
    if current.as_deref() == Some(sanitized.name.as_str()) {
        return Ok(RenameOutcome::Unchanged);
    }

    let parent = path
        .parent()
        .ok_or_else(|| TreeError::invalid(path, "cannot rename the filesystem root"))?;
    let target = parent.join(&sanitized.name);
    if fs.exists(&target) {
        return Err(TreeError::AlreadyExists { path: target });
    }

    fs.rename(path, &target).map_err(|e| TreeError::io(path, e))?;
    tracing::debug!(from = %path.display(), to = %target.display(), "renamed entry");

    Ok(RenameOutcome::Renamed {
        from: path.to_path_buf(),
        to: target,
        sanitized,
    })
}
