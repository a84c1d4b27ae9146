//! Transfer planning: preconditions, strategy selection and preflight.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use notetree_core::paths::canonicalize_lossy;
use notetree_core::{Result, TreeConfig, TreeError};
use serde::{Deserialize, Serialize};

use crate::config::TransferConfig;
use crate::fs::{EntryKind, EntryStat, FileSystem};

/// Whether the source is kept after a successful transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferMode {
    Move,
    Copy,
}

/// How a transfer is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStrategy {
    /// Single rename on one volume.
    AtomicRename,
    /// Copy, verify every file, then remove the source.
    CopyVerifyDelete,
    /// Copy and verify; the source is kept.
    CopyVerify,
}

impl TransferStrategy {
    /// Whether the strategy copies data (and so needs a preflight).
    pub fn copies(&self) -> bool {
        !matches!(self, Self::AtomicRename)
    }
}

impl fmt::Display for TransferStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AtomicRename => write!(f, "atomic rename"),
            Self::CopyVerifyDelete => write!(f, "copy, verify, delete"),
            Self::CopyVerify => write!(f, "copy, verify"),
        }
    }
}

/// Advisory notes attached to a successful preflight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreflightWarning {
    ManyFiles { count: usize },
    LargeTotal { bytes: u64 },
}

impl fmt::Display for PreflightWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ManyFiles { count } => write!(f, "large number of files ({count})"),
            Self::LargeTotal { bytes } => {
                write!(f, "large total size ({:.1} MiB)", *bytes as f64 / (1024.0 * 1024.0))
            }
        }
    }
}

/// Outcome of a successful preflight.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreflightReport {
    pub file_count: usize,
    pub dir_count: usize,
    pub total_bytes: u64,
    pub cross_volume: bool,
    /// Free bytes on the destination volume.
    pub available: u64,
    pub warnings: Vec<PreflightWarning>,
}

/// A validated transfer, ready to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPlan {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub mode: TransferMode,
    pub strategy: TransferStrategy,
    /// Present for strategies that copy data.
    pub preflight: Option<PreflightReport>,
}

/// One entry of a source subtree, relative to the subtree root.
#[derive(Debug, Clone)]
pub(crate) struct SubtreeEntry {
    pub path: PathBuf,
    pub relative: PathBuf,
    pub kind: EntryKind,
    pub size: u64,
}

impl SubtreeEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// List a subtree in pre-order (directories before their contents).
pub(crate) fn collect_subtree(
    fs: &dyn FileSystem,
    root: &Path,
    root_stat: &EntryStat,
) -> Result<Vec<SubtreeEntry>> {
    let mut out = Vec::new();
    let mut stack = vec![(root.to_path_buf(), PathBuf::new(), *root_stat)];

    while let Some((path, relative, stat)) = stack.pop() {
        if stat.is_dir() {
            let mut children = fs.enumerate(&path).map_err(|e| TreeError::io(&path, e))?;
            children.sort();
            for child in children.into_iter().rev() {
                let child_stat = fs.stat(&child).map_err(|e| TreeError::io(&child, e))?;
                let name = child.file_name().map(PathBuf::from).unwrap_or_default();
                stack.push((child, relative.join(name), child_stat));
            }
        }
        out.push(SubtreeEntry {
            path,
            relative,
            kind: stat.kind,
            size: stat.size,
        });
    }

    Ok(out)
}

/// Validated endpoints of a transfer request.
#[derive(Debug, Clone)]
pub(crate) struct Endpoints {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub parent: PathBuf,
    pub source_stat: EntryStat,
    pub parent_stat: EntryStat,
}

/// Check every precondition before anything is touched.
pub(crate) fn check_preconditions(
    fs: &dyn FileSystem,
    tree_config: &TreeConfig,
    source: &Path,
    destination: &Path,
) -> Result<Endpoints> {
    let source = canonicalize_lossy(source);
    let source_stat = fs.stat(&source).map_err(|e| TreeError::io(&source, e))?;
    let qualifying = match source_stat.kind {
        EntryKind::Directory => true,
        EntryKind::File => source
            .file_name()
            .is_some_and(|n| tree_config.is_document_name(&n.to_string_lossy())),
        EntryKind::Symlink | EntryKind::Other => false,
    };
    if !qualifying {
        return Err(TreeError::invalid(&source, "not a folder or document"));
    }

    let name = destination
        .file_name()
        .ok_or_else(|| TreeError::invalid(destination, "destination has no file name"))?;
    let parent = canonicalize_lossy(destination.parent().unwrap_or(Path::new(".")));
    let destination = parent.join(name);

    if source_stat.is_dir() && destination.starts_with(&source) {
        return Err(TreeError::invalid(
            &destination,
            format!("cannot move {} into itself", source.display()),
        ));
    }
    if destination == source {
        return Err(TreeError::invalid(&destination, "source and destination are the same"));
    }

    let parent_stat = fs.stat(&parent).map_err(|e| TreeError::io(&parent, e))?;
    if !parent_stat.is_dir() {
        return Err(TreeError::invalid(&parent, "destination parent is not a directory"));
    }
    if fs.exists(&destination) {
        return Err(TreeError::AlreadyExists { path: destination });
    }

    Ok(Endpoints {
        source,
        destination,
        parent,
        source_stat,
        parent_stat,
    })
}

/// Choose a strategy from the mode and the volumes of both endpoints.
pub(crate) fn select_strategy(endpoints: &Endpoints, mode: TransferMode) -> TransferStrategy {
    match mode {
        TransferMode::Copy => TransferStrategy::CopyVerify,
        TransferMode::Move if endpoints.source_stat.volume == endpoints.parent_stat.volume => {
            TransferStrategy::AtomicRename
        }
        TransferMode::Move => TransferStrategy::CopyVerifyDelete,
    }
}

/// Verify a copy can succeed: every source entry readable, destination
/// writable and large enough.
///
/// Symlinks are counted as files but are recreated as links, so only
/// their target is read.
pub(crate) fn run_preflight(
    fs: &dyn FileSystem,
    config: &TransferConfig,
    endpoints: &Endpoints,
) -> Result<PreflightReport> {
    let entries = collect_subtree(fs, &endpoints.source, &endpoints.source_stat)?;

    let mut report = PreflightReport {
        cross_volume: endpoints.source_stat.volume != endpoints.parent_stat.volume,
        ..Default::default()
    };
    for entry in &entries {
        match entry.kind {
            EntryKind::Directory => {
                report.dir_count += 1;
                continue;
            }
            EntryKind::Symlink => {
                fs.read_link(&entry.path)
                    .map_err(|e| TreeError::io(&entry.path, e))?;
            }
            EntryKind::File => {
                fs.open_read(&entry.path)
                    .map_err(|e| TreeError::io(&entry.path, e))?;
            }
            EntryKind::Other => {
                return Err(TreeError::invalid(&entry.path, "not a file, folder or symlink"));
            }
        }
        report.file_count += 1;
        report.total_bytes += entry.size;
    }

    let denied = || TreeError::PermissionDenied {
        path: endpoints.parent.clone(),
    };
    if endpoints.parent_stat.readonly {
        return Err(denied());
    }
    fs.check_writable(&endpoints.parent).map_err(|e| match e.kind() {
        io::ErrorKind::PermissionDenied | io::ErrorKind::ReadOnlyFilesystem => denied(),
        _ => TreeError::io(&endpoints.parent, e),
    })?;

    report.available = fs
        .free_space(&endpoints.parent)
        .map_err(|e| TreeError::io(&endpoints.parent, e))?;
    if report.available < report.total_bytes {
        return Err(TreeError::InsufficientSpace {
            path: endpoints.parent.clone(),
            required: report.total_bytes,
            available: report.available,
        });
    }

    if report.file_count > config.large_file_count {
        report.warnings.push(PreflightWarning::ManyFiles {
            count: report.file_count,
        });
    }
    if report.total_bytes > config.large_byte_total {
        report.warnings.push(PreflightWarning::LargeTotal {
            bytes: report.total_bytes,
        });
    }

    tracing::debug!(
        source = %endpoints.source.display(),
        files = report.file_count,
        dirs = report.dir_count,
        bytes = report.total_bytes,
        available = report.available,
        "preflight passed"
    );
    Ok(report)
}

/// Destination for dropping `source` onto `target`: a file target stands
/// for its parent directory.
pub fn drop_destination(fs: &dyn FileSystem, target: &Path, source: &Path) -> Result<PathBuf> {
    let stat = fs.stat(target).map_err(|e| TreeError::io(target, e))?;
    let dir = if stat.is_dir() {
        target
    } else {
        target
            .parent()
            .ok_or_else(|| TreeError::invalid(target, "drop target has no parent"))?
    };
    let name = source
        .file_name()
        .ok_or_else(|| TreeError::invalid(source, "source has no file name"))?;
    Ok(dir.join(name))
}
