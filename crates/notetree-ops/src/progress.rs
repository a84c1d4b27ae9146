//! Progress reporting types for file operations.

use std::path::PathBuf;

use notetree_core::{ErrorKind, TreeError};
use serde::{Deserialize, Serialize};

/// The type of operation being performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationType {
    Copy,
    Move,
    Delete,
    Rename,
    CreateDocument,
    CreateFolder,
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Copy => write!(f, "Copy"),
            Self::Move => write!(f, "Move"),
            Self::Delete => write!(f, "Delete"),
            Self::Rename => write!(f, "Rename"),
            Self::CreateDocument => write!(f, "Create document"),
            Self::CreateFolder => write!(f, "Create folder"),
        }
    }
}

/// Stage a transfer is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressPhase {
    Renaming,
    Copying,
    Verifying,
    RemovingSource,
}

/// Progress information for an ongoing operation.
#[derive(Debug, Clone)]
pub struct OperationProgress {
    pub operation_type: OperationType,
    pub phase: ProgressPhase,
    /// Number of files completed in the current phase.
    pub files_completed: usize,
    pub files_total: usize,
    /// Number of bytes processed so far in the current phase.
    pub bytes_processed: u64,
    /// Total bytes to process (may be 0 if unknown).
    pub bytes_total: u64,
    /// The file currently being processed.
    pub current_file: Option<PathBuf>,
}

impl OperationProgress {
    /// Create a new progress tracker for an operation.
    pub fn new(operation_type: OperationType, files_total: usize, bytes_total: u64) -> Self {
        Self {
            operation_type,
            phase: ProgressPhase::Copying,
            files_completed: 0,
            files_total,
            bytes_processed: 0,
            bytes_total,
            current_file: None,
        }
    }

    /// Get the progress as a percentage (0.0 to 100.0).
    pub fn percentage(&self) -> f64 {
        if self.bytes_total > 0 {
            (self.bytes_processed as f64 / self.bytes_total as f64) * 100.0
        } else if self.files_total > 0 {
            (self.files_completed as f64 / self.files_total as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Start a new phase, resetting the counters.
    pub fn enter_phase(&mut self, phase: ProgressPhase) {
        self.phase = phase;
        self.files_completed = 0;
        self.bytes_processed = 0;
        self.current_file = None;
    }

    /// Update the current file being processed.
    pub fn set_current_file(&mut self, path: Option<PathBuf>) {
        self.current_file = path;
    }

    /// Increment the completed count and add bytes.
    pub fn complete_file(&mut self, bytes: u64) {
        self.files_completed += 1;
        self.bytes_processed += bytes;
    }
}

/// An error reported over a progress channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    /// The path that caused the error.
    pub path: PathBuf,
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
}

impl OperationError {
    pub fn new(path: PathBuf, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            path,
            kind,
            message: message.into(),
        }
    }
}

impl From<&TreeError> for OperationError {
    fn from(err: &TreeError) -> Self {
        Self::new(
            err.path().map(PathBuf::from).unwrap_or_default(),
            err.kind(),
            err.to_string(),
        )
    }
}

impl std::fmt::Display for OperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}
