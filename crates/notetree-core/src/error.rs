//! Error taxonomy shared by every notetree crate.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by tree, search and transfer operations.
#[derive(Debug, Error)]
pub enum TreeError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// An entry already occupies the target path.
    #[error("Already exists: {path}")]
    AlreadyExists { path: PathBuf },

    /// A transfer between volumes could not be completed.
    #[error("Cross-volume transfer failed at {path}: {message}")]
    CrossVolumeFailure { path: PathBuf, message: String },

    /// A copied file does not match its source.
    #[error("Integrity check failed: {path} does not match {source_path}")]
    IntegrityMismatch { path: PathBuf, source_path: PathBuf },

    /// Destination volume cannot hold the data.
    #[error("Insufficient space at {path}: need {required} bytes, {available} available")]
    InsufficientSpace {
        path: PathBuf,
        required: u64,
        available: u64,
    },

    /// The request is structurally invalid (e.g. moving a directory into itself).
    #[error("Invalid operation on {path}: {reason}")]
    InvalidOperation { path: PathBuf, reason: String },

    /// Operation was cancelled cooperatively.
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl TreeError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            io::ErrorKind::NotFound => Self::NotFound { path },
            io::ErrorKind::AlreadyExists => Self::AlreadyExists { path },
            _ => Self::Io { path, source },
        }
    }

    /// Create an invalid-operation error.
    pub fn invalid(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidOperation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Path the error refers to, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::PermissionDenied { path }
            | Self::NotFound { path }
            | Self::AlreadyExists { path }
            | Self::CrossVolumeFailure { path, .. }
            | Self::IntegrityMismatch { path, .. }
            | Self::InsufficientSpace { path, .. }
            | Self::InvalidOperation { path, .. }
            | Self::Io { path, .. } => Some(path),
            Self::Cancelled => None,
        }
    }

    /// Coarse classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::CrossVolumeFailure { .. } => ErrorKind::CrossVolumeFailure,
            Self::IntegrityMismatch { .. } => ErrorKind::IntegrityMismatch,
            Self::InsufficientSpace { .. } => ErrorKind::InsufficientSpace,
            Self::InvalidOperation { .. } => ErrorKind::InvalidOperation,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io { .. } => ErrorKind::Io,
        }
    }
}

/// Serializable classification of a [`TreeError`], used in reports and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    PermissionDenied,
    NotFound,
    AlreadyExists,
    CrossVolumeFailure,
    IntegrityMismatch,
    InsufficientSpace,
    InvalidOperation,
    Cancelled,
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "Permission denied"),
            Self::NotFound => write!(f, "Not found"),
            Self::AlreadyExists => write!(f, "Already exists"),
            Self::CrossVolumeFailure => write!(f, "Cross-volume failure"),
            Self::IntegrityMismatch => write!(f, "Integrity mismatch"),
            Self::InsufficientSpace => write!(f, "Insufficient space"),
            Self::InvalidOperation => write!(f, "Invalid operation"),
            Self::Cancelled => write!(f, "Cancelled"),
            Self::Io => write!(f, "I/O error"),
        }
    }
}

/// Result alias used throughout notetree.
pub type Result<T, E = TreeError> = std::result::Result<T, E>;
