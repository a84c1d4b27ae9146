//! File operations for notetree.
//!
//! This crate provides the verified move/copy engine (atomic rename on one
//! volume, copy-verify-delete across volumes), the integrity verifier, the
//! create/rename/delete operations and the [`Workspace`] that keeps a
//! [`notetree_core::DocumentTree`] consistent with the disk across all of them.

mod config;
mod create;
mod delete;
mod fs;
mod preflight;
mod progress;
mod rename;
mod transfer;
mod verify;
mod workspace;

pub use config::{TransferConfig, TransferConfigBuilder};
pub use create::{CreateResult, create_document, create_folder, target_directory};
pub use delete::{DeletePreview, delete_entry, delete_preview};
pub use fs::{EntryKind, EntryStat, FileSystem, LocalFs, VolumeId};
pub use preflight::{
    PreflightReport, PreflightWarning, TransferMode, TransferPlan, TransferStrategy,
    drop_destination,
};
pub use progress::{OperationError, OperationProgress, OperationType, ProgressPhase};
pub use rename::{
    RenameOutcome, SanitizedName, display_name, entry_name, rename_entry, sanitize_filename,
};
pub use transfer::{TransferEngine, TransferEvent, TransferOutcome};
pub use verify::{ContentDigest, DEFAULT_CHUNK_SIZE, IntegrityVerifier};
pub use workspace::{Session, Workspace};

/// Default channel buffer size for operation progress updates.
pub const OPERATION_CHANNEL_SIZE: usize = 100;
