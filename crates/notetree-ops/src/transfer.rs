//! Verified move and copy execution with progress reporting.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notetree_core::{Result, TreeConfig, TreeError};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::OPERATION_CHANNEL_SIZE;
use crate::config::TransferConfig;
use crate::fs::{EntryKind, FileSystem};
use crate::preflight::{
    Endpoints, PreflightReport, TransferMode, TransferPlan, TransferStrategy, check_preconditions,
    collect_subtree, run_preflight, select_strategy,
};
use crate::progress::{OperationError, OperationProgress, OperationType, ProgressPhase};
use crate::verify::IntegrityVerifier;

/// Event sent through the channel during a background transfer.
#[derive(Debug)]
pub enum TransferEvent {
    /// Preconditions passed and a strategy was chosen.
    Planned(TransferPlan),
    /// Preflight passed for a copying strategy (also sent when a rename
    /// falls back to copying).
    Preflight(PreflightReport),
    Progress(OperationProgress),
    Completed(TransferOutcome),
    Failed(OperationError),
}

/// Result of a finished transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub mode: TransferMode,
    /// Strategy that actually completed the transfer.
    pub strategy: TransferStrategy,
    /// The atomic rename hit a cross-device error and was retried as a copy.
    pub fell_back: bool,
    /// Files transferred; `None` when a folder was renamed without a walk.
    pub files: Option<usize>,
    pub bytes: Option<u64>,
}

impl TransferOutcome {
    /// Get a human-readable summary of the transfer.
    pub fn summary(&self) -> String {
        let action = match self.mode {
            TransferMode::Move => "Moved",
            TransferMode::Copy => "Copied",
        };
        let counts = match (self.files, self.bytes) {
            (Some(files), Some(bytes)) => format!(", {files} files, {bytes} bytes"),
            _ => String::new(),
        };
        format!(
            "{} {} -> {} ({}{})",
            action,
            self.source.display(),
            self.destination.display(),
            self.strategy,
            counts
        )
    }
}

/// Plans and executes transfers through a [`FileSystem`] provider.
#[derive(Clone)]
pub struct TransferEngine {
    fs: Arc<dyn FileSystem>,
    tree_config: TreeConfig,
    config: TransferConfig,
}

impl std::fmt::Debug for TransferEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferEngine")
            .field("tree_config", &self.tree_config)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TransferEngine {
    pub fn new(fs: Arc<dyn FileSystem>, tree_config: TreeConfig) -> Self {
        Self {
            fs,
            tree_config,
            config: TransferConfig::default(),
        }
    }

    pub fn with_config(mut self, config: TransferConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn filesystem(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    pub fn verifier(&self) -> IntegrityVerifier {
        IntegrityVerifier::new(self.config.chunk_size)
    }

    /// Check preconditions, pick a strategy and preflight copying
    /// strategies. Nothing on disk is modified.
    pub fn plan(&self, source: &Path, destination: &Path, mode: TransferMode) -> Result<TransferPlan> {
        let endpoints = check_preconditions(self.fs.as_ref(), &self.tree_config, source, destination)?;
        let strategy = select_strategy(&endpoints, mode);
        let preflight = if strategy.copies() {
            Some(run_preflight(self.fs.as_ref(), &self.config, &endpoints)?)
        } else {
            None
        };

        tracing::info!(
            source = %endpoints.source.display(),
            destination = %endpoints.destination.display(),
            %strategy,
            "planned transfer"
        );

        Ok(TransferPlan {
            source: endpoints.source,
            destination: endpoints.destination,
            mode,
            strategy,
            preflight,
        })
    }

    /// Plan and execute a transfer on the calling thread.
    pub fn transfer(
        &self,
        source: &Path,
        destination: &Path,
        mode: TransferMode,
        cancel: &CancellationToken,
    ) -> Result<TransferOutcome> {
        let plan = self.plan(source, destination, mode)?;
        self.execute(&plan, cancel, &mut |_| {})
    }

    /// Execute a plan, reporting preflight and progress events to `on_event`.
    ///
    /// Preconditions are re-checked first so a stale plan never touches the
    /// filesystem.
    pub fn execute(
        &self,
        plan: &TransferPlan,
        cancel: &CancellationToken,
        on_event: &mut dyn FnMut(TransferEvent),
    ) -> Result<TransferOutcome> {
        if cancel.is_cancelled() {
            return Err(TreeError::Cancelled);
        }
        let endpoints =
            check_preconditions(self.fs.as_ref(), &self.tree_config, &plan.source, &plan.destination)?;

        match plan.strategy {
            TransferStrategy::AtomicRename => self.rename_or_fall_back(plan, &endpoints, cancel, on_event),
            strategy => {
                let report = run_preflight(self.fs.as_ref(), &self.config, &endpoints)?;
                on_event(TransferEvent::Preflight(report));
                self.copy_verify(plan.mode, strategy, &endpoints, cancel, on_event, false)
            }
        }
    }

    fn rename_or_fall_back(
        &self,
        plan: &TransferPlan,
        endpoints: &Endpoints,
        cancel: &CancellationToken,
        on_event: &mut dyn FnMut(TransferEvent),
    ) -> Result<TransferOutcome> {
        let mut progress = OperationProgress::new(OperationType::Move, 1, 0);
        progress.enter_phase(ProgressPhase::Renaming);
        progress.set_current_file(Some(endpoints.source.clone()));
        on_event(TransferEvent::Progress(progress.clone()));

        match self.fs.rename(&endpoints.source, &endpoints.destination) {
            Ok(()) => {
                // A renamed folder is never walked, so its contents are not counted.
                let known = !endpoints.source_stat.is_dir();
                progress.complete_file(0);
                on_event(TransferEvent::Progress(progress));
                tracing::debug!(
                    source = %endpoints.source.display(),
                    destination = %endpoints.destination.display(),
                    "renamed"
                );
                Ok(TransferOutcome {
                    source: endpoints.source.clone(),
                    destination: endpoints.destination.clone(),
                    mode: plan.mode,
                    strategy: TransferStrategy::AtomicRename,
                    fell_back: false,
                    files: known.then_some(1),
                    bytes: known.then_some(endpoints.source_stat.size),
                })
            }
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                tracing::warn!(
                    source = %endpoints.source.display(),
                    destination = %endpoints.destination.display(),
                    "rename crossed devices, falling back to verified copy"
                );
                let report = run_preflight(self.fs.as_ref(), &self.config, endpoints)?;
                on_event(TransferEvent::Preflight(report));
                self.copy_verify(
                    plan.mode,
                    TransferStrategy::CopyVerifyDelete,
                    endpoints,
                    cancel,
                    on_event,
                    true,
                )
            }
            Err(e) => Err(TreeError::io(&endpoints.source, e)),
        }
    }

    fn copy_verify(
        &self,
        mode: TransferMode,
        strategy: TransferStrategy,
        endpoints: &Endpoints,
        cancel: &CancellationToken,
        on_event: &mut dyn FnMut(TransferEvent),
        fell_back: bool,
    ) -> Result<TransferOutcome> {
        let fs = self.fs.as_ref();
        let deletes = strategy == TransferStrategy::CopyVerifyDelete;
        // Copy failures during a move between volumes are reported as such.
        let copy_error = |path: &Path, e: io::Error| {
            if deletes {
                TreeError::CrossVolumeFailure {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                }
            } else {
                TreeError::io(path, e)
            }
        };

        let entries = collect_subtree(fs, &endpoints.source, &endpoints.source_stat)?;
        let files: Vec<(PathBuf, PathBuf, u64)> = entries
            .iter()
            .filter(|e| e.kind == EntryKind::File)
            .map(|e| (e.path.clone(), join_relative(&endpoints.destination, &e.relative), e.size))
            .collect();
        let links: Vec<(PathBuf, PathBuf)> = entries
            .iter()
            .filter(|e| e.kind == EntryKind::Symlink)
            .map(|e| (e.path.clone(), join_relative(&endpoints.destination, &e.relative)))
            .collect();
        let bytes_total: u64 = files.iter().map(|(_, _, size)| size).sum();

        let op_type = match mode {
            TransferMode::Move => OperationType::Move,
            TransferMode::Copy => OperationType::Copy,
        };
        let mut progress = OperationProgress::new(op_type, files.len(), bytes_total);

        for entry in &entries {
            if cancel.is_cancelled() {
                tracing::info!(destination = %endpoints.destination.display(), "transfer cancelled during copy");
                return Err(TreeError::Cancelled);
            }
            let target = join_relative(&endpoints.destination, &entry.relative);
            match entry.kind {
                EntryKind::Directory => {
                    fs.create_dir(&target).map_err(|e| copy_error(&target, e))?;
                    continue;
                }
                EntryKind::Symlink => {
                    let link = fs
                        .read_link(&entry.path)
                        .map_err(|e| copy_error(&entry.path, e))?;
                    fs.create_symlink(&link, &target)
                        .map_err(|e| copy_error(&target, e))?;
                    continue;
                }
                EntryKind::File | EntryKind::Other => {}
            }
            progress.set_current_file(Some(entry.path.clone()));
            on_event(TransferEvent::Progress(progress.clone()));
            let copied = fs
                .copy_file(&entry.path, &target)
                .map_err(|e| copy_error(&entry.path, e))?;
            progress.complete_file(copied);
        }
        on_event(TransferEvent::Progress(progress.clone()));

        let verifier = self.verifier();
        progress.enter_phase(ProgressPhase::Verifying);
        for (source, target, size) in &files {
            if cancel.is_cancelled() {
                return Err(TreeError::Cancelled);
            }
            progress.set_current_file(Some(target.clone()));
            on_event(TransferEvent::Progress(progress.clone()));
            if !verifier.verify(fs, source, target)? {
                tracing::warn!(
                    source = %source.display(),
                    destination = %target.display(),
                    "verification failed, source kept"
                );
                return Err(TreeError::IntegrityMismatch {
                    path: target.clone(),
                    source_path: source.clone(),
                });
            }
            progress.complete_file(*size);
        }
        for (source, target) in &links {
            let expected = fs.read_link(source).map_err(|e| TreeError::io(source, e))?;
            if fs.read_link(target).ok().as_deref() != Some(expected.as_path()) {
                tracing::warn!(
                    source = %source.display(),
                    destination = %target.display(),
                    "symlink target differs, source kept"
                );
                return Err(TreeError::IntegrityMismatch {
                    path: target.clone(),
                    source_path: source.clone(),
                });
            }
        }

        if deletes {
            if cancel.is_cancelled() {
                return Err(TreeError::Cancelled);
            }
            progress.enter_phase(ProgressPhase::RemovingSource);
            progress.set_current_file(Some(endpoints.source.clone()));
            on_event(TransferEvent::Progress(progress.clone()));
            fs.remove_all(&endpoints.source)
                .map_err(|e| TreeError::io(&endpoints.source, e))?;
        }

        tracing::info!(
            source = %endpoints.source.display(),
            destination = %endpoints.destination.display(),
            files = files.len(),
            links = links.len(),
            bytes = bytes_total,
            fell_back,
            "transfer verified"
        );

        Ok(TransferOutcome {
            source: endpoints.source.clone(),
            destination: endpoints.destination.clone(),
            mode,
            strategy,
            fell_back,
            files: Some(files.len() + links.len()),
            bytes: Some(bytes_total),
        })
    }

    /// Start a transfer on a blocking worker.
    ///
    /// Returns a receiver for plan, preflight, progress and completion
    /// events. Exactly one `Completed` or `Failed` event is sent last.
    pub fn start(
        &self,
        source: PathBuf,
        destination: PathBuf,
        mode: TransferMode,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<TransferEvent> {
        let (tx, rx) = mpsc::channel(OPERATION_CHANNEL_SIZE);
        let engine = self.clone();

        tokio::task::spawn_blocking(move || {
            let result = engine.plan(&source, &destination, mode).and_then(|plan| {
                let _ = tx.blocking_send(TransferEvent::Planned(plan.clone()));
                engine.execute(&plan, &cancel, &mut |event| {
                    let _ = tx.blocking_send(event);
                })
            });

            let last = match result {
                Ok(outcome) => TransferEvent::Completed(outcome),
                Err(err) => {
                    tracing::warn!(source = %source.display(), error = %err, "transfer failed");
                    TransferEvent::Failed(OperationError::from(&err))
                }
            };
            let _ = tx.blocking_send(last);
        });

        rx
    }
}

fn join_relative(base: &Path, relative: &Path) -> PathBuf {
    if relative.as_os_str().is_empty() {
        base.to_path_buf()
    } else {
        base.join(relative)
    }
}
