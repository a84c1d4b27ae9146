//! A document tree bound to a filesystem, with mutations that keep the two
//! consistent.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use notetree_core::paths::{canonicalize_lossy, rebase_path};
use notetree_core::{
    Document, DocumentTree, ErrorKind, NodeId, RenderError, RenderRequest, Rendered, Renderer,
    Result, TreeConfig, TreeError, TreeState, load_document, save_document,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::OPERATION_CHANNEL_SIZE;
use crate::config::TransferConfig;
use crate::create::{self, CreateResult};
use crate::delete::{self, DeletePreview};
use crate::fs::{FileSystem, LocalFs};
use crate::preflight::{TransferMode, TransferPlan, drop_destination};
use crate::rename::{self, RenameOutcome};
use crate::transfer::{TransferEngine, TransferEvent, TransferOutcome};

/// Per-session state that lives outside the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    current_document: Option<PathBuf>,
}

impl Session {
    /// Document currently open for editing.
    pub fn current_document(&self) -> Option<&Path> {
        self.current_document.as_deref()
    }

    fn rebase(&mut self, from: &Path, to: &Path) {
        if let Some(new) = self
            .current_document
            .as_deref()
            .and_then(|p| rebase_path(p, from, to))
        {
            self.current_document = Some(new);
        }
    }

    fn forget(&mut self, removed: &Path) {
        if self
            .current_document
            .as_deref()
            .is_some_and(|p| p.starts_with(removed))
        {
            self.current_document = None;
        }
    }
}

/// Marks a transfer as running until dropped.
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn acquire(flag: &Arc<AtomicBool>, root: &Path) -> Result<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            return Err(TreeError::invalid(root, "a transfer is already in progress"));
        }
        Ok(Self(Arc::clone(flag)))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Whether a failure may have left the tree out of step with the disk.
fn needs_reload(err: &TreeError) -> bool {
    matches!(
        err.kind(),
        ErrorKind::Io
            | ErrorKind::PermissionDenied
            | ErrorKind::NotFound
            | ErrorKind::CrossVolumeFailure
            | ErrorKind::IntegrityMismatch
            | ErrorKind::Cancelled
    )
}

/// The interactive side of notetree: a lazily loaded tree, the open
/// document and the operations that mutate both.
///
/// Every mutation captures the tree state, performs the filesystem change,
/// refreshes only the affected directories (falling back to a full reload)
/// and restores the captured state. Mutations are refused while a
/// background transfer is running.
pub struct Workspace {
    tree: DocumentTree,
    session: Session,
    fs: Arc<dyn FileSystem>,
    engine: TransferEngine,
    transfer_in_flight: Arc<AtomicBool>,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("root", &self.tree.root_path())
            .field("session", &self.session)
            .field("transfer_in_flight", &self.is_transfer_in_flight())
            .finish_non_exhaustive()
    }
}

impl Workspace {
    /// Open a workspace over the local disk.
    pub fn open(config: TreeConfig) -> Result<Self> {
        Self::with_filesystem(config, Arc::new(LocalFs))
    }

    /// Open a workspace whose mutations go through `fs`.
    pub fn with_filesystem(config: TreeConfig, fs: Arc<dyn FileSystem>) -> Result<Self> {
        let tree = DocumentTree::new(config)?;
        let mut tree_config = tree.config().clone();
        tree_config.root = tree.root_path().to_path_buf();
        let engine = TransferEngine::new(Arc::clone(&fs), tree_config);

        tracing::info!(root = %tree.root_path().display(), "opened workspace");
        Ok(Self {
            tree,
            session: Session::default(),
            fs,
            engine,
            transfer_in_flight: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_transfer_config(mut self, config: TransferConfig) -> Self {
        self.engine = self.engine.with_config(config);
        self
    }

    pub fn tree(&self) -> &DocumentTree {
        &self.tree
    }

    /// Mutable tree access for expansion and selection.
    pub fn tree_mut(&mut self) -> Result<&mut DocumentTree> {
        self.ensure_idle()?;
        Ok(&mut self.tree)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn engine(&self) -> &TransferEngine {
        &self.engine
    }

    pub fn root(&self) -> &Path {
        self.tree.root_path()
    }

    pub fn is_transfer_in_flight(&self) -> bool {
        self.transfer_in_flight.load(Ordering::Acquire)
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.is_transfer_in_flight() {
            return Err(TreeError::invalid(
                self.root(),
                "the tree cannot change while a transfer is in progress",
            ));
        }
        Ok(())
    }

    /// Resolve `path` and require it to lie within the root.
    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        let path = if path.is_absolute() {
            canonicalize_lossy(path)
        } else {
            canonicalize_lossy(&self.root().join(path))
        };
        if !path.starts_with(self.root()) {
            return Err(TreeError::invalid(&path, "outside the workspace root"));
        }
        Ok(path)
    }

    fn resolve_entry(&self, path: &Path) -> Result<PathBuf> {
        let path = self.resolve(path)?;
        if path == self.root() {
            return Err(TreeError::invalid(&path, "the workspace root cannot be changed"));
        }
        Ok(path)
    }

    /// Refresh the given directories and restore `state`, reloading the
    /// whole tree if any selective refresh fails.
    fn resync(&mut self, dirs: &[&Path], state: &TreeState) {
        let root = self.root().to_path_buf();
        let failed = dirs
            .iter()
            .filter(|dir| dir.starts_with(&root))
            .find_map(|dir| self.tree.refresh_subtree(dir).err());
        if let Some(err) = failed {
            tracing::debug!(error = %err, "selective refresh failed, reloading tree");
            self.tree.reload();
        }
        self.tree.apply_state(state);
    }

    fn recover(&mut self, state: &TreeState, err: &TreeError) {
        if needs_reload(err) {
            tracing::warn!(error = %err, "operation failed, reloading tree");
            self.tree.reload();
            self.tree.apply_state(state);
        }
    }

    fn focus(&mut self, path: &Path) -> Option<NodeId> {
        let id = self.tree.reveal(path)?;
        self.tree.select(Some(id));
        self.tree.set_scroll_anchor(Some(id));
        Some(id)
    }

    /// Open a document and select it in the tree.
    pub fn open_document(&mut self, path: &Path) -> Result<Document> {
        let path = self.resolve(path)?;
        let document = load_document(&path, self.tree.config())?;
        self.session.current_document = Some(path.clone());
        self.focus(&path);
        Ok(document)
    }

    /// Write `text` to the current document.
    pub fn save_current(&self, text: &str) -> Result<()> {
        let path = self
            .session
            .current_document()
            .ok_or_else(|| TreeError::invalid(self.root(), "no document is open"))?;
        save_document(path, text, self.tree.config())
    }

    pub fn close_document(&mut self) {
        self.session.current_document = None;
    }

    /// Hand the current document's path and raw text to an external renderer.
    pub fn render_current(
        &self,
        renderer: &dyn Renderer,
        stylesheet: Option<&str>,
    ) -> std::result::Result<Rendered, RenderError> {
        let path = self.session.current_document().ok_or(RenderError::NoDocument)?;
        let document = load_document(path, self.tree.config())?;
        renderer.render(&RenderRequest {
            path: &document.path,
            text: &document.text,
            stylesheet,
        })
    }

    /// Create an empty document and open it.
    pub fn create_document(&mut self, target: &Path, name: &str) -> Result<CreateResult> {
        self.create(target, name, true)
    }

    /// Create a folder and select it.
    pub fn create_folder(&mut self, target: &Path, name: &str) -> Result<CreateResult> {
        self.create(target, name, false)
    }

    fn create(&mut self, target: &Path, name: &str, document: bool) -> Result<CreateResult> {
        self.ensure_idle()?;
        let target = self.resolve(target)?;
        let state = self.tree.capture_state();

        let config = self.tree.config();
        let result = if document {
            create::create_document(self.fs.as_ref(), config, &target, name)
        } else {
            create::create_folder(self.fs.as_ref(), config, &target, name)
        };
        let created = result.inspect_err(|err| self.recover(&state, err))?;

        let parent = created.path.parent().unwrap_or(self.root()).to_path_buf();
        self.resync(&[&parent], &state);
        self.focus(&created.path);
        if document {
            self.session.current_document = Some(created.path.clone());
        }
        Ok(created)
    }

    /// Rename an entry in place. An unchanged sanitized name is a no-op.
    pub fn rename_entry(&mut self, path: &Path, new_name: &str) -> Result<RenameOutcome> {
        self.ensure_idle()?;
        let path = self.resolve_entry(path)?;
        let mut state = self.tree.capture_state();

        let outcome = rename::rename_entry(self.fs.as_ref(), self.tree.config(), &path, new_name)
            .inspect_err(|err| self.recover(&state, err))?;

        if let RenameOutcome::Renamed { from, to, .. } = &outcome {
            state.rebase(from, to);
            self.session.rebase(from, to);
            let parent = to.parent().unwrap_or(self.root()).to_path_buf();
            self.resync(&[&parent], &state);
            self.focus(to);
        }
        Ok(outcome)
    }

    /// Count the immediate contents of an entry about to be deleted.
    pub fn delete_preview(&self, path: &Path) -> Result<DeletePreview> {
        let path = self.resolve_entry(path)?;
        delete::delete_preview(self.fs.as_ref(), self.tree.config(), &path)
    }

    /// Delete an entry (recursively for folders).
    pub fn delete_entry(&mut self, path: &Path) -> Result<()> {
        self.ensure_idle()?;
        let path = self.resolve_entry(path)?;
        let mut state = self.tree.capture_state();

        delete::delete_entry(self.fs.as_ref(), self.tree.config(), &path)
            .inspect_err(|err| self.recover(&state, err))?;

        self.session.forget(&path);
        state.forget(&path);
        let parent = path.parent().unwrap_or(self.root()).to_path_buf();
        self.resync(&[&parent], &state);
        if self.tree.find_node_by_path(&path).is_some() {
            tracing::debug!(path = %path.display(), "deleted entry still shown, reloading tree");
            self.tree.reload();
            self.tree.apply_state(&state);
        }
        Ok(())
    }

    /// Rebuild the whole tree from disk, keeping expansion and selection.
    pub fn refresh(&mut self) -> Result<()> {
        self.ensure_idle()?;
        let state = self.tree.capture_state();
        self.tree.reload();
        self.tree.apply_state(&state);
        Ok(())
    }

    /// Validate a transfer and report its strategy and preflight without
    /// touching the disk.
    pub fn plan_transfer(
        &self,
        source: &Path,
        destination: &Path,
        mode: TransferMode,
    ) -> Result<TransferPlan> {
        let source = self.resolve_entry(source)?;
        self.engine.plan(&source, destination, mode)
    }

    /// Move an entry on the calling thread.
    pub fn move_entry(&mut self, source: &Path, destination: &Path) -> Result<TransferOutcome> {
        self.transfer(source, destination, TransferMode::Move)
    }

    /// Copy an entry on the calling thread.
    pub fn copy_entry(&mut self, source: &Path, destination: &Path) -> Result<TransferOutcome> {
        self.transfer(source, destination, TransferMode::Copy)
    }

    /// Transfer `source` into the directory a drop on `target` stands for.
    pub fn drop_entry(
        &mut self,
        target: &Path,
        source: &Path,
        mode: TransferMode,
    ) -> Result<TransferOutcome> {
        let destination = drop_destination(self.fs.as_ref(), target, source)?;
        self.transfer(source, &destination, mode)
    }

    fn transfer(
        &mut self,
        source: &Path,
        destination: &Path,
        mode: TransferMode,
    ) -> Result<TransferOutcome> {
        self.ensure_idle()?;
        let source = self.resolve_entry(source)?;
        let guard = InFlight::acquire(&self.transfer_in_flight, self.tree.root_path())?;
        let result = self
            .engine
            .transfer(&source, destination, mode, &CancellationToken::new());
        drop(guard);

        match result {
            Ok(outcome) => {
                self.complete_transfer(Some(&outcome));
                Ok(outcome)
            }
            Err(err) => {
                if needs_reload(&err) {
                    self.complete_transfer(None);
                }
                Err(err)
            }
        }
    }

    /// Start a transfer on a background worker.
    ///
    /// Tree mutations are refused until the final `Completed` or `Failed`
    /// event has been delivered. Pass the outcome (or `None` on failure) to
    /// [`complete_transfer`](Self::complete_transfer) afterwards.
    pub fn start_transfer(
        &mut self,
        source: &Path,
        destination: PathBuf,
        mode: TransferMode,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<TransferEvent>> {
        self.ensure_idle()?;
        let source = self.resolve_entry(source)?;
        let guard = InFlight::acquire(&self.transfer_in_flight, self.tree.root_path())?;

        let mut inner = self.engine.start(source, destination, mode, cancel);
        let (tx, rx) = mpsc::channel(OPERATION_CHANNEL_SIZE);
        tokio::spawn(async move {
            let mut guard = Some(guard);
            while let Some(event) = inner.recv().await {
                if matches!(event, TransferEvent::Completed(_) | TransferEvent::Failed(_)) {
                    guard.take();
                }
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    /// Bring the tree in line with a finished transfer.
    ///
    /// After a move, the open document, selection and expanded paths under
    /// the source follow it to the destination. `None` reloads the tree.
    pub fn complete_transfer(&mut self, outcome: Option<&TransferOutcome>) {
        let mut state = self.tree.capture_state();
        let Some(outcome) = outcome else {
            self.tree.reload();
            self.tree.apply_state(&state);
            return;
        };

        let mut dirs = Vec::with_capacity(2);
        if outcome.mode == TransferMode::Move {
            state.rebase(&outcome.source, &outcome.destination);
            self.session.rebase(&outcome.source, &outcome.destination);
            dirs.extend(outcome.source.parent());
        }
        dirs.extend(outcome.destination.parent());
        self.resync(&dirs, &state);
    }
}
