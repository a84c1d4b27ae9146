use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use notetree_core::{ErrorKind, TreeConfig, TreeError};
use notetree_ops::{
    EntryStat, FileSystem, IntegrityVerifier, LocalFs, RenameOutcome, TransferEvent,
    TransferMode, TransferStrategy, VolumeId, Workspace,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Local disk where everything under `vol2` pretends to live on a second
/// volume.
#[derive(Default)]
struct SimulatedVolumes {
    vol2: PathBuf,
    vol2_free: Option<u64>,
    corrupt_copies: bool,
    rename_crosses_devices: bool,
    /// Opening this file for reading is denied.
    unreadable: Option<PathBuf>,
    /// Creating entries under this directory is denied.
    unwritable: Option<PathBuf>,
    mutations: AtomicUsize,
}

impl SimulatedVolumes {
    fn new(vol2: PathBuf) -> Self {
        Self {
            vol2,
            ..Default::default()
        }
    }

    fn mutated(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }
}

impl FileSystem for SimulatedVolumes {
    fn enumerate(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        LocalFs.enumerate(path)
    }

    fn stat(&self, path: &Path) -> io::Result<EntryStat> {
        let mut stat = LocalFs.stat(path)?;
        stat.volume = if path.starts_with(&self.vol2) {
            VolumeId(2)
        } else {
            VolumeId(1)
        };
        Ok(stat)
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        if self.unreadable.as_deref() == Some(path) {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        LocalFs.open_read(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.mutated();
        if self.rename_crosses_devices {
            return Err(io::Error::from(io::ErrorKind::CrossesDevices));
        }
        LocalFs.rename(from, to)
    }

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64> {
        self.mutated();
        if self.corrupt_copies {
            let bytes: Vec<u8> = fs::read(from)?.into_iter().map(|b| b ^ 0xff).collect();
            fs::write(to, &bytes)?;
            return Ok(bytes.len() as u64);
        }
        LocalFs.copy_file(from, to)
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        self.mutated();
        LocalFs.create_dir(path)
    }

    fn create_file(&self, path: &Path) -> io::Result<()> {
        self.mutated();
        LocalFs.create_file(path)
    }

    fn remove_all(&self, path: &Path) -> io::Result<()> {
        self.mutated();
        LocalFs.remove_all(path)
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        LocalFs.read_link(path)
    }

    fn create_symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        self.mutated();
        LocalFs.create_symlink(target, link)
    }

    fn check_writable(&self, dir: &Path) -> io::Result<()> {
        if self.unwritable.as_deref().is_some_and(|locked| dir.starts_with(locked)) {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        LocalFs.check_writable(dir)
    }

    fn free_space(&self, path: &Path) -> io::Result<u64> {
        match self.vol2_free {
            Some(free) if path.starts_with(&self.vol2) => Ok(free),
            _ => LocalFs.free_space(path),
        }
    }
}

struct Fixture {
    _temp: TempDir,
    root: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("vol1/a/b")).unwrap();
        fs::create_dir_all(root.join("vol2/inbox")).unwrap();
        fs::write(root.join("vol1/x.md"), "x".repeat(100)).unwrap();
        fs::write(root.join("vol1/a/b/note.md"), "deep note").unwrap();
        fs::write(root.join("vol1/a/top.md"), "top").unwrap();
        Self { _temp: temp, root }
    }

    fn workspace(&self, fs: SimulatedVolumes) -> (Workspace, Arc<SimulatedVolumes>) {
        let fs = Arc::new(fs);
        let ws = Workspace::with_filesystem(
            TreeConfig::new(&self.root),
            Arc::clone(&fs) as Arc<dyn FileSystem>,
        )
        .unwrap();
        (ws, fs)
    }

    fn volumes(&self) -> SimulatedVolumes {
        SimulatedVolumes::new(self.root.join("vol2"))
    }
}

#[test]
fn test_move_into_own_subtree_rejected_without_mutation() {
    let fx = Fixture::new();
    let (mut ws, fs) = fx.workspace(fx.volumes());
    let source = fx.root.join("vol1/a/b");

    let err = ws.move_entry(&source, &source.join("c")).unwrap_err();

    assert!(matches!(err, TreeError::InvalidOperation { .. }));
    assert_eq!(fs.mutations.load(Ordering::SeqCst), 0);
    assert!(source.join("note.md").exists());
    assert!(!source.join("c").exists());
}

#[test]
fn test_corrupted_copy_detected_and_source_kept() {
    let fx = Fixture::new();
    let mut volumes = fx.volumes();
    volumes.corrupt_copies = true;
    let (mut ws, fs) = fx.workspace(volumes);
    let source = fx.root.join("vol1/x.md");
    let dest = fx.root.join("vol2/inbox/x.md");

    let err = ws.move_entry(&source, &dest).unwrap_err();

    assert!(matches!(err, TreeError::IntegrityMismatch { .. }));
    assert!(source.exists());
    assert_eq!(fs::read_to_string(&source).unwrap(), "x".repeat(100));
    // The partial copy stays for inspection.
    assert!(dest.exists());
    assert!(!IntegrityVerifier::default().verify(fs.as_ref(), &source, &dest).unwrap());
}

#[test]
fn test_insufficient_space_leaves_source_untouched() {
    let fx = Fixture::new();
    let mut volumes = fx.volumes();
    volumes.vol2_free = Some(10);
    let (mut ws, fs) = fx.workspace(volumes);
    let source = fx.root.join("vol1/x.md");

    let err = ws.move_entry(&source, &fx.root.join("vol2/x.md")).unwrap_err();

    match err {
        TreeError::InsufficientSpace {
            required, available, ..
        } => {
            assert_eq!(required, 100);
            assert_eq!(available, 10);
        }
        other => panic!("expected InsufficientSpace, got {other:?}"),
    }
    assert_eq!(fs.mutations.load(Ordering::SeqCst), 0);
    assert_eq!(fs::read_to_string(&source).unwrap(), "x".repeat(100));
    assert!(!fx.root.join("vol2/x.md").exists());
}

#[test]
fn test_unreadable_source_fails_preflight_without_mutation() {
    let fx = Fixture::new();
    let mut volumes = fx.volumes();
    volumes.unreadable = Some(fx.root.join("vol1/a/b/note.md"));
    let (mut ws, fs) = fx.workspace(volumes);

    let err = ws
        .move_entry(&fx.root.join("vol1/a"), &fx.root.join("vol2/a"))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert_eq!(err.path(), Some(fx.root.join("vol1/a/b/note.md").as_path()));
    assert_eq!(fs.mutations.load(Ordering::SeqCst), 0);
    assert!(fx.root.join("vol1/a/b/note.md").exists());
    assert!(!fx.root.join("vol2/a").exists());
}

#[test]
fn test_unwritable_destination_fails_preflight_without_mutation() {
    let fx = Fixture::new();
    let mut volumes = fx.volumes();
    volumes.unwritable = Some(fx.root.join("vol2/inbox"));
    let (mut ws, fs) = fx.workspace(volumes);
    let source = fx.root.join("vol1/x.md");

    let err = ws
        .plan_transfer(&source, &fx.root.join("vol2/inbox/x.md"), TransferMode::Copy)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert_eq!(err.path(), Some(fx.root.join("vol2/inbox").as_path()));

    let err = ws
        .move_entry(&source, &fx.root.join("vol2/inbox/x.md"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert_eq!(fs.mutations.load(Ordering::SeqCst), 0);
    assert!(source.exists());
}

#[cfg(unix)]
#[test]
fn test_symlinks_in_subtree_are_recreated() {
    let fx = Fixture::new();
    fs::write(fx.root.join("vol1/target.md"), "some content").unwrap();
    std::os::unix::fs::symlink("../../target.md", fx.root.join("vol1/a/b/link.md")).unwrap();
    let (mut ws, _fs) = fx.workspace(fx.volumes());
    let source = fx.root.join("vol1/a");
    let dest = fx.root.join("vol2/inbox/a");

    let outcome = ws.move_entry(&source, &dest).unwrap();

    assert_eq!(outcome.strategy, TransferStrategy::CopyVerifyDelete);
    assert_eq!(outcome.files, Some(3));
    assert!(!source.exists());
    let link = dest.join("b/link.md");
    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert_eq!(fs::read_link(&link).unwrap(), PathBuf::from("../../target.md"));
    assert_eq!(fs::read_to_string(dest.join("b/note.md")).unwrap(), "deep note");
}

#[test]
fn test_cross_volume_move_copies_verifies_and_deletes() {
    let fx = Fixture::new();
    let (mut ws, _fs) = fx.workspace(fx.volumes());
    let source = fx.root.join("vol1/a");
    let dest = fx.root.join("vol2/inbox/a");

    let plan = ws
        .plan_transfer(&source, &dest, TransferMode::Move)
        .unwrap();
    assert_eq!(plan.strategy, TransferStrategy::CopyVerifyDelete);
    let report = plan.preflight.unwrap();
    assert!(report.cross_volume);
    assert_eq!(report.file_count, 2);
    assert_eq!(report.dir_count, 2);

    let outcome = ws.move_entry(&source, &dest).unwrap();
    assert_eq!(outcome.strategy, TransferStrategy::CopyVerifyDelete);
    assert_eq!(outcome.files, Some(2));
    assert!(!source.exists());
    assert_eq!(fs::read_to_string(dest.join("b/note.md")).unwrap(), "deep note");
}

#[test]
fn test_cross_device_rename_falls_back_to_copy() {
    let fx = Fixture::new();
    let mut volumes = fx.volumes();
    volumes.rename_crosses_devices = true;
    let (mut ws, _fs) = fx.workspace(volumes);
    let source = fx.root.join("vol1/a/top.md");
    let dest = fx.root.join("vol1/top.md");

    let plan = ws.plan_transfer(&source, &dest, TransferMode::Move).unwrap();
    assert_eq!(plan.strategy, TransferStrategy::AtomicRename);
    assert!(plan.preflight.is_none());

    let outcome = ws.move_entry(&source, &dest).unwrap();
    assert!(outcome.fell_back);
    assert_eq!(outcome.strategy, TransferStrategy::CopyVerifyDelete);
    assert!(!source.exists());
    assert_eq!(fs::read_to_string(&dest).unwrap(), "top");
}

#[test]
fn test_rename_to_same_name_is_noop() {
    let fx = Fixture::new();
    let (mut ws, fs) = fx.workspace(fx.volumes());
    let path = fx.root.join("vol1/x.md");
    let before = ws.tree().capture_state();

    let outcome = ws.rename_entry(&path, "x").unwrap();

    assert_eq!(outcome, RenameOutcome::Unchanged);
    assert_eq!(fs.mutations.load(Ordering::SeqCst), 0);
    assert_eq!(ws.tree().capture_state(), before);
    assert!(path.exists());
}

#[test]
fn test_rename_rebases_open_document_and_expansion() {
    let fx = Fixture::new();
    let (mut ws, _fs) = fx.workspace(fx.volumes());
    let note = fx.root.join("vol1/a/b/note.md");
    ws.open_document(&note).unwrap();

    let outcome = ws.rename_entry(&fx.root.join("vol1/a"), "renamed").unwrap();
    assert!(matches!(outcome, RenameOutcome::Renamed { .. }));

    let moved = fx.root.join("vol1/renamed/b/note.md");
    assert_eq!(ws.session().current_document(), Some(moved.as_path()));
    let state = ws.tree().capture_state();
    assert!(state.expanded.contains(&fx.root.join("vol1/renamed/b")));
    assert!(!state.expanded.iter().any(|p| p.starts_with(fx.root.join("vol1/a"))));
    assert_eq!(ws.tree().selected_path(), Some(fx.root.join("vol1/renamed").as_path()));
}

#[test]
fn test_move_rebases_selection_and_current_document() {
    let fx = Fixture::new();
    let (mut ws, _fs) = fx.workspace(fx.volumes());
    let note = fx.root.join("vol1/a/b/note.md");
    ws.open_document(&note).unwrap();

    ws.move_entry(&fx.root.join("vol1/a"), &fx.root.join("vol2/inbox/a"))
        .unwrap();

    let moved = fx.root.join("vol2/inbox/a/b/note.md");
    assert_eq!(ws.session().current_document(), Some(moved.as_path()));
    assert_eq!(ws.tree().selected_path(), Some(moved.as_path()));
    assert!(ws.tree().find_node_by_path(&fx.root.join("vol1/a")).is_none());
}

#[test]
fn test_create_document_opens_and_selects() {
    let fx = Fixture::new();
    let (mut ws, _fs) = fx.workspace(fx.volumes());
    let target = fx.root.join("vol1/a/b/note.md");

    let created = ws.create_document(&target, "Next Steps").unwrap();

    let expected = fx.root.join("vol1/a/b/Next Steps.md");
    assert_eq!(created.path, expected);
    assert!(expected.is_file());
    assert_eq!(ws.session().current_document(), Some(expected.as_path()));
    assert_eq!(ws.tree().selected_path(), Some(expected.as_path()));
    let parent = ws.tree().find_node_by_path(&fx.root.join("vol1/a/b")).unwrap();
    assert!(ws.tree().get(parent).unwrap().is_expanded());
}

#[test]
fn test_create_existing_folder_fails_without_reload() {
    let fx = Fixture::new();
    let (mut ws, _fs) = fx.workspace(fx.volumes());
    let err = ws.create_folder(&fx.root.join("vol1"), "a").unwrap_err();
    assert!(matches!(err, TreeError::AlreadyExists { .. }));
}

#[test]
fn test_delete_clears_current_document() {
    let fx = Fixture::new();
    let (mut ws, _fs) = fx.workspace(fx.volumes());
    ws.open_document(&fx.root.join("vol1/a/b/note.md")).unwrap();

    let preview = ws.delete_preview(&fx.root.join("vol1/a")).unwrap();
    assert_eq!((preview.files, preview.folders), (1, 1));

    ws.delete_entry(&fx.root.join("vol1/a")).unwrap();

    assert!(ws.session().current_document().is_none());
    assert!(!fx.root.join("vol1/a").exists());
    assert!(ws.tree().find_node_by_path(&fx.root.join("vol1/a")).is_none());
    assert!(ws.tree().find_node_by_path(&fx.root.join("vol1/x.md")).is_some());
}

#[test]
fn test_refresh_picks_up_external_changes() {
    let fx = Fixture::new();
    let (mut ws, _fs) = fx.workspace(fx.volumes());
    ws.open_document(&fx.root.join("vol1/a/top.md")).unwrap();
    let before = ws.tree().capture_state();

    fs::write(fx.root.join("vol1/a/external.md"), "").unwrap();
    ws.refresh().unwrap();

    assert_eq!(ws.tree().capture_state(), before);
    assert!(
        ws.tree()
            .find_node_by_path(&fx.root.join("vol1/a/external.md"))
            .is_some()
    );
}

#[test]
fn test_drop_onto_file_targets_its_folder() {
    let fx = Fixture::new();
    let (mut ws, _fs) = fx.workspace(fx.volumes());
    let outcome = ws
        .drop_entry(
            &fx.root.join("vol1/a/top.md"),
            &fx.root.join("vol1/x.md"),
            TransferMode::Copy,
        )
        .unwrap();

    assert_eq!(outcome.destination, fx.root.join("vol1/a/x.md"));
    assert_eq!(outcome.strategy, TransferStrategy::CopyVerify);
    assert!(fx.root.join("vol1/x.md").exists());
}

#[tokio::test]
async fn test_background_transfer_blocks_mutations_until_done() {
    let fx = Fixture::new();
    let (mut ws, _fs) = fx.workspace(fx.volumes());
    let source = fx.root.join("vol1/a");

    let mut rx = ws
        .start_transfer(
            &source,
            fx.root.join("vol2/a"),
            TransferMode::Move,
            CancellationToken::new(),
        )
        .unwrap();

    assert!(ws.is_transfer_in_flight());
    assert!(ws.create_folder(&fx.root.join("vol1"), "blocked").is_err());

    let mut saw_preflight = false;
    let mut outcome = None;
    while let Some(event) = rx.recv().await {
        match event {
            TransferEvent::Preflight(report) => {
                saw_preflight = true;
                assert_eq!(report.file_count, 2);
            }
            TransferEvent::Completed(done) => outcome = Some(done),
            TransferEvent::Failed(err) => panic!("transfer failed: {err}"),
            TransferEvent::Planned(_) | TransferEvent::Progress(_) => {}
        }
    }

    let outcome = outcome.unwrap();
    assert!(saw_preflight);
    assert!(!ws.is_transfer_in_flight());
    ws.complete_transfer(Some(&outcome));
    let tree = ws.tree_mut().unwrap();
    assert!(tree.reveal(&fx.root.join("vol2/a/b/note.md")).is_some());
    assert!(!source.exists());
}

#[tokio::test]
async fn test_background_transfer_reports_failure_kind() {
    let fx = Fixture::new();
    let mut volumes = fx.volumes();
    volumes.vol2_free = Some(0);
    let (mut ws, _fs) = fx.workspace(volumes);

    let mut rx = ws
        .start_transfer(
            &fx.root.join("vol1/x.md"),
            fx.root.join("vol2/x.md"),
            TransferMode::Copy,
            CancellationToken::new(),
        )
        .unwrap();

    let mut failure = None;
    while let Some(event) = rx.recv().await {
        if let TransferEvent::Failed(err) = event {
            failure = Some(err);
        }
    }
    let failure = failure.unwrap();
    assert_eq!(failure.kind, ErrorKind::InsufficientSpace);
    assert!(!ws.is_transfer_in_flight());
}

#[tokio::test]
async fn test_cancelled_transfer_touches_nothing() {
    let fx = Fixture::new();
    let (mut ws, fs) = fx.workspace(fx.volumes());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut rx = ws
        .start_transfer(
            &fx.root.join("vol1/a"),
            fx.root.join("vol2/a"),
            TransferMode::Move,
            cancel,
        )
        .unwrap();

    let mut kinds = Vec::new();
    while let Some(event) = rx.recv().await {
        if let TransferEvent::Failed(err) = event {
            kinds.push(err.kind);
        }
    }
    assert_eq!(kinds, vec![ErrorKind::Cancelled]);
    assert_eq!(fs.mutations.load(Ordering::SeqCst), 0);
    ws.complete_transfer(None);
    assert!(fx.root.join("vol1/a/top.md").exists());
}
