//! Filesystem provider used by every mutating operation.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Identifier of the storage volume an entry lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VolumeId(pub u64);

/// Kind of a filesystem entry, without following symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Other,
}

/// Metadata the operations need about one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryStat {
    pub kind: EntryKind,
    pub size: u64,
    pub volume: VolumeId,
    pub readonly: bool,
}

impl EntryStat {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Operations consumed from the underlying filesystem.
///
/// Implementations must be usable from a blocking worker thread.
pub trait FileSystem: Send + Sync {
    /// Immediate entries of a directory, in no particular order.
    fn enumerate(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Metadata for `path`. Symlinks are reported as such.
    fn stat(&self, path: &Path) -> io::Result<EntryStat>;

    /// Open a file for streamed reading.
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Copy one file's contents, returning the number of bytes copied.
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64>;

    fn create_dir(&self, path: &Path) -> io::Result<()>;

    /// Create an empty file, failing if anything already exists at `path`.
    fn create_file(&self, path: &Path) -> io::Result<()>;

    /// Remove a file, or a directory with everything beneath it.
    fn remove_all(&self, path: &Path) -> io::Result<()>;

    /// Target a symlink points to, unresolved.
    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;

    /// Create a symlink at `link` pointing to `target`.
    fn create_symlink(&self, target: &Path, link: &Path) -> io::Result<()>;

    /// Bytes available to the current user on the volume holding `path`.
    fn free_space(&self, path: &Path) -> io::Result<u64>;

    /// Succeeds if the current user can create entries in `dir`.
    fn check_writable(&self, dir: &Path) -> io::Result<()>;

    /// Whether anything (including a dangling symlink) exists at `path`.
    fn exists(&self, path: &Path) -> bool {
        self.stat(path).is_ok()
    }
}

/// [`FileSystem`] backed by the local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl FileSystem for LocalFs {
    fn enumerate(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect()
    }

    fn stat(&self, path: &Path) -> io::Result<EntryStat> {
        let metadata = fs::symlink_metadata(path)?;
        let file_type = metadata.file_type();
        let kind = if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else if file_type.is_symlink() {
            EntryKind::Symlink
        } else {
            EntryKind::Other
        };

        Ok(EntryStat {
            kind,
            size: if kind == EntryKind::File { metadata.len() } else { 0 },
            volume: volume_of(path, &metadata),
            readonly: metadata.permissions().readonly(),
        })
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(path)?))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64> {
        fs::copy(from, to)
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir(path)
    }

    fn create_file(&self, path: &Path) -> io::Result<()> {
        OpenOptions::new().write(true).create_new(true).open(path)?;
        Ok(())
    }

    fn remove_all(&self, path: &Path) -> io::Result<()> {
        if fs::symlink_metadata(path)?.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        }
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        fs::read_link(path)
    }

    fn create_symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        symlink(target, link)
    }

    fn free_space(&self, path: &Path) -> io::Result<u64> {
        fs2::available_space(path)
    }

    fn check_writable(&self, dir: &Path) -> io::Result<()> {
        // Permission bits miss ownership and ACLs.
        tempfile::Builder::new()
            .prefix(".notetree-")
            .tempfile_in(dir)
            .map(drop)
    }
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    let resolved = link.parent().map(|p| p.join(target)).unwrap_or_else(|| target.to_path_buf());
    if resolved.is_dir() {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    }
}

#[cfg(not(any(unix, windows)))]
fn symlink(_target: &Path, link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("symlinks are not supported here: {}", link.display()),
    ))
}

/// Get the volume id from metadata.
#[cfg(unix)]
fn volume_of(_path: &Path, metadata: &fs::Metadata) -> VolumeId {
    use std::os::unix::fs::MetadataExt;
    VolumeId(metadata.dev())
}

/// Without device ids, entries sharing a path prefix (drive letter or UNC
/// share) are treated as one volume.
#[cfg(not(unix))]
fn volume_of(path: &Path, _metadata: &fs::Metadata) -> VolumeId {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::path::Component;

    let absolute = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let mut hasher = DefaultHasher::new();
    if let Some(Component::Prefix(prefix)) = absolute.components().next() {
        prefix.as_os_str().hash(&mut hasher);
    }
    VolumeId(hasher.finish())
}
