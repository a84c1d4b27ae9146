//! Lexical path helpers for canonical-path identity.

use std::path::{Component, Path, PathBuf};

/// Normalize a path lexically: drop `.` components, resolve `..` against
/// preceding components and strip trailing separators. Never touches the
/// filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                ) && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve a path to its canonical form, falling back to lexical
/// normalization against the current directory when it does not exist.
pub fn canonicalize_lossy(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    normalize_path(&absolute)
}

/// Check whether `path` equals `ancestor` or lies beneath it, comparing
/// whole components.
pub fn is_same_or_descendant(path: &Path, ancestor: &Path) -> bool {
    path.starts_with(ancestor)
}

/// Substitute the `to` prefix for the `from` prefix of `path`.
///
/// Returns `None` when `path` is neither `from` nor nested under it.
pub fn rebase_path(path: &Path, from: &Path, to: &Path) -> Option<PathBuf> {
    let rest = path.strip_prefix(from).ok()?;
    if rest.as_os_str().is_empty() {
        Some(to.to_path_buf())
    } else {
        Some(to.join(rest))
    }
}

/// Number of normal components, used to order paths ancestors-first.
pub fn depth(path: &Path) -> usize {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("/a/./b/")), PathBuf::from("/a/b"));
        assert_eq!(normalize_path(Path::new("/a/b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize_path(Path::new("/../a")), PathBuf::from("/a"));
        assert_eq!(normalize_path(Path::new("../a")), PathBuf::from("../a"));
    }

    #[test]
    fn test_descendant_is_component_wise() {
        assert!(is_same_or_descendant(Path::new("/a/b/c"), Path::new("/a/b")));
        assert!(is_same_or_descendant(Path::new("/a/b"), Path::new("/a/b")));
        assert!(!is_same_or_descendant(Path::new("/a/bc"), Path::new("/a/b")));
    }

    #[test]
    fn test_rebase_path() {
        let from = Path::new("/notes/old");
        let to = Path::new("/archive/new");
        assert_eq!(
            rebase_path(Path::new("/notes/old/x/y.md"), from, to),
            Some(PathBuf::from("/archive/new/x/y.md"))
        );
        assert_eq!(
            rebase_path(Path::new("/notes/old"), from, to),
            Some(PathBuf::from("/archive/new"))
        );
        assert_eq!(rebase_path(Path::new("/notes/older/a.md"), from, to), None);
    }

    #[test]
    fn test_depth() {
        assert_eq!(depth(Path::new("/")), 0);
        assert_eq!(depth(Path::new("/a/b")), 2);
    }
}
