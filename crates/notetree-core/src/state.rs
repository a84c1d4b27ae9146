//! Capturing and restoring view state across tree rebuilds.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::paths::{depth, rebase_path};
use crate::tree::DocumentTree;

/// Snapshot of the view-relevant state of a tree, keyed by canonical path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeState {
    /// Every expanded directory.
    pub expanded: BTreeSet<PathBuf>,
    /// Selected entry.
    pub selected: Option<PathBuf>,
    /// Entry the view was scrolled to.
    pub scroll_anchor: Option<PathBuf>,
}

impl TreeState {
    /// Rewrite every path equal to or nested under `from` onto `to`.
    ///
    /// Used after a rename or move so the restored state follows the entry.
    pub fn rebase(&mut self, from: &Path, to: &Path) {
        self.expanded = std::mem::take(&mut self.expanded)
            .into_iter()
            .map(|path| rebase_path(&path, from, to).unwrap_or(path))
            .collect();
        for slot in [&mut self.selected, &mut self.scroll_anchor] {
            if let Some(new) = slot.as_deref().and_then(|p| rebase_path(p, from, to)) {
                *slot = Some(new);
            }
        }
    }

    /// Drop every path equal to or nested under `removed`.
    pub fn forget(&mut self, removed: &Path) {
        self.expanded.retain(|path| !path.starts_with(removed));
        for slot in [&mut self.selected, &mut self.scroll_anchor] {
            if slot.as_deref().is_some_and(|p| p.starts_with(removed)) {
                *slot = None;
            }
        }
    }
}

impl DocumentTree {
    /// Record expanded directories, the selection and the scroll anchor.
    pub fn capture_state(&self) -> TreeState {
        let expanded = self
            .walk()
            .into_iter()
            .map(|id| self.node(id))
            .filter(|node| node.is_expanded())
            .map(|node| node.path().to_path_buf())
            .collect();

        TreeState {
            expanded,
            selected: self.selected_path().map(Path::to_path_buf),
            scroll_anchor: self
                .scroll_anchor()
                .and_then(|id| self.get(id))
                .map(|node| node.path().to_path_buf()),
        }
    }

    /// Restore a captured state.
    ///
    /// Directories not in the set are collapsed. Recorded directories are
    /// expanded ancestors first, loading (but not expanding) any directory
    /// on the way that is needed to reach them. Paths that no longer exist
    /// are skipped.
    pub fn apply_state(&mut self, state: &TreeState) {
        for id in self.walk() {
            let node = self.node(id);
            if node.is_expanded() && !state.expanded.contains(node.path()) {
                self.collapse(id);
            }
        }

        let mut ordered: Vec<&PathBuf> = state.expanded.iter().collect();
        ordered.sort_by_key(|path| depth(path));

        let mut missing = 0usize;
        for path in ordered {
            match self.materialize_path(path) {
                Some(id) if self.node(id).is_dir() => {
                    if let Err(err) = self.expand(id) {
                        tracing::debug!(path = %path.display(), error = %err, "could not re-expand");
                    }
                }
                _ => missing += 1,
            }
        }

        let selected = state.selected.as_deref().and_then(|p| self.materialize_path(p));
        self.select(selected);
        let anchor = state
            .scroll_anchor
            .as_deref()
            .and_then(|p| self.materialize_path(p));
        self.set_scroll_anchor(anchor);

        if missing > 0 {
            tracing::debug!(missing, "expanded paths no longer present");
        }
    }
}
