//! Reconciling materialized subtrees with the filesystem.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Result, TreeError};
use crate::listing::list_children;
use crate::node::{LoadState, NodeId, NodeKind};
use crate::tree::DocumentTree;

impl DocumentTree {
    /// Re-list the immediate children of the directory at `path` and
    /// reconcile them in place.
    ///
    /// Children whose path and kind are unchanged keep their id, subtree and
    /// expansion. Removed children are discarded with their subtrees and new
    /// ones are inserted in sibling order. A directory that was never loaded
    /// only has its expandability recomputed.
    ///
    /// Fails when `path` is not represented in the tree, is not a directory
    /// node, or can no longer be listed. Callers fall back to [`reload`].
    ///
    /// [`reload`]: DocumentTree::reload
    pub fn refresh_subtree(&mut self, path: &Path) -> Result<()> {
        let id = self
            .find_node_by_path(path)
            .ok_or_else(|| TreeError::NotFound {
                path: path.to_path_buf(),
            })?;
        let node = self.node(id);
        if !node.is_dir() {
            return Err(TreeError::invalid(node.path(), "not a directory node"));
        }
        let dir_path = node.path().to_path_buf();

        if !std::fs::metadata(&dir_path).is_ok_and(|m| m.is_dir()) {
            return Err(TreeError::invalid(&dir_path, "no longer a directory"));
        }

        if matches!(node.load_state(), LoadState::Unloaded { .. }) {
            self.refresh_expandable(id);
            return Ok(());
        }

        let listing = list_children(&dir_path, self.config());
        if let Some(err) = listing.error {
            self.set_load_error(id, err.to_string());
            return Err(err);
        }

        let mut existing: HashMap<(PathBuf, NodeKind), NodeId> = self
            .children(id)
            .iter()
            .map(|child| {
                let node = self.node(*child);
                ((node.path().to_path_buf(), node.kind()), *child)
            })
            .collect();

        let mut children = Vec::with_capacity(listing.entries.len());
        let mut added = 0usize;
        for entry in listing.entries {
            match existing.remove(&(entry.path.clone(), entry.kind)) {
                Some(kept) => {
                    if matches!(self.node(kept).load_state(), LoadState::Unloaded { .. }) {
                        self.refresh_expandable(kept);
                    }
                    children.push(kept);
                }
                None => {
                    added += 1;
                    children.push(self.alloc_entry(entry, id));
                }
            }
        }

        let removed = existing.len();
        for (_, stale) in existing {
            self.release_subtree(stale);
        }
        self.set_children(id, children);

        tracing::debug!(
            path = %dir_path.display(),
            added,
            removed,
            "refreshed subtree"
        );
        Ok(())
    }

    /// Discard every materialized node and rebuild the tree from the root.
    ///
    /// The root node keeps its id and is left expanded. Selection and
    /// scroll anchor are cleared; use [`capture_state`] and [`apply_state`]
    /// to carry them across.
    ///
    /// [`capture_state`]: DocumentTree::capture_state
    /// [`apply_state`]: DocumentTree::apply_state
    pub fn reload(&mut self) {
        let root = self.root();
        tracing::debug!(root = %self.root_path().display(), "full tree reload");
        self.selected = None;
        self.scroll_anchor = None;
        self.load_children(root);
        // A listing failure leaves the root expanded in the error state.
        if let Some(node) = self.get_mut(root) {
            node.expanded = true;
        }
    }
}
