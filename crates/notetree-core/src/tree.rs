//! Arena-backed document tree with lazy child loading.

use std::path::{Path, PathBuf};

use crate::config::TreeConfig;
use crate::error::{Result, TreeError};
use crate::listing::{ListedEntry, has_loadable_children, list_children};
use crate::node::{LoadState, Node, NodeId, NodeKind};
use crate::paths::{canonicalize_lossy, normalize_path};

/// Lazily populated tree of directories and documents under a root directory.
///
/// Parents exclusively own their ordered child lists; a child only records the
/// id of its parent. The root node lives for the whole session.
#[derive(Debug)]
pub struct DocumentTree {
    config: TreeConfig,
    nodes: Vec<Option<Node>>,
    free: Vec<NodeId>,
    root: NodeId,
    pub(crate) selected: Option<NodeId>,
    pub(crate) scroll_anchor: Option<NodeId>,
}

impl DocumentTree {
    /// Create a tree bound to `config.root` and expand the root.
    pub fn new(config: TreeConfig) -> Result<Self> {
        let root_path = canonicalize_lossy(&config.root);
        let metadata = std::fs::metadata(&root_path).map_err(|e| TreeError::io(&root_path, e))?;
        if !metadata.is_dir() {
            return Err(TreeError::invalid(&root_path, "root is not a directory"));
        }

        let root_id = NodeId::new(0);
        let root = Node::new(
            root_id,
            root_path,
            NodeKind::Directory,
            None,
            LoadState::Unloaded { expandable: true },
        );

        let mut tree = Self {
            config,
            nodes: vec![Some(root)],
            free: Vec::new(),
            root: root_id,
            selected: None,
            scroll_anchor: None,
        };
        tree.expand(root_id)?;
        Ok(tree)
    }

    /// Configuration the tree was built with.
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Id of the root node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Canonical path of the root directory.
    pub fn root_path(&self) -> &Path {
        self.node(self.root).path()
    }

    /// Look up a node by id.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Look up a node that is known to be live.
    pub(crate) fn node(&self, id: NodeId) -> &Node {
        match self.get(id) {
            Some(node) => node,
            None => unreachable!("stale node id {id:?}"),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        match self.get_mut(id) {
            Some(node) => node,
            None => unreachable!("stale node id {id:?}"),
        }
    }

    /// Children of a node, in display order.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(Node::children).unwrap_or_default()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Whether the tree holds only its root.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// Currently selected node.
    pub fn selected(&self) -> Option<NodeId> {
        self.selected
    }

    /// Path of the currently selected node.
    pub fn selected_path(&self) -> Option<&Path> {
        self.selected.and_then(|id| self.get(id)).map(Node::path)
    }

    /// Select a node (or clear the selection).
    pub fn select(&mut self, id: Option<NodeId>) {
        self.selected = id.filter(|id| self.get(*id).is_some());
    }

    /// Node the view is scrolled to.
    pub fn scroll_anchor(&self) -> Option<NodeId> {
        self.scroll_anchor
    }

    /// Record the node the view is scrolled to.
    pub fn set_scroll_anchor(&mut self, id: Option<NodeId>) {
        self.scroll_anchor = id.filter(|id| self.get(*id).is_some());
    }

    fn alloc(&mut self, path: PathBuf, kind: NodeKind, parent: NodeId) -> NodeId {
        let load_state = match kind {
            NodeKind::Directory => LoadState::Unloaded {
                expandable: has_loadable_children(&path, &self.config),
            },
            NodeKind::Document => LoadState::Loaded,
        };

        match self.free.pop() {
            Some(id) => {
                self.nodes[id.index()] = Some(Node::new(id, path, kind, Some(parent), load_state));
                id
            }
            None => {
                let id = NodeId::new(self.nodes.len() as u32);
                self.nodes
                    .push(Some(Node::new(id, path, kind, Some(parent), load_state)));
                id
            }
        }
    }

    pub(crate) fn alloc_entry(&mut self, entry: ListedEntry, parent: NodeId) -> NodeId {
        self.alloc(entry.path, entry.kind, parent)
    }

    /// Discard a node and its whole subtree.
    pub(crate) fn release_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(current.index()).and_then(Option::take) {
                stack.extend(node.children);
                self.free.push(current);
                if self.selected == Some(current) {
                    self.selected = None;
                }
                if self.scroll_anchor == Some(current) {
                    self.scroll_anchor = None;
                }
            }
        }
    }

    /// Replace a directory's children with a fresh listing.
    pub(crate) fn load_children(&mut self, id: NodeId) {
        let path = self.node(id).path.clone();
        let listing = list_children(&path, &self.config);

        let old = std::mem::take(&mut self.node_mut(id).children);
        for child in old {
            self.release_subtree(child);
        }

        if let Some(err) = listing.error {
            tracing::warn!(path = %path.display(), error = %err, "could not list directory");
            self.node_mut(id).load_state = LoadState::Error {
                message: err.to_string(),
            };
            return;
        }

        let children: Vec<NodeId> = listing
            .entries
            .into_iter()
            .map(|entry| self.alloc_entry(entry, id))
            .collect();

        let node = self.node_mut(id);
        node.children = children;
        node.load_state = LoadState::Loaded;
    }

    /// Expand a directory, loading its children on first expansion.
    ///
    /// Listing failures do not fail the call; they leave the node in
    /// [`LoadState::Error`].
    pub fn expand(&mut self, id: NodeId) -> Result<()> {
        let node = self
            .get(id)
            .ok_or_else(|| TreeError::invalid(PathBuf::new(), format!("unknown node {id:?}")))?;
        if !node.is_dir() {
            return Err(TreeError::invalid(&node.path, "documents cannot be expanded"));
        }

        if !node.load_state.is_loaded() {
            self.load_children(id);
        }
        self.node_mut(id).expanded = true;
        Ok(())
    }

    /// Collapse a directory. Loaded children are kept.
    pub fn collapse(&mut self, id: NodeId) {
        if let Some(node) = self.get_mut(id) {
            node.expanded = false;
        }
    }

    /// Make sure every directory on the way from the root to `path` has
    /// loaded children, without changing expansion. Returns the node for
    /// `path` when it exists.
    pub(crate) fn materialize_path(&mut self, path: &Path) -> Option<NodeId> {
        let target = normalize_path(path);
        let mut current = self.root;
        loop {
            if self.node(current).path == target {
                return Some(current);
            }
            if !self.node(current).is_dir() {
                return None;
            }
            if !self.node(current).load_state.is_loaded() {
                self.load_children(current);
            }
            current = self
                .node(current)
                .children
                .iter()
                .copied()
                .find(|child| target.starts_with(&self.node(*child).path))?;
        }
    }

    /// Load and expand every ancestor of `path` so its node is visible.
    /// Returns the node when the path is represented.
    pub fn reveal(&mut self, path: &Path) -> Option<NodeId> {
        let id = self.materialize_path(path)?;
        let mut ancestor = self.node(id).parent;
        while let Some(current) = ancestor {
            self.node_mut(current).expanded = true;
            ancestor = self.node(current).parent;
        }
        Some(id)
    }

    /// Find a node by exact canonical-path match among materialized nodes.
    ///
    /// Unloaded and errored directories contribute no candidates.
    pub fn find_node_by_path(&self, path: &Path) -> Option<NodeId> {
        let target = normalize_path(path);
        let mut current = self.root;
        if !target.starts_with(&self.node(current).path) {
            return None;
        }
        loop {
            let node = self.node(current);
            if node.path == target {
                return Some(current);
            }
            current = node
                .children
                .iter()
                .copied()
                .find(|child| target.starts_with(&self.node(*child).path))?;
        }
    }

    /// Depth-first, pre-order list of the nodes a view would display: the
    /// root, then the children of every expanded directory.
    pub fn visible_nodes(&self) -> Vec<(usize, NodeId)> {
        let mut out = Vec::new();
        let mut stack = vec![(0usize, self.root)];
        while let Some((depth, id)) = stack.pop() {
            out.push((depth, id));
            let node = self.node(id);
            if node.expanded {
                for child in node.children.iter().rev() {
                    stack.push((depth + 1, *child));
                }
            }
        }
        out
    }

    /// Ids of all live nodes in pre-order.
    pub(crate) fn walk(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.node(id).children.iter().rev().copied());
        }
        out
    }

    pub(crate) fn set_children(&mut self, id: NodeId, children: Vec<NodeId>) {
        let node = self.node_mut(id);
        node.children = children;
        node.load_state = LoadState::Loaded;
    }

    pub(crate) fn set_load_error(&mut self, id: NodeId, message: String) {
        let old = std::mem::take(&mut self.node_mut(id).children);
        for child in old {
            self.release_subtree(child);
        }
        self.node_mut(id).load_state = LoadState::Error { message };
    }

    pub(crate) fn refresh_expandable(&mut self, id: NodeId) {
        let expandable = has_loadable_children(&self.node(id).path, &self.config);
        if let LoadState::Unloaded { expandable: flag } = &mut self.node_mut(id).load_state {
            *flag = expandable;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("journal/2024")).unwrap();
        fs::create_dir(root.join("empty")).unwrap();
        fs::write(root.join("readme.md"), "# hi").unwrap();
        fs::write(root.join("journal/day.md"), "day").unwrap();
        fs::write(root.join("journal/2024/jan.md"), "jan").unwrap();
        fs::write(root.join("ignored.txt"), "x").unwrap();
        temp
    }

    #[test]
    fn test_root_is_expanded_and_loaded() {
        let temp = create_test_tree();
        let tree = DocumentTree::new(TreeConfig::new(temp.path())).unwrap();
        let root = tree.get(tree.root()).unwrap();

        assert!(root.is_expanded());
        assert!(root.load_state().is_loaded());
        let names: Vec<&str> = tree
            .children(tree.root())
            .iter()
            .map(|id| tree.get(*id).unwrap().name())
            .collect();
        assert_eq!(names, vec!["empty", "journal", "readme.md"]);
    }

    #[test]
    fn test_unexpanded_directory_is_unloaded() {
        let temp = create_test_tree();
        let tree = DocumentTree::new(TreeConfig::new(temp.path())).unwrap();

        let journal = tree.find_node_by_path(&tree.root_path().join("journal")).unwrap();
        let empty = tree.find_node_by_path(&tree.root_path().join("empty")).unwrap();
        assert_eq!(
            tree.get(journal).unwrap().load_state(),
            &LoadState::Unloaded { expandable: true }
        );
        assert!(!tree.get(empty).unwrap().has_expander());
        assert!(tree.children(journal).is_empty());
    }

    #[test]
    fn test_expand_loads_children_once() {
        let temp = create_test_tree();
        let mut tree = DocumentTree::new(TreeConfig::new(temp.path())).unwrap();
        let journal = tree.find_node_by_path(&tree.root_path().join("journal")).unwrap();

        tree.expand(journal).unwrap();
        let first: Vec<NodeId> = tree.children(journal).to_vec();
        assert_eq!(first.len(), 2);

        tree.collapse(journal);
        tree.expand(journal).unwrap();
        assert_eq!(tree.children(journal), first.as_slice());
    }

    #[test]
    fn test_find_node_by_path_skips_unloaded() {
        let temp = create_test_tree();
        let tree = DocumentTree::new(TreeConfig::new(temp.path())).unwrap();
        let jan = tree.root_path().join("journal/2024/jan.md");

        assert!(tree.find_node_by_path(&jan).is_none());
        assert!(tree.find_node_by_path(Path::new("/definitely/elsewhere")).is_none());
    }

    #[test]
    fn test_find_node_normalizes_query() {
        let temp = create_test_tree();
        let tree = DocumentTree::new(TreeConfig::new(temp.path())).unwrap();
        let query = tree.root_path().join("journal/../readme.md");
        let found = tree.find_node_by_path(&query).unwrap();
        assert_eq!(tree.get(found).unwrap().name(), "readme.md");
    }

    #[test]
    fn test_reveal_expands_ancestors() {
        let temp = create_test_tree();
        let mut tree = DocumentTree::new(TreeConfig::new(temp.path())).unwrap();
        let jan = tree.root_path().join("journal/2024/jan.md");

        let id = tree.reveal(&jan).unwrap();
        assert_eq!(tree.get(id).unwrap().name(), "jan.md");
        let year = tree.get(id).unwrap().parent().unwrap();
        assert!(tree.get(year).unwrap().is_expanded());
        assert!(tree.visible_nodes().iter().any(|(_, v)| *v == id));
        assert!(tree.reveal(&tree.root_path().join("journal/none.md")).is_none());
    }

    #[test]
    fn test_expand_document_is_rejected() {
        let temp = create_test_tree();
        let mut tree = DocumentTree::new(TreeConfig::new(temp.path())).unwrap();
        let readme = tree.find_node_by_path(&tree.root_path().join("readme.md")).unwrap();
        assert!(matches!(
            tree.expand(readme),
            Err(TreeError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn test_root_must_be_directory() {
        let temp = create_test_tree();
        let err = DocumentTree::new(TreeConfig::new(temp.path().join("readme.md"))).unwrap_err();
        assert!(matches!(err, TreeError::InvalidOperation { .. }));
    }

    #[test]
    fn test_visible_nodes_follow_expansion() {
        let temp = create_test_tree();
        let mut tree = DocumentTree::new(TreeConfig::new(temp.path())).unwrap();
        assert_eq!(tree.visible_nodes().len(), 4);

        let journal = tree.find_node_by_path(&tree.root_path().join("journal")).unwrap();
        tree.expand(journal).unwrap();
        let visible = tree.visible_nodes();
        assert_eq!(visible.len(), 6);
        assert_eq!(visible[2], (1, journal));
        assert_eq!(visible[3].0, 2);
    }
}
