//! Document tree node types.

use std::path::{Path, PathBuf};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Index of a node inside a [`DocumentTree`](crate::DocumentTree) arena.
///
/// Ids are only meaningful for the tree that issued them and may be reused
/// after the node they named is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Create a new NodeId from a raw index.
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Kind of entry a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// A directory.
    Directory,
    /// A file bearing the document extension.
    Document,
}

impl NodeKind {
    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, NodeKind::Directory)
    }

    /// Check if this is a document.
    pub fn is_document(&self) -> bool {
        matches!(self, NodeKind::Document)
    }
}

/// Whether a directory's children have been enumerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadState {
    /// Children not yet listed. `expandable` records whether the directory
    /// holds at least one qualifying entry.
    Unloaded { expandable: bool },
    /// Children listed and materialized.
    Loaded,
    /// Listing failed; the node shows this message in place of children.
    Error { message: String },
}

impl LoadState {
    /// Check whether children are materialized.
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadState::Loaded)
    }

    /// Check whether the last listing attempt failed.
    pub fn is_error(&self) -> bool {
        matches!(self, LoadState::Error { .. })
    }
}

/// A single directory or document in the tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) path: PathBuf,
    pub(crate) name: CompactString,
    pub(crate) kind: NodeKind,
    pub(crate) load_state: LoadState,
    pub(crate) expanded: bool,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

impl Node {
    pub(crate) fn new(
        id: NodeId,
        path: PathBuf,
        kind: NodeKind,
        parent: Option<NodeId>,
        load_state: LoadState,
    ) -> Self {
        let name = path
            .file_name()
            .map(|n| CompactString::new(n.to_string_lossy()))
            .unwrap_or_else(|| CompactString::new(path.to_string_lossy()));

        Self {
            id,
            path,
            name,
            kind,
            load_state,
            expanded: false,
            parent,
            children: Vec::new(),
        }
    }

    /// Arena id of this node.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Canonical absolute path (the node's identity).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Display name (final path component).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory or document.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Child enumeration state.
    pub fn load_state(&self) -> &LoadState {
        &self.load_state
    }

    /// Whether the node is currently expanded.
    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    /// Parent node, `None` for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Ordered children (directories first, then case-insensitive name).
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Check if this node is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Whether the UI should offer an expand affordance.
    pub fn has_expander(&self) -> bool {
        match &self.load_state {
            _ if !self.is_dir() => false,
            LoadState::Unloaded { expandable } => *expandable,
            LoadState::Loaded => !self.children.is_empty(),
            LoadState::Error { .. } => true,
        }
    }
}
