//! Display tree assembled from search matches.
//!
//! The tree is rooted at the deepest directory shared by every match's
//! parent. It owns its own nodes and never refers back to the live
//! document tree.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use compact_str::CompactString;

/// One path segment in a [`ResultTree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultNode {
    pub name: CompactString,
    pub path: PathBuf,
    /// Whether this path was itself reported as a match.
    pub is_match: bool,
    children: Vec<usize>,
}

impl ResultNode {
    fn new(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        Self {
            name: CompactString::from(name.as_ref()),
            path,
            is_match: false,
            children: Vec::new(),
        }
    }
}

/// Read-only, fully expanded tree of search matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultTree {
    nodes: Vec<ResultNode>,
    matched: usize,
}

impl ResultTree {
    /// Assemble matches into a tree. Returns `None` when there are none.
    pub fn build<P: AsRef<Path>>(matches: &[P]) -> Option<Self> {
        let ancestor = common_ancestor(matches.iter().map(AsRef::as_ref))?;

        let mut nodes = vec![ResultNode::new(ancestor.clone())];
        let mut index: HashMap<PathBuf, usize> = HashMap::new();
        let mut seen = HashSet::new();

        for path in matches.iter().map(AsRef::as_ref) {
            if !seen.insert(path) {
                continue;
            }
            let Ok(relative) = path.strip_prefix(&ancestor) else {
                continue;
            };

            let mut parent = 0;
            let mut current = ancestor.clone();
            for segment in relative.components() {
                current.push(segment);
                parent = match index.get(&current) {
                    Some(&id) => id,
                    None => {
                        let id = nodes.len();
                        nodes.push(ResultNode::new(current.clone()));
                        nodes[parent].children.push(id);
                        index.insert(current.clone(), id);
                        id
                    }
                };
            }
            nodes[parent].is_match = true;
        }

        let names: Vec<_> = nodes.iter().map(|n| n.name.to_lowercase()).collect();
        for node in &mut nodes {
            node.children.sort_by(|&a, &b| names[a].cmp(&names[b]));
        }

        Some(Self {
            nodes,
            matched: seen.len(),
        })
    }

    /// The shared ancestor directory.
    pub fn root(&self) -> &ResultNode {
        &self.nodes[0]
    }

    /// Number of distinct matched paths.
    pub fn matched(&self) -> usize {
        self.matched
    }

    pub fn children(&self, node: &ResultNode) -> impl Iterator<Item = &ResultNode> {
        node.children.iter().map(|&id| &self.nodes[id])
    }

    /// Every node in display order with its depth below the root.
    pub fn rows(&self) -> Vec<(usize, &ResultNode)> {
        let mut rows = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(0usize, 0usize)];
        while let Some((depth, id)) = stack.pop() {
            let node = &self.nodes[id];
            rows.push((depth, node));
            for &child in node.children.iter().rev() {
                stack.push((depth + 1, child));
            }
        }
        rows
    }
}

/// Deepest directory containing the parent of every path.
fn common_ancestor<'a>(mut paths: impl Iterator<Item = &'a Path>) -> Option<PathBuf> {
    let first = paths.next()?;
    let mut ancestor = first.parent().unwrap_or(first).to_path_buf();
    for path in paths {
        let parent = path.parent().unwrap_or(path);
        while !parent.starts_with(&ancestor) {
            if !ancestor.pop() {
                break;
            }
        }
    }
    Some(ancestor)
}
