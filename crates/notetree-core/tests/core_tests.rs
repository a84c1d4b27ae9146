use notetree_core::{
    DocumentTree, LoadState, NodeKind, TreeConfig, TreeError, TreeState, list_children,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn create_notes() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("Projects/rust/notes")).unwrap();
    fs::create_dir_all(root.join("archive")).unwrap();
    fs::write(root.join("Projects/plan.md"), "# plan").unwrap();
    fs::write(root.join("Projects/rust/notes/borrow.md"), "borrow").unwrap();
    fs::write(root.join("archive/old.md"), "old").unwrap();
    fs::write(root.join("Inbox.md"), "").unwrap();
    fs::write(root.join("ideas.md"), "").unwrap();
    temp
}

fn names(tree: &DocumentTree, parent: &Path) -> Vec<String> {
    let id = tree.find_node_by_path(parent).unwrap();
    tree.children(id)
        .iter()
        .map(|c| tree.get(*c).unwrap().name().to_string())
        .collect()
}

fn expand_path(tree: &mut DocumentTree, path: &Path) {
    let id = tree.find_node_by_path(path).unwrap();
    tree.expand(id).unwrap();
}

#[test]
fn test_directories_first_case_insensitive() {
    let temp = create_notes();
    let config = TreeConfig::new(temp.path());
    let listing = list_children(temp.path(), &config);

    let kinds: Vec<NodeKind> = listing.entries.iter().map(|e| e.kind).collect();
    let names: Vec<&str> = listing.entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["archive", "Projects", "ideas.md", "Inbox.md"]);
    assert_eq!(
        kinds,
        vec![
            NodeKind::Directory,
            NodeKind::Directory,
            NodeKind::Document,
            NodeKind::Document
        ]
    );
}

#[test]
fn test_refresh_twice_preserves_deep_expansion() {
    let temp = create_notes();
    let mut tree = DocumentTree::new(TreeConfig::new(temp.path())).unwrap();
    let root = tree.root_path().to_path_buf();
    expand_path(&mut tree, &root.join("Projects"));
    expand_path(&mut tree, &root.join("Projects/rust"));
    expand_path(&mut tree, &root.join("Projects/rust/notes"));
    let before = tree.capture_state();

    tree.refresh_subtree(&root.join("Projects")).unwrap();
    let first = names(&tree, &root.join("Projects"));
    tree.refresh_subtree(&root.join("Projects")).unwrap();
    let second = names(&tree, &root.join("Projects"));

    assert_eq!(first, second);
    assert_eq!(tree.capture_state(), before);
    assert!(
        tree.find_node_by_path(&root.join("Projects/rust/notes/borrow.md"))
            .is_some()
    );
}

#[test]
fn test_capture_then_apply_is_identity() {
    let temp = create_notes();
    let mut tree = DocumentTree::new(TreeConfig::new(temp.path())).unwrap();
    let root = tree.root_path().to_path_buf();
    expand_path(&mut tree, &root.join("Projects"));
    expand_path(&mut tree, &root.join("archive"));
    let plan = tree.find_node_by_path(&root.join("Projects/plan.md")).unwrap();
    tree.select(Some(plan));

    let state = tree.capture_state();
    tree.apply_state(&state);

    assert_eq!(tree.capture_state(), state);
    assert_eq!(tree.selected(), Some(plan));
}

#[test]
fn test_state_survives_reload_with_new_entries() {
    let temp = create_notes();
    let mut tree = DocumentTree::new(TreeConfig::new(temp.path())).unwrap();
    let root = tree.root_path().to_path_buf();
    expand_path(&mut tree, &root.join("Projects"));
    expand_path(&mut tree, &root.join("Projects/rust"));
    let state = tree.capture_state();

    fs::write(root.join("Projects/rust/fresh.md"), "").unwrap();
    tree.reload();
    tree.apply_state(&state);

    assert_eq!(tree.capture_state().expanded, state.expanded);
    assert!(
        tree.find_node_by_path(&root.join("Projects/rust/fresh.md"))
            .is_some()
    );
}

#[test]
fn test_listing_error_becomes_marker() {
    let temp = create_notes();
    let mut tree = DocumentTree::new(TreeConfig::new(temp.path())).unwrap();
    let root = tree.root_path().to_path_buf();
    let archive = tree.find_node_by_path(&root.join("archive")).unwrap();

    fs::remove_dir_all(root.join("archive")).unwrap();
    tree.expand(archive).unwrap();

    let node = tree.get(archive).unwrap();
    assert!(matches!(node.load_state(), LoadState::Error { .. }));
    assert!(node.children().is_empty());
    assert!(tree.find_node_by_path(&root.join("archive/old.md")).is_none());
    assert!(matches!(
        tree.refresh_subtree(&root.join("archive")),
        Err(TreeError::InvalidOperation { .. })
    ));
}

#[test]
fn test_rebased_state_follows_rename() {
    let temp = create_notes();
    let mut tree = DocumentTree::new(TreeConfig::new(temp.path())).unwrap();
    let root = tree.root_path().to_path_buf();
    expand_path(&mut tree, &root.join("Projects"));
    expand_path(&mut tree, &root.join("Projects/rust"));
    let mut state: TreeState = tree.capture_state();

    fs::rename(root.join("Projects"), root.join("Work")).unwrap();
    state.rebase(&root.join("Projects"), &root.join("Work"));
    tree.reload();
    tree.apply_state(&state);

    let rust = tree.find_node_by_path(&root.join("Work/rust")).unwrap();
    assert!(tree.get(rust).unwrap().is_expanded());
}
