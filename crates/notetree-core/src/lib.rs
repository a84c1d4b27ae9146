//! Core types for notetree.
//!
//! This crate holds the lazily populated document tree, the synchronizer
//! that keeps it consistent with the filesystem, and the error taxonomy and
//! configuration shared by the rest of the workspace.

mod config;
mod document;
mod error;
mod listing;
mod node;
pub mod paths;
mod state;
mod sync;
mod tree;

pub use config::{TreeConfig, TreeConfigBuilder, has_document_extension};
pub use document::{
    Document, RenderError, RenderRequest, Rendered, Renderer, apply_front_matter,
    front_matter_template, load_document, save_document,
};
pub use error::{ErrorKind, Result, TreeError};
pub use listing::{
    ListedEntry, Listing, has_loadable_children, list_children, qualifying_kind, sibling_order,
};
pub use node::{LoadState, Node, NodeId, NodeKind};
pub use state::TreeState;
pub use tree::DocumentTree;
