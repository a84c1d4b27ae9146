//! Search terms and walk options.

use std::path::Path;

use compact_str::CompactString;
use notetree_core::{Result, TreeConfig, TreeError, has_document_extension};

/// Default number of matches delivered per result batch.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// A term to look for in names and document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    term: CompactString,
    case_sensitive: bool,
}

impl SearchQuery {
    /// Build a query. Empty terms are rejected.
    pub fn new(term: &str, case_sensitive: bool) -> Result<Self> {
        if term.is_empty() {
            return Err(TreeError::invalid(Path::new(""), "search term is empty"));
        }
        let term = if case_sensitive {
            CompactString::from(term)
        } else {
            CompactString::from(term.to_lowercase())
        };
        Ok(Self {
            term,
            case_sensitive,
        })
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Check whether `text` contains the term under this query's case policy.
    pub fn matches(&self, text: &str) -> bool {
        if self.case_sensitive {
            text.contains(self.term.as_str())
        } else {
            text.to_lowercase().contains(self.term.as_str())
        }
    }
}

/// What the walk visits and how results are delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    /// Extension (without the dot) of files whose names and text are searched.
    pub document_extension: String,
    pub include_hidden: bool,
    pub follow_symlinks: bool,
    /// Matches per `Results` event.
    pub batch_size: usize,
    /// Walker threads (0 = shared default pool).
    pub threads: usize,
}

impl SearchOptions {
    /// Options matching the visibility rules of a tree.
    pub fn from_tree_config(config: &TreeConfig) -> Self {
        Self {
            document_extension: config.document_extension.clone(),
            include_hidden: config.include_hidden,
            follow_symlinks: config.follow_symlinks,
            ..Self::default()
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub(crate) fn is_document_name(&self, name: &str) -> bool {
        has_document_extension(name, &self.document_extension)
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            document_extension: "md".to_string(),
            include_hidden: true,
            follow_symlinks: false,
            batch_size: DEFAULT_BATCH_SIZE,
            threads: 0,
        }
    }
}
