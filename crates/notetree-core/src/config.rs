//! Tree configuration types.

use std::path::PathBuf;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Configuration for a document tree session.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct TreeConfig {
    /// Root directory the tree is bound to.
    pub root: PathBuf,

    /// Extension (without the dot) that marks a file as a document.
    #[builder(default = "default_extension()")]
    #[serde(default = "default_extension")]
    pub document_extension: String,

    /// Include hidden entries (starting with .).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub include_hidden: bool,

    /// Follow symbolic links when classifying and walking entries.
    #[builder(default = "false")]
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_true() -> bool {
    true
}

fn default_extension() -> String {
    "md".to_string()
}

impl TreeConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.root {
            Some(ref root) if root.as_os_str().is_empty() => {
                return Err("Root path cannot be empty".to_string());
            }
            None => return Err("Root path is required".to_string()),
            _ => {}
        }
        if let Some(ref ext) = self.document_extension {
            if ext.is_empty() || ext.contains(['.', '/', '\\']) {
                return Err(format!("Invalid document extension: {ext:?}"));
            }
        }
        Ok(())
    }
}

impl TreeConfig {
    /// Create a new tree config builder.
    pub fn builder() -> TreeConfigBuilder {
        TreeConfigBuilder::default()
    }

    /// Create a simple config rooted at a path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            document_extension: default_extension(),
            include_hidden: true,
            follow_symlinks: false,
        }
    }

    /// Suffix (including the dot) carried by document file names.
    pub fn document_suffix(&self) -> String {
        format!(".{}", self.document_extension)
    }

    /// Check whether a file name bears the document extension.
    pub fn is_document_name(&self, name: &str) -> bool {
        has_document_extension(name, &self.document_extension)
    }

    /// Check if hidden entries should be skipped.
    pub fn should_skip_hidden(&self, name: &str) -> bool {
        !self.include_hidden && name.starts_with('.')
    }
}

/// Whether `name` ends in `.` followed by `extension`, compared exactly.
///
/// A bare `.md` counts. Tree listing and search both use this rule.
pub fn has_document_extension(name: &str, extension: &str) -> bool {
    name.strip_suffix(extension).is_some_and(|stem| stem.ends_with('.'))
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self::new(".")
    }
}
