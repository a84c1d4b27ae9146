//! Document contents and the external renderer interface.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use thiserror::Error;

use crate::config::TreeConfig;
use crate::error::{Result, TreeError};

const FRONT_MATTER_FENCE: &str = "---";

/// Raw text of a document together with its resolved path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: PathBuf,
    pub text: String,
}

fn ensure_document(path: &Path, config: &TreeConfig) -> Result<()> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    if config.is_document_name(&name) {
        Ok(())
    } else {
        Err(TreeError::invalid(path, "not a document"))
    }
}

/// Read a document as UTF-8 text.
pub fn load_document(path: &Path, config: &TreeConfig) -> Result<Document> {
    ensure_document(path, config)?;
    let metadata = fs::metadata(path).map_err(|e| TreeError::io(path, e))?;
    if !metadata.is_file() {
        return Err(TreeError::invalid(path, "not a regular file"));
    }
    let text = fs::read_to_string(path).map_err(|e| TreeError::io(path, e))?;
    Ok(Document {
        path: path.to_path_buf(),
        text,
    })
}

/// Overwrite a document with new text.
pub fn save_document(path: &Path, text: &str, config: &TreeConfig) -> Result<()> {
    ensure_document(path, config)?;
    fs::write(path, text).map_err(|e| TreeError::io(path, e))?;
    tracing::debug!(path = %path.display(), bytes = text.len(), "saved document");
    Ok(())
}

/// Default front-matter block stamped with `date`.
pub fn front_matter_template(date: NaiveDate) -> String {
    format!(
        "---\ntitle: \"Your Title Here\"\ndate: {}\ndraft: false\ntags: []\ncategories: []\ndescription: \"Brief description\"\n---\n\n",
        date.format("%Y-%m-%d")
    )
}

/// Replace any closed leading front-matter block with the default template.
///
/// An unclosed leading fence is treated as body text and kept.
pub fn apply_front_matter(text: &str, date: NaiveDate) -> String {
    let body = strip_front_matter(text).unwrap_or(text);
    let mut out = front_matter_template(date);
    out.push_str(body);
    out
}

fn strip_front_matter(text: &str) -> Option<&str> {
    let mut lines = text.split_inclusive('\n');
    if lines.next()?.trim() != FRONT_MATTER_FENCE {
        return None;
    }
    let mut offset = text.find('\n')? + 1;
    for line in lines {
        offset += line.len();
        if line.trim() == FRONT_MATTER_FENCE {
            return Some(text[offset..].trim_start_matches('\n'));
        }
    }
    None
}

/// What the renderer receives for the current document.
#[derive(Debug, Clone)]
pub struct RenderRequest<'a> {
    /// Resolved absolute path, used for resolving relative links and images.
    pub path: &'a Path,
    pub text: &'a str,
    pub stylesheet: Option<&'a str>,
}

/// Renderer output, handled opaquely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    Html(String),
    File(PathBuf),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no document is open")]
    NoDocument,

    #[error("render failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// External markdown rendering pipeline.
pub trait Renderer {
    fn render(&self, request: &RenderRequest<'_>) -> std::result::Result<Rendered, RenderError>;
}

impl<F> Renderer for F
where
    F: Fn(&RenderRequest<'_>) -> std::result::Result<Rendered, RenderError>,
{
    fn render(&self, request: &RenderRequest<'_>) -> std::result::Result<Rendered, RenderError> {
        self(request)
    }
}
