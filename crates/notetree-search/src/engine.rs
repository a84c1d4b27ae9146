//! Background walk that streams matching paths.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use jwalk::{Parallelism, WalkDir};
use notetree_core::paths::canonicalize_lossy;
use notetree_core::{Result, TreeError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::query::{SearchOptions, SearchQuery};

/// Events emitted by a running search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchEvent {
    /// A batch of absolute matching paths, in walk order.
    Results(Vec<PathBuf>),
    /// Always the last event of a search.
    Finished { cancelled: bool, matched: usize },
}

/// Totals for a finished walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchSummary {
    pub matched: usize,
    pub cancelled: bool,
}

/// Walk `root` on the calling thread, handing batches of matches to
/// `on_batch`. Returning `false` from `on_batch` stops the walk.
///
/// Directories match by name only. Documents match by name or by text;
/// other files are never considered. No batch is delivered once `cancel`
/// has fired.
pub fn search_blocking(
    root: &Path,
    query: &SearchQuery,
    options: &SearchOptions,
    cancel: &CancellationToken,
    on_batch: &mut dyn FnMut(Vec<PathBuf>) -> bool,
) -> SearchSummary {
    let parallelism = match options.threads {
        0 => Parallelism::RayonDefaultPool {
            busy_timeout: Duration::from_millis(100),
        },
        n => Parallelism::RayonNewPool(n),
    };
    let walker = WalkDir::new(root)
        .parallelism(parallelism)
        .skip_hidden(!options.include_hidden)
        .follow_links(options.follow_symlinks)
        .sort(true)
        .min_depth(1);

    let batch_size = options.batch_size.max(1);
    let mut summary = SearchSummary::default();
    let mut batch = Vec::with_capacity(batch_size);

    for entry in walker {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(error = %err, "skipping unreadable entry");
                continue;
            }
        };

        let name = entry.file_name().to_string_lossy();
        let file_type = entry.file_type();
        let matched = if file_type.is_dir() {
            query.matches(&name)
        } else if file_type.is_file() && options.is_document_name(&name) {
            query.matches(&name) || content_matches(&entry.path(), query)
        } else {
            false
        };
        if !matched {
            continue;
        }

        batch.push(entry.path());
        summary.matched += 1;
        if batch.len() >= batch_size {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            if !on_batch(std::mem::replace(&mut batch, Vec::with_capacity(batch_size))) {
                summary.cancelled = true;
                break;
            }
        }
    }

    if !summary.cancelled && cancel.is_cancelled() {
        summary.cancelled = true;
    }
    if !summary.cancelled && !batch.is_empty() && !on_batch(batch) {
        summary.cancelled = true;
    }
    summary
}

fn content_matches(path: &Path, query: &SearchQuery) -> bool {
    match fs::read_to_string(path) {
        Ok(text) => query.matches(&text),
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "document text not searchable");
            false
        }
    }
}

struct ActiveSearch {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Runs at most one search at a time on a blocking worker.
pub struct SearchEngine {
    options: SearchOptions,
    active: Option<ActiveSearch>,
}

impl SearchEngine {
    pub fn new(options: SearchOptions) -> Self {
        Self {
            options,
            active: None,
        }
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Whether the last started walk is still running.
    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }

    /// Start searching `root` for `query`.
    ///
    /// Any running search is cancelled and awaited first, so two walks
    /// never feed results at the same time. The receiver yields result
    /// batches followed by exactly one `Finished` event.
    pub async fn start(
        &mut self,
        root: &Path,
        query: SearchQuery,
    ) -> Result<mpsc::UnboundedReceiver<SearchEvent>> {
        let root = canonicalize_lossy(root);
        if !root.is_dir() {
            return Err(TreeError::invalid(&root, "search root is not a directory"));
        }
        self.cancel().await;

        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let options = self.options.clone();
        let token = cancel.clone();

        tracing::debug!(root = %root.display(), term = query.term(), "starting search");
        let handle = tokio::task::spawn_blocking(move || {
            let summary = search_blocking(&root, &query, &options, &token, &mut |batch| {
                tx.send(SearchEvent::Results(batch)).is_ok()
            });
            tracing::debug!(matched = summary.matched, cancelled = summary.cancelled, "search finished");
            let _ = tx.send(SearchEvent::Finished {
                cancelled: summary.cancelled,
                matched: summary.matched,
            });
        });

        self.active = Some(ActiveSearch { cancel, handle });
        Ok(rx)
    }

    /// Cancel the running search, if any, and wait for its worker to exit.
    pub async fn cancel(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        active.cancel.cancel();
        if let Err(err) = active.handle.await {
            tracing::warn!(error = %err, "search worker did not exit cleanly");
        }
    }
}

impl Default for SearchEngine {
    fn default() -> Self {
        Self::new(SearchOptions::default())
    }
}
