//! Cancellable search over a notes directory.
//!
//! A [`SearchEngine`] walks the filesystem on a blocking worker and streams
//! matching paths as [`SearchEvent`]s. Starting a new search cancels and
//! awaits the previous one. Matches are assembled into a standalone
//! [`ResultTree`] for display.

mod engine;
mod query;
mod results;

pub use engine::{SearchEngine, SearchEvent, SearchSummary, search_blocking};
pub use query::{DEFAULT_BATCH_SIZE, SearchOptions, SearchQuery};
pub use results::{ResultNode, ResultTree};
