//! Hybrid Retrieval
//!
//! Dense nearest-neighbour search merged with BM25 lexical search. Dense
//! results take precedence when both legs find the same document.

mod hybrid;
mod merge;
mod scored;

pub use hybrid::HybridSearcher;
pub use merge::merge_results;
pub use scored::{distance_to_score, ResultSource, ScoredDocument};

use serde::{Deserialize, Serialize};

/// Default number of results
pub const DEFAULT_LIMIT: usize = 5;

/// Search query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Query text
    pub text: String,

    /// Maximum number of results
    pub limit: usize,

    /// Merge in lexical results and use the approximate index. When false the
    /// query is dense-only against the exact index.
    pub hybrid: bool,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, limit: usize) -> Self {
        Self {
            text: text.into(),
            limit,
            hybrid: true,
        }
    }

    /// Dense-only, exact search
    pub fn dense_only(mut self) -> Self {
        self.hybrid = false;
        self
    }
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self::new(String::new(), DEFAULT_LIMIT)
    }
}
