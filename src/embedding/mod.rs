//! Embedding & Indexing
//!
//! - `EmbeddingProvider` trait over FastEmbed and a hashing fallback
//! - `VectorIndex`: exact scan + HNSW kept in lockstep behind one `add`
//! - `KeywordIndex`: tantivy BM25 scorer behind the `LexicalScorer` trait
mod approx;
mod exact;
mod keyword_index;
mod provider;
mod vector_index;

pub use keyword_index::{KeywordHit, KeywordIndex, KeywordIndexError, LexicalScorer};
pub use provider::{
    create_provider, EmbeddingError, EmbeddingProvider, FastEmbedProvider, HashingEmbedder,
};
pub use vector_index::{
    HnswParams, Metric, Neighbor, SearchMode, VectorIndex, VectorIndexError,
};
