//! nvk-rag - Hybrid Retrieval Engine
//!
//! Indexes documents into an exact and an approximate (HNSW) vector index plus
//! a BM25 keyword index, answers queries by merging dense and lexical results
//! with dense precedence, and persists the index after every committed
//! ingestion.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod retrieval;
pub mod storage;

pub use engine::{IngestOutcome, RetrievalEngine};
pub use error::{RagError, Result};
