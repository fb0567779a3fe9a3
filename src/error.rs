use crate::embedding::{EmbeddingError, KeywordIndexError, VectorIndexError};
use crate::storage::{DocumentStoreError, PersistenceError};
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the retrieval engine
#[derive(Error, Debug)]
pub enum RagError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// Vector length does not match the index dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Embedding provider unreachable or erroring
    #[error("Embedding failure: {0}")]
    EmbeddingFailure(String),

    /// Slot resolution beyond the mapping length. Signals a broken
    /// slot-count invariant and is never retried.
    #[error("Slot {slot} out of range (mapping length {len})")]
    SlotOutOfRange { slot: usize, len: usize },

    /// Durable write or read failed
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    /// Lexical scorer unavailable or erroring
    #[error("Lexical scorer failure: {0}")]
    LexicalScorerFailure(String),

    /// Document id unknown to the store
    #[error("Document not found: {id}")]
    DocumentNotFound { id: String },

    /// Document store refused a new document
    #[error("Document store is full ({limit} documents)")]
    CapacityExceeded { limit: usize },

    /// Stream ingestor worker is gone
    #[error("Stream ingestor is closed")]
    StreamClosed,

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<VectorIndexError> for RagError {
    fn from(err: VectorIndexError) -> Self {
        match err {
            VectorIndexError::DimensionMismatch { expected, actual } => {
                RagError::DimensionMismatch { expected, actual }
            }
            VectorIndexError::SlotOutOfRange { slot, len } => RagError::SlotOutOfRange { slot, len },
            other => RagError::Other(anyhow::anyhow!(other)),
        }
    }
}

impl From<EmbeddingError> for RagError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::DimensionMismatch { expected, actual } => {
                RagError::DimensionMismatch { expected, actual }
            }
            other => RagError::EmbeddingFailure(other.to_string()),
        }
    }
}

impl From<DocumentStoreError> for RagError {
    fn from(err: DocumentStoreError) -> Self {
        match err {
            DocumentStoreError::SlotOutOfRange { slot, len } => RagError::SlotOutOfRange { slot, len },
            DocumentStoreError::UnknownDocument(id) => RagError::DocumentNotFound { id },
            DocumentStoreError::CapacityExceeded { limit } => RagError::CapacityExceeded { limit },
        }
    }
}

impl From<KeywordIndexError> for RagError {
    fn from(err: KeywordIndexError) -> Self {
        RagError::LexicalScorerFailure(err.to_string())
    }
}

impl From<PersistenceError> for RagError {
    fn from(err: PersistenceError) -> Self {
        RagError::PersistenceFailure(err.to_string())
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, RagError>;
