//! Retrieval engine
//!
//! Owns the vector index, document store, lexical scorer and snapshot store
//! behind one `RwLock`. Ingestion runs `add` + `put` + `append_slot_mapping`
//! and the snapshot flush under the write lock; queries hold the read lock for
//! both legs, so they never observe the slot mapping out of step with the
//! vector index.

use crate::config::{expand_path, Config, ConfigValidator};
use crate::embedding::{
    create_provider, EmbeddingError, EmbeddingProvider, HnswParams, KeywordIndex, LexicalScorer,
    Metric, VectorIndex,
};
use crate::error::{RagError, Result};
use crate::retrieval::{HybridSearcher, ScoredDocument, SearchQuery};
use crate::storage::{index_dir, DocumentRecord, DocumentStore, SnapshotStore};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Result of a committed ingestion
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub id: String,
    pub slot: usize,
    /// Set when the document is committed in memory but the snapshot flush
    /// failed
    pub persist_warning: Option<String>,
}

/// A stored document with its current embedding
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub record: DocumentRecord,
    pub slot: usize,
    pub embedding: Vec<f32>,
}

/// Engine counters
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub documents: usize,
    pub slots: usize,
    pub vectors: usize,
    pub approx_points: usize,
    pub superseded_slots: usize,
    pub lexical_documents: u64,
    pub dimension: usize,
    pub metric: String,
    pub model: String,
    pub persistence_enabled: bool,
    pub generation: u64,
}

/// Mutable index state guarded by the engine lock
pub struct IndexState {
    vectors: VectorIndex,
    documents: DocumentStore,
    lexical: Box<dyn LexicalScorer>,
    snapshots: Option<SnapshotStore>,
}

impl IndexState {
    /// Vector add, record put and slot mapping as one unit.
    ///
    /// Any failure after the vector add undoes every step taken so far.
    fn apply(&mut self, record: DocumentRecord, vector: &[f32]) -> Result<usize> {
        let id = record.id.clone();
        let slot = self.vectors.add(vector)?;

        let previous = match self.documents.put(record) {
            Ok(previous) => previous,
            Err(e) => {
                self.discard_vector(slot);
                return Err(e.into());
            }
        };

        match self.documents.append_slot_mapping(&id) {
            Ok(mapped) if mapped == slot => Ok(slot),
            Ok(mapped) => {
                error!(
                    "Slot mapping assigned {} but vector index assigned {}",
                    mapped, slot
                );
                self.documents.pop_slot_mapping();
                self.documents.restore(&id, previous);
                self.discard_vector(slot);
                Err(RagError::SlotOutOfRange {
                    slot: mapped,
                    len: self.vectors.len(),
                })
            }
            Err(e) => {
                self.documents.restore(&id, previous);
                self.discard_vector(slot);
                Err(e.into())
            }
        }
    }

    fn discard_vector(&mut self, slot: usize) {
        if let Err(e) = self.vectors.discard(slot) {
            error!("Failed to roll back vector slot {}: {}", slot, e);
        }
    }

    /// Write-through flush; failures are returned as a warning, never undone
    fn flush(&mut self) -> Option<String> {
        let snapshots = self.snapshots.as_mut()?;
        match snapshots.save(&self.vectors, &self.documents) {
            Ok(_) => None,
            Err(e) => {
                warn!("Snapshot flush failed, continuing in memory: {}", e);
                Some(e.to_string())
            }
        }
    }

    fn searcher(&self, ef_search: usize) -> HybridSearcher<'_> {
        HybridSearcher::new(
            &self.vectors,
            &self.documents,
            self.lexical.as_ref(),
            ef_search,
        )
    }
}

/// Hybrid retrieval engine; construct once and share through `Arc`
pub struct RetrievalEngine {
    provider: Arc<dyn EmbeddingProvider>,
    state: RwLock<IndexState>,
    config: Config,
}

impl RetrievalEngine {
    /// Build the configured embedding provider and open the engine
    pub fn from_config(config: Config) -> Result<Self> {
        let provider = create_provider(&config.embedding, config.indexing.vector_dim)?;
        Self::open(config, provider)
    }

    /// Open the engine, loading the last snapshot when persistence is enabled
    pub fn open(config: Config, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let lexical = KeywordIndex::new()?;
        Self::open_with(config, provider, Box::new(lexical))
    }

    /// Open with a caller-supplied lexical scorer
    pub fn open_with(
        config: Config,
        provider: Arc<dyn EmbeddingProvider>,
        mut lexical: Box<dyn LexicalScorer>,
    ) -> Result<Self> {
        ConfigValidator::validate(&config)?;

        let dimension = config.indexing.vector_dim;
        if provider.dimension() != dimension {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: provider.dimension(),
            });
        }

        let metric =
            Metric::parse(&config.indexing.metric).ok_or_else(|| RagError::InvalidConfigValue {
                path: "indexing.metric".to_string(),
                message: format!("Unknown metric: {}", config.indexing.metric),
            })?;
        let params = HnswParams {
            m: config.indexing.hnsw_m,
            ef_construction: config.indexing.hnsw_ef_construction,
            max_layer: config.indexing.hnsw_max_layer,
            capacity: config.indexing.hnsw_capacity,
        };
        let max_documents = config.indexing.max_documents;

        let mut snapshots = if config.persistence.enabled {
            let data_dir = expand_path(&config.storage.data_dir)?;
            match SnapshotStore::open(index_dir(&data_dir), config.persistence.flush_retries) {
                Ok(store) => Some(store),
                Err(e) => {
                    warn!("Persistence unavailable, running in memory: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let loaded = match snapshots.as_mut() {
            Some(store) => match store.load(dimension, metric, max_documents) {
                Ok(loaded) => loaded,
                Err(e) => {
                    warn!("Failed to load index snapshot, starting empty: {}", e);
                    None
                }
            },
            None => None,
        };

        let (vectors, documents) = match loaded {
            Some(loaded) => (loaded.vectors, loaded.documents),
            None => (
                VectorIndex::new(dimension, metric, params),
                DocumentStore::new(max_documents),
            ),
        };

        // The scorer is derived state, rebuilt from the store
        if let Err(e) = lexical.rebuild(&documents.corpus()) {
            warn!("Failed to rebuild lexical index: {}", e);
        }

        info!(
            "Engine ready: {} documents, {} slots, model {} ({}d, {})",
            documents.len(),
            vectors.len(),
            provider.model_name(),
            dimension,
            metric.as_str()
        );

        Ok(Self {
            provider,
            state: RwLock::new(IndexState {
                vectors,
                documents,
                lexical,
                snapshots,
            }),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Embed one text on the blocking pool, bounded by the configured timeout
    async fn embed(&self, text: String) -> Result<Vec<f32>> {
        let provider = Arc::clone(&self.provider);
        let task = tokio::task::spawn_blocking(move || provider.embed(&text));

        let joined = match self.config.embed_timeout() {
            Some(limit) => tokio::time::timeout(limit, task)
                .await
                .map_err(|_| RagError::from(EmbeddingError::Timeout(limit)))?,
            None => task.await,
        };
        let vector = joined
            .map_err(|e| RagError::EmbeddingFailure(format!("Embedding task failed: {}", e)))??;

        self.check_dimension(&vector)?;
        Ok(vector)
    }

    /// Embed several texts in one provider call
    pub(crate) async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let provider = Arc::clone(&self.provider);
        let expected = texts.len();
        let task = tokio::task::spawn_blocking(move || provider.embed_batch(&texts));

        let joined = match self.config.embed_timeout() {
            Some(limit) => tokio::time::timeout(limit, task)
                .await
                .map_err(|_| RagError::from(EmbeddingError::Timeout(limit)))?,
            None => task.await,
        };
        let vectors = joined
            .map_err(|e| RagError::EmbeddingFailure(format!("Embedding task failed: {}", e)))??;

        if vectors.len() != expected {
            return Err(RagError::EmbeddingFailure(format!(
                "Provider returned {} embeddings for {} texts",
                vectors.len(),
                expected
            )));
        }
        for vector in &vectors {
            self.check_dimension(vector)?;
        }
        Ok(vectors)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        let expected = self.config.indexing.vector_dim;
        if vector.len() != expected {
            return Err(RagError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Ingest a new document under a fresh id
    pub async fn ingest(
        &self,
        text: &str,
        metadata: Option<Map<String, Value>>,
    ) -> Result<IngestOutcome> {
        let vector = self.embed(text.to_string()).await?;
        self.ingest_embedded(text, metadata, vector).await
    }

    /// Ingest with an embedding computed by the caller
    pub(crate) async fn ingest_embedded(
        &self,
        text: &str,
        metadata: Option<Map<String, Value>>,
        vector: Vec<f32>,
    ) -> Result<IngestOutcome> {
        let id = Uuid::new_v4().to_string();
        let record = DocumentRecord::new(id, text, metadata.unwrap_or_default());
        self.commit(record, &vector).await
    }

    /// Re-embed an existing document. The new vector gets a new slot; the old
    /// slot keeps resolving to the id but no longer shows up in dense results.
    pub async fn reindex(
        &self,
        id: &str,
        text: &str,
        metadata: Option<Map<String, Value>>,
    ) -> Result<IngestOutcome> {
        if !self.state.read().await.documents.contains(id) {
            return Err(RagError::DocumentNotFound { id: id.to_string() });
        }

        let vector = self.embed(text.to_string()).await?;
        let record = DocumentRecord::new(id, text, metadata.unwrap_or_default());
        self.commit(record, &vector).await
    }

    async fn commit(&self, record: DocumentRecord, vector: &[f32]) -> Result<IngestOutcome> {
        let id = record.id.clone();
        let text = record.text.clone();

        let mut state = self.state.write().await;
        let slot = state.apply(record, vector)?;

        if let Err(e) = state.lexical.index(&id, &text) {
            warn!("Lexical indexing failed for {}: {}", id, e);
        }

        let persist_warning = state.flush();
        debug!("Committed document {} at slot {}", id, slot);

        Ok(IngestOutcome {
            id,
            slot,
            persist_warning,
        })
    }

    /// Run a query (hybrid or dense-only)
    pub async fn query(&self, query: &SearchQuery) -> Result<Vec<ScoredDocument>> {
        if query.limit == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embed(query.text.clone()).await?;

        let state = self.state.read().await;
        state
            .searcher(self.config.retrieval.hnsw_ef_search)
            .search(query, &vector)
    }

    /// Stored record and current embedding for `id`
    pub async fn get(&self, id: &str) -> Result<Option<StoredDocument>> {
        let state = self.state.read().await;
        let (Some(record), Some(slot)) =
            (state.documents.get(id), state.documents.current_slot(id))
        else {
            return Ok(None);
        };

        let embedding = state.vectors.vector(slot)?.to_vec();
        Ok(Some(StoredDocument {
            record: record.clone(),
            slot,
            embedding,
        }))
    }

    /// Document id that owns `slot`
    pub async fn resolve(&self, slot: usize) -> Result<String> {
        let state = self.state.read().await;
        Ok(state.documents.resolve(slot)?.to_string())
    }

    pub async fn stats(&self) -> EngineStats {
        let state = self.state.read().await;
        EngineStats {
            documents: state.documents.len(),
            slots: state.documents.slot_count(),
            vectors: state.vectors.len(),
            approx_points: state.vectors.approx_points(),
            superseded_slots: state.documents.superseded_count(),
            lexical_documents: state.lexical.len(),
            dimension: state.vectors.dimension(),
            metric: state.vectors.metric().as_str().to_string(),
            model: self.provider.model_name().to_string(),
            persistence_enabled: state.snapshots.is_some(),
            generation: state.snapshots.as_ref().map_or(0, SnapshotStore::generation),
        }
    }

    /// Write a snapshot now. Returns the generation, or `None` when
    /// persistence is disabled.
    pub async fn save(&self) -> Result<Option<u64>> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        match state.snapshots.as_mut() {
            Some(snapshots) => Ok(Some(snapshots.save(&state.vectors, &state.documents)?)),
            None => Ok(None),
        }
    }

    /// Final flush before the process exits
    pub async fn shutdown(&self) -> Result<()> {
        if let Some(generation) = self.save().await? {
            info!("Index saved at generation {}", generation);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use tempfile::TempDir;

    fn engine(temp: &TempDir) -> RetrievalEngine {
        let config = Config::offline(temp.path(), 64);
        let provider = Arc::new(HashingEmbedder::new(64).unwrap());
        RetrievalEngine::open(config, provider).unwrap()
    }

    #[tokio::test]
    async fn test_ingest_and_get() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);

        let outcome = engine.ingest("hello world", None).await.unwrap();
        assert_eq!(outcome.slot, 0);
        assert!(outcome.persist_warning.is_none());

        let stored = engine.get(&outcome.id).await.unwrap().unwrap();
        assert_eq!(stored.record.text, "hello world");
        assert_eq!(stored.embedding.len(), 64);
        assert!(engine.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_provider_dimension_must_match() {
        let temp = TempDir::new().unwrap();
        let config = Config::offline(temp.path(), 64);
        let provider = Arc::new(HashingEmbedder::new(32).unwrap());
        assert!(matches!(
            RetrievalEngine::open(config, provider),
            Err(RagError::DimensionMismatch {
                expected: 64,
                actual: 32
            })
        ));
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_config() {
        let temp = TempDir::new().unwrap();
        let config = Config::offline(temp.path(), 0);
        let provider = Arc::new(HashingEmbedder::new(8).unwrap());
        match RetrievalEngine::open(config, provider) {
            Err(RagError::ConfigValidation { errors }) => {
                assert!(errors.iter().any(|e| e.path == "indexing.vector_dim"));
            }
            other => panic!("expected validation error, got {:?}", other.err()),
        }
        assert!(!temp.path().join("index").exists());
    }

    #[tokio::test]
    async fn test_reindex_unknown_id() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        assert!(matches!(
            engine.reindex("nope", "text", None).await,
            Err(RagError::DocumentNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_stats_track_flushes() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        engine.ingest("one", None).await.unwrap();
        engine.ingest("two", None).await.unwrap();

        let stats = engine.stats().await;
        assert_eq!(stats.documents, 2);
        assert_eq!(stats.vectors, 2);
        assert_eq!(stats.approx_points, 2);
        assert_eq!(stats.lexical_documents, 2);
        assert_eq!(stats.generation, 2);
        assert_eq!(stats.model, "hashing-bow");
    }

    #[tokio::test]
    async fn test_in_memory_mode() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::offline(temp.path(), 16);
        config.persistence.enabled = false;
        let provider = Arc::new(HashingEmbedder::new(16).unwrap());
        let engine = RetrievalEngine::open(config, provider).unwrap();

        engine.ingest("volatile", None).await.unwrap();
        assert_eq!(engine.save().await.unwrap(), None);
        assert!(!temp.path().join("index").exists());
    }
}
