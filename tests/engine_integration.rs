/// Engine integration tests: slot invariants, hybrid merge, rollback and
/// concurrent access, using the deterministic hashing embedder
use nvk_rag::config::Config;
use nvk_rag::embedding::{
    EmbeddingError, EmbeddingProvider, HashingEmbedder, KeywordHit, KeywordIndexError,
    LexicalScorer,
};
use nvk_rag::retrieval::{ResultSource, SearchQuery};
use nvk_rag::{RagError, RetrievalEngine};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const DIM: usize = 128;

fn open(temp: &TempDir) -> RetrievalEngine {
    let config = Config::offline(temp.path(), DIM);
    RetrievalEngine::open(config, Arc::new(HashingEmbedder::new(DIM).unwrap())).unwrap()
}

const CORPUS: &[&str] = &[
    "Rust ownership rules prevent data races at compile time",
    "Kubernetes schedules pods onto nodes based on resource requests",
    "PostgreSQL uses multiversion concurrency control for isolation",
    "TLS handshakes negotiate cipher suites and exchange keys",
    "Gradient descent minimises a loss function iteratively",
    "The borrow checker enforces aliasing xor mutability",
    "Bloom filters answer set membership with false positives",
    "Raft elects a leader and replicates a log across peers",
];

struct BrokenScorer;

impl LexicalScorer for BrokenScorer {
    fn index(&mut self, _id: &str, _text: &str) -> Result<(), KeywordIndexError> {
        Err(KeywordIndexError::InsertError("scorer offline".to_string()))
    }

    fn search(&self, _query: &str, _limit: usize) -> Result<Vec<KeywordHit>, KeywordIndexError> {
        Err(KeywordIndexError::SearchError("scorer offline".to_string()))
    }

    fn clear(&mut self) -> Result<(), KeywordIndexError> {
        Ok(())
    }

    fn len(&self) -> u64 {
        0
    }
}

struct FailingProvider;

impl EmbeddingProvider for FailingProvider {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::GenerationError("model unavailable".to_string()))
    }

    fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::GenerationError("model unavailable".to_string()))
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

struct SlowProvider;

impl EmbeddingProvider for SlowProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        std::thread::sleep(Duration::from_millis(300));
        HashingEmbedder::new(DIM)?.embed(text)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn model_name(&self) -> &str {
        "slow"
    }
}

#[tokio::test]
async fn test_slot_counts_and_resolution_order() {
    let temp = TempDir::new().unwrap();
    let engine = open(&temp);

    let mut ids = Vec::new();
    for text in CORPUS {
        let outcome = engine.ingest(text, None).await.unwrap();
        // Interleave queries with ingestion
        engine
            .query(&SearchQuery::new("compile time", 3))
            .await
            .unwrap();
        ids.push(outcome.id);
    }

    let stats = engine.stats().await;
    assert_eq!(stats.vectors, CORPUS.len());
    assert_eq!(stats.slots, CORPUS.len());
    assert_eq!(stats.approx_points, CORPUS.len());
    assert_eq!(stats.documents, CORPUS.len());

    for (slot, id) in ids.iter().enumerate() {
        assert_eq!(&engine.resolve(slot).await.unwrap(), id);
    }
    assert!(matches!(
        engine.resolve(CORPUS.len()).await,
        Err(RagError::SlotOutOfRange { .. })
    ));
}

#[tokio::test]
async fn test_dense_only_exact_match_is_top_result() {
    let temp = TempDir::new().unwrap();
    let engine = open(&temp);

    let text = "Raft elects a leader and replicates a log across peers";
    let outcome = engine.ingest(text, None).await.unwrap();

    let results = engine
        .query(&SearchQuery::new(text, 5).dense_only())
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, outcome.id);
    assert_eq!(results[0].source, ResultSource::Dense);
    assert!(results[0].distance.unwrap() < 1e-5);
}

#[tokio::test]
async fn test_hybrid_duplicate_is_reported_once_as_dense() {
    let temp = TempDir::new().unwrap();
    let engine = open(&temp);

    let mut target = String::new();
    for text in CORPUS {
        let outcome = engine.ingest(text, None).await.unwrap();
        if text.starts_with("Kubernetes") {
            target = outcome.id;
        }
    }

    let results = engine
        .query(&SearchQuery::new("Kubernetes schedules pods onto nodes", 5))
        .await
        .unwrap();

    let hits: Vec<_> = results.iter().filter(|r| r.id == target).collect();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].source, ResultSource::Dense);
    assert_eq!(results[0].id, target);

    let mut ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), results.len());
}

#[tokio::test]
async fn test_empty_corpus_and_zero_limit() {
    let temp = TempDir::new().unwrap();
    let engine = open(&temp);

    assert!(engine
        .query(&SearchQuery::new("anything", 5))
        .await
        .unwrap()
        .is_empty());

    engine.ingest(CORPUS[0], None).await.unwrap();
    assert!(engine
        .query(&SearchQuery::new(CORPUS[0], 0))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_lexical_failure_degrades_to_dense() {
    let temp = TempDir::new().unwrap();
    let config = Config::offline(temp.path(), DIM);
    let engine = RetrievalEngine::open_with(
        config,
        Arc::new(HashingEmbedder::new(DIM).unwrap()),
        Box::new(BrokenScorer),
    )
    .unwrap();

    for text in CORPUS {
        // Lexical indexing failure does not fail ingestion
        engine.ingest(text, None).await.unwrap();
    }

    let results = engine
        .query(&SearchQuery::new("borrow checker aliasing", 3))
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.source == ResultSource::Dense));
}

#[tokio::test]
async fn test_embedding_failure_mutates_nothing() {
    let temp = TempDir::new().unwrap();
    let config = Config::offline(temp.path(), DIM);
    let engine = RetrievalEngine::open(config, Arc::new(FailingProvider)).unwrap();

    let result = engine.ingest("never stored", None).await;
    assert!(matches!(result, Err(RagError::EmbeddingFailure(_))));

    let stats = engine.stats().await;
    assert_eq!(stats.vectors, 0);
    assert_eq!(stats.slots, 0);
    assert_eq!(stats.generation, 0);
}

#[tokio::test]
async fn test_embedding_timeout_mutates_nothing() {
    let temp = TempDir::new().unwrap();
    let mut config = Config::offline(temp.path(), DIM);
    config.embedding.timeout = "50ms".to_string();
    let engine = RetrievalEngine::open(config, Arc::new(SlowProvider)).unwrap();

    let result = engine.ingest("too slow to embed", None).await;
    assert!(matches!(result, Err(RagError::EmbeddingFailure(_))));

    let query = engine.query(&SearchQuery::new("too slow", 3)).await;
    assert!(matches!(query, Err(RagError::EmbeddingFailure(_))));

    let stats = engine.stats().await;
    assert_eq!(stats.vectors, 0);
    assert_eq!(stats.slots, 0);
    assert_eq!(stats.generation, 0);
}

#[tokio::test]
async fn test_injected_store_failure_leaves_no_orphan_slot() {
    let temp = TempDir::new().unwrap();
    let mut config = Config::offline(temp.path(), DIM);
    config.indexing.max_documents = 2;
    let engine =
        RetrievalEngine::open(config, Arc::new(HashingEmbedder::new(DIM).unwrap())).unwrap();

    let first = engine.ingest(CORPUS[0], None).await.unwrap();
    engine.ingest(CORPUS[1], None).await.unwrap();

    // Vector add succeeds, the document store rejects the record
    let rejected = engine.ingest(CORPUS[2], None).await;
    assert!(matches!(rejected, Err(RagError::CapacityExceeded { limit: 2 })));

    let stats = engine.stats().await;
    assert_eq!(stats.vectors, 2);
    assert_eq!(stats.slots, 2);
    assert_eq!(stats.approx_points, 2);

    // The next slot is still numbered in step with the mapping
    let outcome = engine.reindex(&first.id, CORPUS[3], None).await.unwrap();
    assert_eq!(outcome.slot, 2);
    assert_eq!(engine.resolve(2).await.unwrap(), first.id);

    let results = engine.query(&SearchQuery::new(CORPUS[2], 5)).await.unwrap();
    assert!(results.iter().all(|r| r.text != CORPUS[2]));
}

#[tokio::test]
async fn test_reindex_supersedes_previous_slot() {
    let temp = TempDir::new().unwrap();
    let engine = open(&temp);

    let original = engine.ingest(CORPUS[4], None).await.unwrap();
    engine.ingest(CORPUS[5], None).await.unwrap();

    let mut metadata = serde_json::Map::new();
    metadata.insert("revision".to_string(), serde_json::json!(2));
    let updated = engine
        .reindex(&original.id, CORPUS[6], Some(metadata))
        .await
        .unwrap();

    assert_eq!(updated.id, original.id);
    assert_eq!(updated.slot, 2);

    let stats = engine.stats().await;
    assert_eq!(stats.documents, 2);
    assert_eq!(stats.slots, 3);
    assert_eq!(stats.superseded_slots, 1);
    assert_eq!(engine.resolve(0).await.unwrap(), original.id);

    let stored = engine.get(&original.id).await.unwrap().unwrap();
    assert_eq!(stored.slot, 2);
    assert_eq!(stored.record.text, CORPUS[6]);
    assert_eq!(stored.record.metadata["revision"], 2);

    // The old text no longer finds the document through its stale vector
    let results = engine
        .query(&SearchQuery::new(CORPUS[4], 5).dense_only())
        .await
        .unwrap();
    let hits: Vec<_> = results.iter().filter(|r| r.id == original.id).collect();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].text, CORPUS[6]);
    assert!(hits[0].distance.unwrap() > 1e-3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ingest_and_query() {
    let temp = TempDir::new().unwrap();
    let engine = Arc::new(open(&temp));

    let mut writers = Vec::new();
    for worker in 0..4 {
        let engine = Arc::clone(&engine);
        writers.push(tokio::spawn(async move {
            let mut outcomes = Vec::new();
            for i in 0..10 {
                let text = format!("worker {worker} document {i} {}", CORPUS[i % CORPUS.len()]);
                outcomes.push(engine.ingest(&text, None).await.unwrap());
            }
            outcomes
        }));
    }

    let mut readers = Vec::new();
    for _ in 0..4 {
        let engine = Arc::clone(&engine);
        readers.push(tokio::spawn(async move {
            for _ in 0..10 {
                let results = engine
                    .query(&SearchQuery::new("leader election log", 5))
                    .await
                    .unwrap();
                assert!(results.len() <= 5);
                let stats = engine.stats().await;
                assert_eq!(stats.vectors, stats.slots);
            }
        }));
    }

    let mut outcomes = Vec::new();
    for writer in writers {
        outcomes.extend(writer.await.unwrap());
    }
    for reader in readers {
        reader.await.unwrap();
    }

    let stats = engine.stats().await;
    assert_eq!(stats.vectors, 40);
    assert_eq!(stats.slots, 40);

    for outcome in outcomes {
        assert_eq!(engine.resolve(outcome.slot).await.unwrap(), outcome.id);
    }
}
