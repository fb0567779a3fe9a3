// Streaming ingestion over a bounded channel for backpressure handling

use crate::engine::RetrievalEngine;
use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Document arriving from an external feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingDocument {
    pub text: String,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

impl IncomingDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Counters reported when the stream drains
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StreamStats {
    pub processed: usize,
    pub errors: usize,
}

/// Feeds documents to the engine from a worker task.
///
/// Each document is its own ingestion transaction; a failure is logged and
/// counted without stopping the stream. Delivery into the engine is
/// at-least-once from the producer's point of view: resending a document
/// creates a second document with a new id.
pub struct StreamIngestor {
    tx: mpsc::Sender<IncomingDocument>,
    worker: JoinHandle<StreamStats>,
}

impl StreamIngestor {
    /// Spawn the worker; `buffer` bounds the number of queued documents
    pub fn spawn(engine: Arc<RetrievalEngine>, buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let worker = tokio::spawn(ingest_worker(rx, engine));
        Self { tx, worker }
    }

    /// Spawn with the buffer size from `ingest.stream_buffer`
    pub fn for_engine(engine: Arc<RetrievalEngine>) -> Self {
        let buffer = engine.config().ingest.stream_buffer;
        Self::spawn(engine, buffer)
    }

    /// Extra sender handle for concurrent producers. Every clone must be
    /// dropped before `shutdown` can finish.
    pub fn sender(&self) -> mpsc::Sender<IncomingDocument> {
        self.tx.clone()
    }

    /// Queue a document, waiting while the buffer is full
    pub async fn send(&self, document: IncomingDocument) -> Result<()> {
        self.tx
            .send(document)
            .await
            .map_err(|_| RagError::StreamClosed)
    }

    /// Close the stream and wait for queued documents to be ingested
    pub async fn shutdown(self) -> Result<StreamStats> {
        let Self { tx, worker } = self;
        drop(tx);

        tracing::info!("Waiting for stream ingestor to drain...");
        let stats = worker
            .await
            .map_err(|e| RagError::Other(anyhow::anyhow!("Stream worker failed: {}", e)))?;
        tracing::info!(
            "Stream ingestor drained: {} processed, {} errors",
            stats.processed,
            stats.errors
        );
        Ok(stats)
    }
}

async fn ingest_worker(
    mut rx: mpsc::Receiver<IncomingDocument>,
    engine: Arc<RetrievalEngine>,
) -> StreamStats {
    let mut stats = StreamStats::default();

    while let Some(document) = rx.recv().await {
        match engine.ingest(&document.text, document.metadata).await {
            Ok(outcome) => {
                if let Some(warning) = outcome.persist_warning {
                    tracing::warn!("Streamed document {} not persisted: {}", outcome.id, warning);
                }
                stats.processed += 1;
            }
            Err(e) => {
                tracing::error!("Failed to ingest streamed document: {}", e);
                stats.errors += 1;
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::embedding::HashingEmbedder;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_send_after_worker_stops() {
        let temp = TempDir::new().unwrap();
        let config = Config::offline(temp.path(), 16);
        let provider = Arc::new(HashingEmbedder::new(16).unwrap());
        let engine = Arc::new(RetrievalEngine::open(config, provider).unwrap());

        let stream = StreamIngestor::spawn(engine, 2);
        stream.worker.abort();
        while !stream.worker.is_finished() {
            tokio::task::yield_now().await;
        }

        let result = stream.send(IncomingDocument::new("dropped")).await;
        assert!(matches!(result, Err(RagError::StreamClosed)));
    }
}
