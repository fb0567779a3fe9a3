//! Hybrid search combining dense vector search and lexical BM25 search

use crate::embedding::{LexicalScorer, SearchMode, VectorIndex};
use crate::error::{RagError, Result};
use crate::retrieval::{distance_to_score, merge_results, ResultSource, ScoredDocument, SearchQuery};
use crate::storage::DocumentStore;
use tracing::{debug, error, warn};

/// One query over a consistent view of the index.
///
/// Borrows the index state for the duration of the query; the engine holds
/// the read lock while a searcher exists.
pub struct HybridSearcher<'a> {
    vectors: &'a VectorIndex,
    documents: &'a DocumentStore,
    lexical: &'a dyn LexicalScorer,
    ef_search: usize,
}

impl<'a> HybridSearcher<'a> {
    pub fn new(
        vectors: &'a VectorIndex,
        documents: &'a DocumentStore,
        lexical: &'a dyn LexicalScorer,
        ef_search: usize,
    ) -> Self {
        Self {
            vectors,
            documents,
            lexical,
            ef_search,
        }
    }

    /// Run `query` given its already computed embedding
    pub fn search(&self, query: &SearchQuery, query_vector: &[f32]) -> Result<Vec<ScoredDocument>> {
        if query.limit == 0 || self.vectors.is_empty() {
            return Ok(Vec::new());
        }

        let mode = if query.hybrid {
            SearchMode::Approximate
        } else {
            SearchMode::Exact
        };
        let dense = self.dense_leg(query_vector, query.limit, mode)?;

        let lexical = if query.hybrid && !query.text.trim().is_empty() {
            self.lexical_leg(&query.text, query.limit)
        } else {
            Vec::new()
        };

        debug!(
            "Query legs: {} dense, {} lexical (limit {})",
            dense.len(),
            lexical.len(),
            query.limit
        );

        Ok(merge_results(dense, lexical, query.limit))
    }

    fn dense_leg(
        &self,
        query_vector: &[f32],
        limit: usize,
        mode: SearchMode,
    ) -> Result<Vec<ScoredDocument>> {
        // Superseded slots are skipped, so fetch enough to still fill `limit`
        let fetch = limit + self.documents.superseded_count();
        let neighbours = self
            .vectors
            .search(query_vector, fetch, mode, self.ef_search)?;

        let mut results = Vec::with_capacity(limit);
        for neighbour in neighbours {
            let id = self.documents.resolve(neighbour.slot).map_err(|e| {
                error!("Slot mapping out of sync with vector index: {}", e);
                RagError::from(e)
            })?;

            if !self.documents.is_current(neighbour.slot) {
                continue;
            }

            let record = self.documents.get(id).ok_or_else(|| {
                error!("Slot {} maps to unknown document {}", neighbour.slot, id);
                RagError::DocumentNotFound { id: id.to_string() }
            })?;

            results.push(ScoredDocument {
                id: record.id.clone(),
                text: record.text.clone(),
                metadata: record.metadata.clone(),
                score: distance_to_score(neighbour.distance),
                source: ResultSource::Dense,
                distance: Some(neighbour.distance),
            });

            if results.len() == limit {
                break;
            }
        }

        Ok(results)
    }

    /// Lexical hits; scorer errors degrade to an empty leg
    fn lexical_leg(&self, text: &str, limit: usize) -> Vec<ScoredDocument> {
        let hits = match self.lexical.search(text, limit) {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Lexical scorer failed, returning dense results only: {}", e);
                return Vec::new();
            }
        };

        hits.into_iter()
            .filter_map(|hit| {
                let record = self.documents.get(&hit.id)?;
                Some(ScoredDocument {
                    id: record.id.clone(),
                    text: record.text.clone(),
                    metadata: record.metadata.clone(),
                    score: hit.score,
                    source: ResultSource::Lexical,
                    distance: None,
                })
            })
            .collect()
    }
}
