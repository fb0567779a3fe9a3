/// Tantivy keyword index for BM25 lexical scoring
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::*;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, TantivyError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeywordIndexError {
    #[error("Index initialization failed: {0}")]
    InitializationError(String),

    #[error("Insert failed: {0}")]
    InsertError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("Tantivy error: {0}")]
    TantivyError(#[from] TantivyError),
}

/// Lexical hit with BM25 relevance score
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordHit {
    /// Document id
    pub id: String,
    /// BM25 relevance score
    pub score: f32,
}

/// Sparse term scorer used by the lexical leg of a hybrid query.
///
/// The scorer is a derived structure: the document store is authoritative and
/// the scorer is rebuilt from it on load.
pub trait LexicalScorer: Send + Sync {
    /// Index (or re-index) one document
    fn index(&mut self, id: &str, text: &str) -> Result<(), KeywordIndexError>;

    /// Top `limit` documents for `query`, best first
    fn search(&self, query: &str, limit: usize) -> Result<Vec<KeywordHit>, KeywordIndexError>;

    /// Drop every document
    fn clear(&mut self) -> Result<(), KeywordIndexError>;

    /// Number of indexed documents
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the whole corpus
    fn rebuild(&mut self, items: &[(String, String)]) -> Result<(), KeywordIndexError> {
        self.clear()?;
        for (id, text) in items {
            self.index(id, text)?;
        }
        Ok(())
    }
}

/// In-memory tantivy index with BM25 ranking
pub struct KeywordIndex {
    index: Index,
    reader: IndexReader,
    writer: IndexWriter,
    id_field: Field,
    text_field: Field,
}

impl KeywordIndex {
    /// Create an empty RAM-backed index
    pub fn new() -> Result<Self, KeywordIndexError> {
        let mut schema_builder = Schema::builder();

        let id_field = schema_builder.add_text_field("id", STRING | STORED);
        let text_field = schema_builder.add_text_field("text", TEXT);

        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);

        // Single indexing thread, 15MB is tantivy's per-thread minimum
        let writer: IndexWriter = index
            .writer_with_num_threads(1, 15_000_000)
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        Ok(Self {
            index,
            reader,
            writer,
            id_field,
            text_field,
        })
    }

    fn stage(&mut self, id: &str, text: &str) -> Result<(), KeywordIndexError> {
        self.writer
            .delete_term(Term::from_field_text(self.id_field, id));
        self.writer
            .add_document(doc!(
                self.id_field => id,
                self.text_field => text,
            ))
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;
        Ok(())
    }

    /// Commit pending changes and make them visible to searches
    fn commit(&mut self) -> Result<(), KeywordIndexError> {
        self.writer
            .commit()
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;

        self.reader
            .reload()
            .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

        Ok(())
    }
}

impl LexicalScorer for KeywordIndex {
    fn index(&mut self, id: &str, text: &str) -> Result<(), KeywordIndexError> {
        self.stage(id, text)?;
        self.commit()
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<KeywordHit>, KeywordIndexError> {
        if limit == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();

        // Lenient parsing: free text with stray operators still matches terms
        let query_parser = QueryParser::for_index(&self.index, vec![self.text_field]);
        let (query, _ignored) = query_parser.parse_query_lenient(query);

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let retrieved_doc: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

            let id = retrieved_doc
                .get_first(self.id_field)
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    KeywordIndexError::SearchError("Missing or invalid ID field".to_string())
                })?;

            results.push(KeywordHit {
                id: id.to_string(),
                score,
            });
        }

        Ok(results)
    }

    fn clear(&mut self) -> Result<(), KeywordIndexError> {
        self.writer
            .delete_all_documents()
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;
        self.commit()
    }

    fn len(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    fn rebuild(&mut self, items: &[(String, String)]) -> Result<(), KeywordIndexError> {
        self.writer
            .delete_all_documents()
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;
        for (id, text) in items {
            self.stage(id, text)?;
        }
        self.commit()
    }
}
