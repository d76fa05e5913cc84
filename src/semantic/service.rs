//! Semantic search service over session-scoped text.
//!
//! Coordinates the pipeline:
//! - store: chunk → embed every chunk → append all to the store
//! - search: embed query → fetch the session's chunks → rank
//!
//! The embedder and the store are injected, loaded once by the caller and
//! shared by every request.

use std::sync::Arc;

use crate::semantic::chunker::{self, ChunkError};
use crate::semantic::embeddings::{Embedder, EmbeddingError};
use crate::semantic::ranker;
use crate::semantic::similarity::SimilarityError;
use crate::semantic::types::{
    validate_session_id, QueryError, SearchQuery, SearchResult, StoreReport,
};
use crate::store::{ChunkStore, NewItem, StoreError};

/// Errors that can occur during semantic search operations.
#[derive(Debug, thiserror::Error)]
pub enum SemanticSearchError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("Similarity error: {0}")]
    Similarity(#[from] SimilarityError),
}

impl From<ChunkError> for SemanticSearchError {
    fn from(err: ChunkError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<QueryError> for SemanticSearchError {
    fn from(err: QueryError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

/// Service for storing and searching text by meaning.
pub struct SemanticSearchService {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn ChunkStore>,
}

impl SemanticSearchService {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn ChunkStore>) -> Self {
        Self { embedder, store }
    }

    /// Name of the embedding model in use.
    pub fn model_name(&self) -> &str {
        self.embedder.name()
    }

    /// Name of the store backend in use.
    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    /// Chunk `text`, embed each chunk and persist them under `session_id`.
    ///
    /// All embeddings are computed before anything is written, so an
    /// embedding failure leaves the store unchanged. Whitespace-only text
    /// stores nothing and succeeds.
    pub fn store_text(
        &self,
        session_id: &str,
        text: &str,
        chunk_size: usize,
    ) -> Result<StoreReport, SemanticSearchError> {
        validate_session_id(session_id)?;

        let chunks = chunker::chunk(text, chunk_size)?;
        if chunks.is_empty() {
            log::debug!("Nothing to store for session '{session_id}'");
            return Ok(StoreReport {
                session_id: session_id.to_string(),
                chunks_stored: 0,
            });
        }

        let embeddings = self.embedder.embed_batch(&chunks)?;
        if embeddings.len() != chunks.len() {
            return Err(EmbeddingError::EmbeddingFailed(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                embeddings.len()
            ))
            .into());
        }

        let dimensions = self.embedder.dimensions()?;
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dimensions) {
            return Err(EmbeddingError::EmbeddingFailed(format!(
                "model produced a {}-dimension vector, expected {dimensions}",
                bad.len()
            ))
            .into());
        }

        let items: Vec<NewItem> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| NewItem { chunk, embedding })
            .collect();

        let ids = self.store.append_all(session_id, &items)?;

        log::info!(
            "Stored {} chunks for session '{session_id}' (chunk_size={chunk_size})",
            ids.len()
        );

        Ok(StoreReport {
            session_id: session_id.to_string(),
            chunks_stored: ids.len(),
        })
    }

    /// Find the session chunks most similar to the query text.
    ///
    /// Returns results sorted by score, highest first. An empty result is a
    /// valid outcome, not an error. Items with equal scores keep the store's
    /// enumeration order, which a backend is not required to keep stable.
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, SemanticSearchError> {
        query.validate()?;

        if query.limit == 0 {
            return Ok(vec![]);
        }

        let query_embedding = self.embedder.embed(&query.query)?;
        let items = self.store.fetch_all(&query.session_id)?;

        let results = ranker::rank(
            &query_embedding,
            items
                .iter()
                .map(|item| (item.chunk.as_str(), item.embedding.as_slice())),
            query.limit,
            query.base_similarity,
        )?;

        log::debug!(
            "Search in session '{}' matched {} of {} chunks",
            query.session_id,
            results.len(),
            items.len()
        );

        Ok(results)
    }

    /// Check the store backend is usable.
    pub fn health_check(&self) -> Result<(), SemanticSearchError> {
        Ok(self.store.health_check()?)
    }
}
