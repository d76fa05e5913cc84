use serde::{Deserialize, Serialize};

/// Default number of results returned by a search.
pub const DEFAULT_LIMIT: usize = 10;

/// Default inclusive similarity floor for search results.
pub const DEFAULT_BASE_SIMILARITY: f32 = 0.5;

/// A malformed store or search request.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum QueryError {
    #[error("session_id must not be empty")]
    EmptySessionId,

    #[error("base_similarity must be between -1.0 and 1.0, got {0}")]
    BaseSimilarityOutOfRange(f32),
}

/// A ranked chunk returned by a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk: String,
    /// Cosine similarity score (-1.0 to 1.0)
    pub score: f32,
}

/// A semantic search request against one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub session_id: String,
    pub query: String,
    pub limit: usize,
    pub base_similarity: f32,
}

impl SearchQuery {
    pub fn new(session_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            query: query.into(),
            limit: DEFAULT_LIMIT,
            base_similarity: DEFAULT_BASE_SIMILARITY,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_base_similarity(mut self, base_similarity: f32) -> Self {
        self.base_similarity = base_similarity;
        self
    }

    /// Check the query is well formed, reporting the first problem found.
    pub fn validate(&self) -> Result<(), QueryError> {
        validate_session_id(&self.session_id)?;
        validate_base_similarity(self.base_similarity)
    }
}

/// Outcome of storing a text under a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreReport {
    pub session_id: String,
    pub chunks_stored: usize,
}

pub(crate) fn validate_session_id(session_id: &str) -> Result<(), QueryError> {
    if session_id.trim().is_empty() {
        return Err(QueryError::EmptySessionId);
    }
    Ok(())
}

pub(crate) fn validate_base_similarity(base_similarity: f32) -> Result<(), QueryError> {
    if !base_similarity.is_finite() || !(-1.0..=1.0).contains(&base_similarity) {
        return Err(QueryError::BaseSimilarityOutOfRange(base_similarity));
    }
    Ok(())
}
