//! Semantic search over chunked text.
//!
//! # Architecture
//!
//! - `chunker`: Splits text into fixed-size word windows
//! - `embeddings`: Wraps fastembed for embedding generation
//! - `similarity`: Cosine similarity between vectors
//! - `ranker`: Threshold filtering and ordering of scored chunks
//! - `service`: High-level store/search service

pub mod chunker;
pub mod embeddings;
pub mod ranker;
mod service;
pub mod similarity;
mod types;

pub use chunker::{chunk, DEFAULT_CHUNK_SIZE};
pub use embeddings::{model_id_hash, LazyEmbedder};
pub use service::{SemanticSearchError, SemanticSearchService};
pub use types::{SearchQuery, SearchResult, DEFAULT_BASE_SIMILARITY, DEFAULT_LIMIT};

/// Default embedding model name
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";
