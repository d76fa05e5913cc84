//! End-to-end tests for the store/search pipeline.
//!
//! Most tests use the deterministic `WordHashEmbedder`. Tests against the real
//! fastembed model are marked #[ignore] and run with: cargo test -- --ignored

use std::sync::Arc;

use crate::eid::ItemId;
use crate::semantic::embeddings::Embedder;
use crate::semantic::ranker::rank;
use crate::semantic::{
    chunk, model_id_hash, LazyEmbedder, SearchQuery, SemanticSearchError, SemanticSearchService,
};
use crate::store::{ChunkStore, FileStore, MemoryStore, StoreError, StoredItem};
use crate::tests::WordHashEmbedder;

fn file_store(dir: &tempfile::TempDir) -> Arc<FileStore> {
    Arc::new(FileStore::new(dir.path().join("sessions"), model_id_hash("word-hash")).unwrap())
}

#[test]
fn test_store_two_chunks() {
    let store = Arc::new(MemoryStore::new());
    let service = SemanticSearchService::new(Arc::new(WordHashEmbedder::new()), store.clone());

    let report = service.store_text("session", "a b c d e f", 3).unwrap();
    assert_eq!(report.chunks_stored, 2);
    assert_eq!(report.session_id, "session");

    let chunks: Vec<String> = store
        .fetch_all("session")
        .unwrap()
        .into_iter()
        .map(|item| item.chunk)
        .collect();
    assert_eq!(chunks, vec!["a b c", "d e f"]);
}

#[test]
fn test_rank_filters_by_floor() {
    // Unit vectors whose cosine with [1, 0] is 0.95, 0.2 and 0.91
    let at = |s: f32| vec![s, (1.0 - s * s).sqrt()];
    let stored = [("first", at(0.95)), ("second", at(0.2)), ("third", at(0.91))];

    let results = rank(
        &[1.0, 0.0],
        stored.iter().map(|(c, v)| (*c, v.as_slice())),
        10,
        0.9,
    )
    .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].chunk, "first");
    assert_eq!(results[1].chunk, "third");
    assert!((results[0].score - 0.95).abs() < 1e-4);
    assert!((results[1].score - 0.91).abs() < 1e-4);
}

#[test]
fn test_rank_nothing_stored() {
    let results = rank(&[0.3, 0.4], std::iter::empty::<(&str, &[f32])>(), 5, 0.5).unwrap();
    assert!(results.is_empty());
}

#[test]
fn test_zero_chunk_size_is_invalid_argument() {
    let service = SemanticSearchService::new(
        Arc::new(WordHashEmbedder::new()),
        Arc::new(MemoryStore::new()),
    );
    assert!(matches!(
        service.store_text("s", "a b c", 0),
        Err(SemanticSearchError::InvalidArgument(_))
    ));
    assert!(chunk("a b c", 0).is_err());
}

#[test]
fn test_search_finds_matching_chunk_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let service = SemanticSearchService::new(Arc::new(WordHashEmbedder::new()), file_store(&dir));

    let text = "rust ownership borrowing lifetimes \
                baking bread flour yeast \
                sailing wind harbor tide";
    let report = service.store_text("notes", text, 4).unwrap();
    assert_eq!(report.chunks_stored, 3);

    let query = SearchQuery::new("notes", "borrowing lifetimes ownership rust");
    let results = service.search(&query).unwrap();

    assert!(!results.is_empty());
    assert_eq!(results[0].chunk, "rust ownership borrowing lifetimes");
    assert!((results[0].score - 1.0).abs() < 1e-5);
    assert!(results.iter().all(|r| r.score >= query.base_similarity));
}

#[test]
fn test_search_respects_limit_and_order() {
    let service = SemanticSearchService::new(
        Arc::new(WordHashEmbedder::new()),
        Arc::new(MemoryStore::new()),
    );

    // Overlap with the query decreases chunk by chunk
    let text = "alpha beta gamma delta \
                alpha beta gamma omega \
                alpha beta sigma omega \
                alpha tau sigma omega";
    service.store_text("s", text, 4).unwrap();

    let query = SearchQuery::new("s", "alpha beta gamma delta")
        .with_limit(2)
        .with_base_similarity(-1.0);
    let results = service.search(&query).unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].chunk, "alpha beta gamma delta");
    assert!(results[0].score >= results[1].score);
}

#[test]
fn test_zero_limit_skips_embedding() {
    let embedder = Arc::new(WordHashEmbedder::new());
    let service = SemanticSearchService::new(embedder.clone(), Arc::new(MemoryStore::new()));
    service.store_text("s", "some words here", 10).unwrap();
    let calls = embedder.calls();

    let results = service
        .search(&SearchQuery::new("s", "some").with_limit(0))
        .unwrap();

    assert!(results.is_empty());
    assert_eq!(embedder.calls(), calls);
}

#[test]
fn test_embedding_failure_persists_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir);
    let service = SemanticSearchService::new(
        Arc::new(WordHashEmbedder::failing_on("poison")),
        store.clone(),
    );

    let result = service.store_text("s", "fine words here then poison arrives late", 3);
    assert!(matches!(result, Err(SemanticSearchError::Embedding(_))));
    assert!(store.fetch_all("s").unwrap().is_empty());
}

#[test]
fn test_empty_query_is_degenerate() {
    let service = SemanticSearchService::new(
        Arc::new(WordHashEmbedder::new()),
        Arc::new(MemoryStore::new()),
    );
    service.store_text("s", "anything at all", 10).unwrap();

    // The test embedder maps empty text to the zero vector
    assert!(matches!(
        service.search(&SearchQuery::new("s", "")),
        Err(SemanticSearchError::Similarity(_))
    ));
}

#[test]
fn test_model_change_surfaces_persistence_error() {
    let dir = tempfile::tempdir().unwrap();
    let service = SemanticSearchService::new(Arc::new(WordHashEmbedder::new()), file_store(&dir));
    service.store_text("s", "stored with the first model", 10).unwrap();

    let other = Arc::new(
        FileStore::new(dir.path().join("sessions"), model_id_hash("another-model")).unwrap(),
    );
    let service = SemanticSearchService::new(Arc::new(WordHashEmbedder::new()), other);

    assert!(matches!(
        service.search(&SearchQuery::new("s", "first model")),
        Err(SemanticSearchError::Persistence(StoreError::ModelMismatch))
    ));
}

/// Store whose every operation fails.
struct UnreachableStore;

impl ChunkStore for UnreachableStore {
    fn name(&self) -> &str {
        "unreachable"
    }

    fn append(&self, _: &str, _: &str, _: &[f32]) -> Result<ItemId, StoreError> {
        Err(StoreError::Io(std::io::Error::other("connection refused")))
    }

    fn fetch_all(&self, _: &str) -> Result<Vec<StoredItem>, StoreError> {
        Err(StoreError::Io(std::io::Error::other("connection refused")))
    }

    fn health_check(&self) -> Result<(), StoreError> {
        Err(StoreError::Io(std::io::Error::other("connection refused")))
    }
}

#[test]
fn test_store_failures_propagate() {
    let service =
        SemanticSearchService::new(Arc::new(WordHashEmbedder::new()), Arc::new(UnreachableStore));

    assert!(matches!(
        service.store_text("s", "a b c", 2),
        Err(SemanticSearchError::Persistence(_))
    ));
    assert!(matches!(
        service.search(&SearchQuery::new("s", "a")),
        Err(SemanticSearchError::Persistence(_))
    ));
    assert!(service.health_check().is_err());
}

#[test]
fn test_concurrent_stores_into_one_session() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir);
    let service = SemanticSearchService::new(Arc::new(WordHashEmbedder::new()), store.clone());

    std::thread::scope(|scope| {
        for worker in 0..4 {
            let service = &service;
            scope.spawn(move || {
                for batch in 0..5 {
                    let text = format!("worker {worker} batch {batch} one two three four");
                    service.store_text("shared", &text, 4).unwrap();
                }
            });
        }
    });

    // 8 words per text -> 2 chunks, 4 workers x 5 batches
    assert_eq!(store.fetch_all("shared").unwrap().len(), 40);
}

#[test]
#[ignore = "requires model download (~90MB)"]
fn test_real_model_ranks_related_text_first() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = Arc::new(LazyEmbedder::new(
        "all-MiniLM-L6-v2",
        dir.path().to_path_buf(),
        None,
    ));
    assert_eq!(embedder.dimensions().unwrap(), 384);

    let store = Arc::new(
        FileStore::new(dir.path().join("sessions"), model_id_hash("all-MiniLM-L6-v2")).unwrap(),
    );
    let service = SemanticSearchService::new(embedder, store);

    service
        .store_text(
            "s",
            "Neural networks learn representations from data. \
             Bake the bread at two hundred degrees for forty minutes.",
            7,
        )
        .unwrap();

    let query = SearchQuery::new("s", "machine learning and deep learning models")
        .with_base_similarity(0.0);
    let results = service.search(&query).unwrap();

    assert!(!results.is_empty());
    assert!(results[0].chunk.contains("Neural networks"));
}
