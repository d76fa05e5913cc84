mod semantic;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::semantic::embeddings::{Embedder, EmbeddingError};

pub const TEST_DIMENSIONS: usize = 64;

/// Deterministic bag-of-words embedder: every lowercase word is hashed onto
/// one of `TEST_DIMENSIONS` axes. Texts sharing words score high, texts
/// sharing none score zero or close to it.
pub struct WordHashEmbedder {
    calls: AtomicUsize,
    fail_on: Option<String>,
}

impl WordHashEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_on: None,
        }
    }

    /// Fail any embedding whose input contains `word`.
    pub fn failing_on(word: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_on: Some(word.to_string()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for WordHashEmbedder {
    fn name(&self) -> &str {
        "word-hash"
    }

    fn dimensions(&self) -> Result<usize, EmbeddingError> {
        Ok(TEST_DIMENSIONS)
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut v = vec![0.0; TEST_DIMENSIONS];
        for word in text.split_whitespace() {
            let word = word.to_lowercase();
            if self.fail_on.as_deref() == Some(word.as_str()) {
                return Err(EmbeddingError::EmbeddingFailed(format!(
                    "refusing to embed '{word}'"
                )));
            }
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            v[(hasher.finish() % TEST_DIMENSIONS as u64) as usize] += 1.0;
        }
        Ok(v)
    }
}
