//! Embedding model wrapper for fastembed.
//!
//! Provides a high-level interface for generating embeddings:
//! - The [`Embedder`] capability the search service depends on
//! - A fastembed-backed model loaded once with a configurable cache directory
//! - A lazily-initialized, shareable handle around that model

use fastembed::{InitOptions, TextEmbedding};
use once_cell::sync::OnceCell;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Mutex;
use std::time::Duration;

/// Default download timeout for model files (5 minutes)
const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),
}

/// Something that turns text into fixed-dimension vectors.
///
/// Implementations are loaded once and shared read-only between callers.
pub trait Embedder: Send + Sync {
    /// Model name
    fn name(&self) -> &str;

    /// Embedding dimensions produced by this model
    fn dimensions(&self) -> Result<usize, EmbeddingError>;

    /// Generate an embedding for a single text.
    ///
    /// Empty input is passed through to the model; what it returns for it
    /// is model-defined.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Generate embeddings for multiple texts, in input order.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Wrapper around fastembed's TextEmbedding model.
/// Uses a Mutex because fastembed's embed() requires &mut self.
pub struct EmbeddingModel {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

impl EmbeddingModel {
    /// Load the named model.
    ///
    /// The model will be downloaded on first use if not cached.
    /// Models are cached in the `models/` subdirectory of `cache_dir`.
    ///
    /// # Arguments
    /// * `model_name` - Name of the model (e.g., "all-MiniLM-L6-v2")
    /// * `cache_dir` - Directory to cache downloaded models
    /// * `download_timeout` - Optional timeout for model download
    pub fn new(
        model_name: &str,
        cache_dir: PathBuf,
        download_timeout: Option<Duration>,
    ) -> Result<Self, EmbeddingError> {
        let model_enum = parse_model_name(model_name)?;
        let timeout = download_timeout.unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT);

        let models_dir = cache_dir.join("models");
        std::fs::create_dir_all(&models_dir).map_err(|e| {
            EmbeddingError::InitFailed(format!("Failed to create models directory: {}", e))
        })?;

        // try_new downloads missing model files before loading them
        let mut model = run_with_timeout(timeout, move || {
            let options = InitOptions::new(model_enum)
                .with_cache_dir(models_dir)
                .with_show_download_progress(false);
            TextEmbedding::try_new(options).map_err(|e| EmbeddingError::InitFailed(e.to_string()))
        })?;

        let dimensions = probe_dimensions(&mut model)?;

        log::info!("Loaded embedding model '{model_name}' ({dimensions} dimensions)");

        Ok(Self {
            model: Mutex::new(model),
            model_name: model_name.to_string(),
            dimensions,
        })
    }
}

impl Embedder for EmbeddingModel {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> Result<usize, EmbeddingError> {
        Ok(self.dimensions)
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut model = self.model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut model = self.model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        let embeddings = model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::EmbeddingFailed(format!(
                "Model returned {} embeddings for {} inputs",
                embeddings.len(),
                texts.len()
            )));
        }

        Ok(embeddings)
    }
}

/// Embedding model that loads itself on first use.
///
/// The load runs at most once successfully; afterwards every caller shares
/// the same read-only model. A failed load is reported to the caller and
/// attempted again on the next use.
pub struct LazyEmbedder {
    model_name: String,
    cache_dir: PathBuf,
    download_timeout: Option<Duration>,
    model: OnceCell<EmbeddingModel>,
}

impl LazyEmbedder {
    pub fn new(model_name: &str, cache_dir: PathBuf, download_timeout: Option<Duration>) -> Self {
        Self {
            model_name: model_name.to_string(),
            cache_dir,
            download_timeout,
            model: OnceCell::new(),
        }
    }

    /// Check the model name is one we can load, without loading it.
    pub fn validate(&self) -> Result<(), EmbeddingError> {
        parse_model_name(&self.model_name).map(|_| ())
    }

    /// Load the model now instead of on first use.
    pub fn preload(&self) -> Result<(), EmbeddingError> {
        self.get().map(|_| ())
    }

    #[cfg(test)]
    fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }

    fn get(&self) -> Result<&EmbeddingModel, EmbeddingError> {
        self.model.get_or_try_init(|| {
            log::info!("Initializing embedding model '{}'", self.model_name);
            EmbeddingModel::new(&self.model_name, self.cache_dir.clone(), self.download_timeout)
        })
    }
}

impl Embedder for LazyEmbedder {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> Result<usize, EmbeddingError> {
        self.get()?.dimensions()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.get()?.embed(text)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.get()?.embed_batch(texts)
    }
}

/// Compute SHA256 hash of a model name for storage identification.
pub fn model_id_hash(model_name: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(model_name.as_bytes());
    hasher.finalize().into()
}

/// Parse model name string to fastembed enum.
fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
    match name.to_lowercase().as_str() {
        "all-minilm-l6-v2" | "allminiml6v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "all-minilm-l6-v2-q" | "allminiml6v2q" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2Q),
        "all-minilm-l12-v2" | "allminiml12v2" => Ok(fastembed::EmbeddingModel::AllMiniLML12V2),
        "bge-small-en-v1.5" | "bgesmallenv15" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-small-en-v1.5-q" | "bgesmallenv15q" => Ok(fastembed::EmbeddingModel::BGESmallENV15Q),
        "bge-base-en-v1.5" | "bgebaseenv15" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-base-en-v1.5-q" | "bgebaseenv15q" => Ok(fastembed::EmbeddingModel::BGEBaseENV15Q),
        "bge-large-en-v1.5" | "bgelargeenv15" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "bge-large-en-v1.5-q" | "bgelargeenv15q" => Ok(fastembed::EmbeddingModel::BGELargeENV15Q),
        _ => Err(EmbeddingError::InvalidModel(format!(
            "Unknown model: {}. Supported models: all-MiniLM-L6-v2, all-MiniLM-L12-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5 (add -q suffix for quantized)",
            name
        ))),
    }
}

/// Run `load` on a worker thread and give up waiting after `timeout`.
///
/// fastembed has no download timeout of its own. A worker that overruns
/// is left to finish in the background and its result is dropped.
fn run_with_timeout<T, F>(timeout: Duration, load: F) -> Result<T, EmbeddingError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, EmbeddingError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("embedding-model-load".to_string())
        .spawn(move || {
            let _ = tx.send(load());
        })
        .map_err(|e| EmbeddingError::InitFailed(format!("Failed to spawn model loader: {}", e)))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(EmbeddingError::InitFailed(format!(
            "Model load did not finish within {}s",
            timeout.as_secs_f32()
        ))),
        Err(RecvTimeoutError::Disconnected) => Err(EmbeddingError::InitFailed(
            "Model loader exited without a result".to_string(),
        )),
    }
}

/// Probe the model to determine embedding dimensions.
fn probe_dimensions(model: &mut TextEmbedding) -> Result<usize, EmbeddingError> {
    let test_embeddings = model
        .embed(vec!["test"], None)
        .map_err(|e| EmbeddingError::InitFailed(format!("Failed to probe dimensions: {}", e)))?;

    test_embeddings
        .first()
        .map(|v| v.len())
        .ok_or_else(|| EmbeddingError::InitFailed("Model returned no embedding".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Integration tests require model download - run with --ignored
    #[test]
    #[ignore = "requires model download"]
    fn test_model_creation() {
        let temp_dir = tempfile::tempdir().unwrap();
        let model = EmbeddingModel::new("all-MiniLM-L6-v2", temp_dir.path().to_path_buf(), None);
        assert!(model.is_ok());

        let model = model.unwrap();
        assert_eq!(model.name(), "all-MiniLM-L6-v2");
        assert_eq!(model.dimensions().unwrap(), 384); // MiniLM produces 384-dim embeddings
    }

    #[test]
    #[ignore = "requires model download"]
    fn test_embedding_generation() {
        let temp_dir = tempfile::tempdir().unwrap();
        let model =
            EmbeddingModel::new("all-MiniLM-L6-v2", temp_dir.path().to_path_buf(), None).unwrap();

        let embedding = model.embed("Hello, world!").unwrap();
        assert_eq!(embedding.len(), 384);

        // Check that values are normalized (L2 norm ~= 1)
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);

        // Empty input must not fail
        let empty = model.embed("").unwrap();
        assert_eq!(empty.len(), 384);
    }

    #[test]
    #[ignore = "requires model download"]
    fn test_batch_matches_single() {
        let temp_dir = tempfile::tempdir().unwrap();
        let model =
            EmbeddingModel::new("all-MiniLM-L6-v2", temp_dir.path().to_path_buf(), None).unwrap();

        let texts = vec!["first text".to_string(), "second text".to_string()];
        let batch = model.embed_batch(&texts).unwrap();
        assert_eq!(batch.len(), 2);

        let single = model.embed("second text").unwrap();
        for (a, b) in batch[1].iter().zip(single.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_invalid_model_name() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = EmbeddingModel::new("nonexistent-model", temp_dir.path().to_path_buf(), None);
        assert!(matches!(result, Err(EmbeddingError::InvalidModel(_))));
    }

    #[test]
    fn test_lazy_embedder_does_not_load_eagerly() {
        let temp_dir = tempfile::tempdir().unwrap();
        let embedder = LazyEmbedder::new("all-MiniLM-L6-v2", temp_dir.path().to_path_buf(), None);
        assert!(embedder.validate().is_ok());
        assert!(!embedder.is_loaded());
        assert_eq!(embedder.name(), "all-MiniLM-L6-v2");
    }

    #[test]
    fn test_lazy_embedder_surfaces_load_failure() {
        let temp_dir = tempfile::tempdir().unwrap();
        let embedder = LazyEmbedder::new("nonexistent-model", temp_dir.path().to_path_buf(), None);
        assert!(embedder.validate().is_err());
        assert!(matches!(embedder.embed("hello"), Err(EmbeddingError::InvalidModel(_))));
        assert!(!embedder.is_loaded());
    }

    #[test]
    fn test_slow_load_times_out() {
        let result = run_with_timeout(Duration::from_millis(50), || {
            std::thread::sleep(Duration::from_secs(2));
            Ok(1)
        });
        match result {
            Err(EmbeddingError::InitFailed(message)) => {
                assert!(message.contains("did not finish"), "{message}")
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn test_load_within_timeout() {
        let result = run_with_timeout(Duration::from_secs(5), || Ok(384));
        assert_eq!(result.unwrap(), 384);

        let failed: Result<usize, _> = run_with_timeout(Duration::from_secs(5), || {
            Err(EmbeddingError::InitFailed("no network".to_string()))
        });
        assert!(matches!(failed, Err(EmbeddingError::InitFailed(m)) if m == "no network"));
    }

    #[test]
    fn test_model_names_are_case_insensitive() {
        assert!(parse_model_name("ALL-MINILM-L6-V2").is_ok());
        assert!(parse_model_name("BGE-Base-EN-v1.5-q").is_ok());
    }

    #[test]
    fn test_model_id_hash_consistency() {
        assert_eq!(model_id_hash("all-MiniLM-L6-v2"), model_id_hash("all-MiniLM-L6-v2"));
        assert_ne!(model_id_hash("all-MiniLM-L6-v2"), model_id_hash("bge-base-en-v1.5"));
    }
}
