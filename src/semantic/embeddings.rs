//! Embedding model wrapper for fastembed.
//!
//! Provides a high-level interface for generating embeddings:
//! - `Embedder` trait, the seam the cache and matcher depend on
//! - `EmbeddingModel`, a fastembed model with configurable cache directory
//! - `LazyEmbedder`, which loads a model at most once, on first use

use fastembed::{InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use crate::semantic::similarity::normalize;

/// Text to vector function. Implementations must be deterministic for a
/// given model and return vectors of a fixed length.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

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

/// Wrapper around fastembed's TextEmbedding model.
/// Uses a Mutex because fastembed's embed() requires &mut self.
pub struct EmbeddingModel {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

impl EmbeddingModel {
    /// Create a new embedding model with the given name.
    ///
    /// The model will be downloaded on first use if not cached.
    /// Models are cached in the `models/` subdirectory of `cache_dir`.
    pub fn new(model_name: &str, cache_dir: PathBuf) -> Result<Self, EmbeddingError> {
        let model_enum = Self::parse_model_name(model_name)?;

        let models_dir = cache_dir.join("models");
        std::fs::create_dir_all(&models_dir).map_err(|e| {
            EmbeddingError::InitFailed(format!("Failed to create models directory: {}", e))
        })?;

        log::debug!("loading '{}' from {}", model_name, models_dir.display());

        let options = InitOptions::new(model_enum)
            .with_cache_dir(models_dir)
            .with_show_download_progress(true);

        let mut model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        let dimensions = Self::probe_dimensions(&mut model)?;

        Ok(Self {
            model: Mutex::new(model),
            model_name: model_name.to_string(),
            dimensions,
        })
    }

    pub fn name(&self) -> &str {
        &self.model_name
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Parse model name string to fastembed enum.
    fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
        match name.to_lowercase().as_str() {
            "all-minilm-l6-v2" | "allminiml6v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            "all-minilm-l6-v2-q" | "allminiml6v2q" => {
                Ok(fastembed::EmbeddingModel::AllMiniLML6V2Q)
            }
            "bge-small-en-v1.5" | "bgesmallenv15" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" | "bgebaseenv15" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
            _ => Err(EmbeddingError::InvalidModel(format!(
                "Unknown model: {}. Supported models: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5 (add -q suffix to MiniLM for quantized)",
                name
            ))),
        }
    }

    fn probe_dimensions(model: &mut TextEmbedding) -> Result<usize, EmbeddingError> {
        let test_embeddings = model
            .embed(vec!["test"], None)
            .map_err(|e| EmbeddingError::InitFailed(format!("Failed to probe dimensions: {}", e)))?;

        test_embeddings
            .first()
            .map(|v| v.len())
            .ok_or_else(|| EmbeddingError::InitFailed("Model returned no embedding".to_string()))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, TextEmbedding>, EmbeddingError> {
        self.model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })
    }
}

impl Embedder for EmbeddingModel {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let embeddings = self
            .lock()?
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        embeddings
            .into_iter()
            .next()
            .map(normalize)
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let embeddings = self
            .lock()?
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        Ok(embeddings.into_iter().map(normalize).collect())
    }
}

type Loader<E> = Box<dyn Fn() -> Result<E, EmbeddingError> + Send + Sync>;

/// Process-lifetime provider that loads its model on the first embed call.
/// A failed load is not cached, the next call tries again.
pub struct LazyEmbedder<E = EmbeddingModel> {
    label: String,
    loader: Loader<E>,
    model: OnceLock<E>,
    init_lock: Mutex<()>,
}

impl LazyEmbedder<EmbeddingModel> {
    /// Lazily load the named fastembed model into `cache_dir/models`.
    pub fn new(model_name: &str, cache_dir: PathBuf) -> Self {
        let name = model_name.to_string();
        Self::with_loader(model_name, move || EmbeddingModel::new(&name, cache_dir.clone()))
    }
}

impl<E: Embedder> LazyEmbedder<E> {
    pub fn with_loader<F>(label: &str, loader: F) -> Self
    where
        F: Fn() -> Result<E, EmbeddingError> + Send + Sync + 'static,
    {
        Self {
            label: label.to_string(),
            loader: Box::new(loader),
            model: OnceLock::new(),
            init_lock: Mutex::new(()),
        }
    }

    #[cfg(test)]
    pub fn is_initialized(&self) -> bool {
        self.model.get().is_some()
    }

    /// Load the model now instead of on first use.
    pub fn initialize(&self) -> Result<&E, EmbeddingError> {
        if let Some(model) = self.model.get() {
            return Ok(model);
        }

        let _guard = self
            .init_lock
            .lock()
            .map_err(|e| EmbeddingError::InitFailed(format!("Init lock poisoned: {}", e)))?;

        // another caller may have finished while we waited
        if let Some(model) = self.model.get() {
            return Ok(model);
        }

        log::info!("Initializing embedding model '{}'", self.label);
        let model = (self.loader)()?;
        log::info!("Embedding model '{}' ready", self.label);

        Ok(self.model.get_or_init(|| model))
    }
}

impl<E: Embedder> Embedder for LazyEmbedder<E> {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.initialize()?.embed(text)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.initialize()?.embed_batch(texts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    // Integration tests require model download - run with --ignored
    #[test]
    #[ignore = "requires model download"]
    fn test_model_creation() {
        let temp_dir = tempfile::tempdir().unwrap();
        let model =
            EmbeddingModel::new("all-MiniLM-L6-v2", temp_dir.path().to_path_buf()).unwrap();

        assert_eq!(model.name(), "all-MiniLM-L6-v2");
        assert_eq!(model.dimensions(), 384);
    }

    #[test]
    #[ignore = "requires model download"]
    fn test_embedding_is_normalized_and_deterministic() {
        let temp_dir = tempfile::tempdir().unwrap();
        let model =
            EmbeddingModel::new("all-MiniLM-L6-v2", temp_dir.path().to_path_buf()).unwrap();

        let first = model.embed("Black Wallet. lost near Main St").unwrap();
        let second = model.embed("Black Wallet. lost near Main St").unwrap();
        assert_eq!(first.len(), 384);

        let norm: f32 = first.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);

        for (a, b) in first.iter().zip(second.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    struct Fixed;

    impl Embedder for Fixed {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![1.0, 0.0])
        }
    }

    #[test]
    fn test_lazy_embedder_loads_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let embedder = LazyEmbedder::with_loader("fixed", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Fixed)
        });
        assert!(!embedder.is_initialized());

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| embedder.embed("Red Umbrella. ").unwrap());
            }
        });

        assert!(embedder.is_initialized());
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        let first = embedder.initialize().unwrap() as *const Fixed;
        let second = embedder.initialize().unwrap() as *const Fixed;
        assert_eq!(first, second);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lazy_embedder_retries_failed_load() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let embedder = LazyEmbedder::with_loader("flaky", move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(EmbeddingError::InitFailed("network down".to_string()))
            } else {
                Ok(Fixed)
            }
        });

        assert!(matches!(
            embedder.embed("Keys. "),
            Err(EmbeddingError::InitFailed(_))
        ));
        assert!(!embedder.is_initialized());

        assert_eq!(embedder.embed("Keys. ").unwrap(), vec![1.0, 0.0]);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_invalid_model_name() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = EmbeddingModel::new("nonexistent-model", temp_dir.path().to_path_buf());
        assert!(matches!(result, Err(EmbeddingError::InvalidModel(_))));
    }

    #[test]
    fn test_lazy_embedder_reports_init_failure() {
        let temp_dir = tempfile::tempdir().unwrap();
        let embedder = LazyEmbedder::new("nonexistent-model", temp_dir.path().to_path_buf());

        assert!(!embedder.is_initialized());
        let result = embedder.embed("anything");
        assert!(matches!(result, Err(EmbeddingError::InvalidModel(_))));
        assert!(!embedder.is_initialized());
    }
}
