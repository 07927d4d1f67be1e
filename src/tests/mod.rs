
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::items::{BackendCsv, Item, ItemCreate, ItemStore};
use crate::semantic::similarity::normalize;
use crate::semantic::{Embedder, EmbeddingError};

/// Deterministic stand-in for the model: a normalized bag of hashed
/// lowercase words. Texts sharing words get a higher cosine similarity.
pub struct HashEmbedder {
    dimensions: usize,
    calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self {
            dimensions: 256,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut vector = vec![0.0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() % self.dimensions as u64) as usize] += 1.0;
        }

        Ok(normalize(vector))
    }
}

/// Provider whose model never loads.
pub struct UnavailableEmbedder;

impl Embedder for UnavailableEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::InitFailed("weights missing".to_string()))
    }
}

/// Provider that fails for texts containing `poison`.
pub struct FlakyEmbedder {
    inner: HashEmbedder,
    poison: &'static str,
}

impl FlakyEmbedder {
    pub fn new(poison: &'static str) -> Self {
        Self {
            inner: HashEmbedder::new(),
            poison,
        }
    }
}

impl Embedder for FlakyEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.contains(self.poison) {
            return Err(EmbeddingError::EmbeddingFailed(format!(
                "refusing to embed '{text}'"
            )));
        }
        self.inner.embed(text)
    }
}

/// Provider that returns NaN components for texts containing `poison`.
pub struct NanEmbedder {
    inner: HashEmbedder,
    poison: &'static str,
}

impl NanEmbedder {
    pub fn new(poison: &'static str) -> Self {
        Self {
            inner: HashEmbedder::new(),
            poison,
        }
    }
}

impl Embedder for NanEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = self.inner.embed(text)?;
        if text.contains(self.poison) {
            vector[0] = f32::NAN;
        }
        Ok(vector)
    }
}

pub fn fresh_store() -> (Arc<BackendCsv>, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let csv_path = tmp.path().join("items.csv");
    let store = BackendCsv::load(csv_path.to_str().unwrap()).expect("failed to create item csv");
    (Arc::new(store), tmp)
}

pub fn add(store: &dyn ItemStore, title: &str, description: Option<&str>, kind: &str) -> Item {
    store
        .create(ItemCreate {
            title: title.to_string(),
            description: description.map(str::to_string),
            kind: kind.to_string(),
            location: None,
        })
        .unwrap()
}
