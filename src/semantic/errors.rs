use crate::semantic::embeddings::EmbeddingError;

/// Errors surfaced by embedding materialization and matching.
#[derive(Debug, thiserror::Error)]
pub enum SemanticError {
    #[error("item {0} not found")]
    ItemNotFound(u64),

    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("embedding generation failed: {0}")]
    Embedding(String),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("item {0} has a non-finite embedding")]
    InvalidEmbedding(u64),

    #[error("item store error: {0:?}")]
    Store(#[from] anyhow::Error),
}

impl From<EmbeddingError> for SemanticError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::InitFailed(_) | EmbeddingError::InvalidModel(_) => {
                SemanticError::ModelUnavailable(err.to_string())
            }
            EmbeddingError::EmbeddingFailed(msg) => SemanticError::Embedding(msg),
        }
    }
}
