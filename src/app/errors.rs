use crate::semantic::SemanticError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("item not found")]
    NotFound(u64),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("semantic error: {0}")]
    Semantic(SemanticError),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}

impl From<SemanticError> for AppError {
    fn from(err: SemanticError) -> Self {
        match err {
            SemanticError::ItemNotFound(id) => AppError::NotFound(id),
            SemanticError::ModelUnavailable(msg) => AppError::ModelUnavailable(msg),
            SemanticError::Store(err) => AppError::Other(err),
            other => AppError::Semantic(other),
        }
    }
}
