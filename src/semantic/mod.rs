//! Embedding and matching core for lost and found items.
//!
//! # Architecture
//!
//! - `embeddings`: `Embedder` trait and the fastembed-backed provider
//! - `preprocess`: text an item is embedded from
//! - `similarity`: cosine similarity
//! - `cache`: lazy embedding materialization and bulk backfill
//! - `matcher`: opposite-type top-k ranking

pub mod cache;
pub mod embeddings;
mod errors;
pub mod matcher;
pub mod preprocess;
pub mod similarity;

pub use cache::{BackfillReport, EmbeddingCache};
pub use embeddings::{Embedder, EmbeddingError, LazyEmbedder};
pub use errors::SemanticError;
pub use matcher::{MatchResult, Matcher};

/// Default embedding model name (384-dimensional sentence embeddings)
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";
