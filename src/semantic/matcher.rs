//! Ranks opposite-type items by similarity to a query item.
//!
//! Every candidate is scored with a linear scan.

use serde::{Deserialize, Serialize};

use crate::semantic::cache::{Embedded, EmbeddingCache};
use crate::semantic::errors::SemanticError;
use crate::semantic::similarity::cosine_similarity;

/// One ranked candidate. Built per request, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub id: u64,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub location: Option<String>,
    pub score: f32,
}

/// The type whose items are matched against an item of type `kind`.
///
/// Only a case-insensitive "lost" maps to "found"; every other value,
/// including unknown ones, maps to "lost".
pub fn opposite_type(kind: &str) -> &'static str {
    if kind.to_lowercase() == "lost" {
        "found"
    } else {
        "lost"
    }
}

#[derive(Clone)]
pub struct Matcher {
    cache: EmbeddingCache,
}

impl Matcher {
    pub fn new(cache: EmbeddingCache) -> Self {
        Self { cache }
    }

    /// Return up to `top_k` opposite-type items ordered by descending
    /// cosine similarity to `item_id`.
    ///
    /// Candidates are fetched by the exact opposite type string, so a
    /// candidate stored as "Found" is not matched against a "lost" query.
    /// Equal scores keep the store's retrieval order. Missing embeddings of
    /// the query and every candidate are computed and persisted before
    /// scoring, even when `top_k` leaves nothing to return. Any embedding
    /// failure aborts the whole request.
    pub fn find_matches(
        &self,
        item_id: u64,
        top_k: i64,
    ) -> Result<Vec<MatchResult>, SemanticError> {
        let store = self.cache.store();

        let item = store
            .get_by_id(item_id)?
            .ok_or(SemanticError::ItemNotFound(item_id))?;

        let opposite = opposite_type(&item.kind);
        let candidates = store.get_by_type(opposite)?;

        log::debug!(
            "matching item {item_id} (type '{}') against {} '{opposite}' items",
            item.kind,
            candidates.len()
        );

        let pool = candidates
            .into_iter()
            .map(|candidate| self.cache.materialize(candidate))
            .collect::<Result<Vec<Embedded>, _>>()?;

        let query = self.cache.materialize(item)?;

        if pool.is_empty() || top_k <= 0 {
            return Ok(vec![]);
        }

        let mut scored = Vec::with_capacity(pool.len());
        for candidate in pool {
            let score = cosine_similarity(&query.embedding, &candidate.embedding)?;
            if !score.is_finite() {
                return Err(SemanticError::InvalidEmbedding(candidate.item.id));
            }
            scored.push((candidate, score));
        }

        // stable: ties keep retrieval order
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let top_k = usize::try_from(top_k).unwrap_or(usize::MAX);
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(candidate, score)| MatchResult {
                id: candidate.item.id,
                title: candidate.item.title,
                description: candidate.item.description,
                kind: candidate.item.kind,
                location: candidate.item.location,
                score,
            })
            .collect())
    }
}
