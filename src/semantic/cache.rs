//! Lazy embedding materialization.
//!
//! An item's embedding is a cached derived value: it is computed from
//! `"<title>. <description>"` the first time it is needed, written back to
//! the item store and never recomputed while a stored value exists.
//!
//! There is no locking around compute-then-write. Two callers racing on the
//! same item both compute the same vector and the last write wins.

use std::sync::Arc;

use rayon::prelude::*;

use crate::items::{Item, ItemStore};
use crate::semantic::embeddings::Embedder;
use crate::semantic::errors::SemanticError;
use crate::semantic::preprocess::embedding_text;

const BACKFILL_BATCH_SIZE: usize = 32;

/// Vectors with NaN or infinite components are never stored.
fn check_finite(item_id: u64, embedding: &[f32]) -> Result<(), SemanticError> {
    if embedding.iter().all(|x| x.is_finite()) {
        Ok(())
    } else {
        Err(SemanticError::InvalidEmbedding(item_id))
    }
}

/// An item paired with its (possibly freshly computed) embedding.
#[derive(Debug, Clone)]
pub struct Embedded {
    pub item: Item,
    pub embedding: Vec<f32>,
}

/// Outcome of a bulk backfill run.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct BackfillReport {
    /// Items found without an embedding
    pub scanned: usize,
    pub embedded: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct EmbeddingCache {
    store: Arc<dyn ItemStore>,
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingCache {
    pub fn new(store: Arc<dyn ItemStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    pub fn store(&self) -> &Arc<dyn ItemStore> {
        &self.store
    }

    /// Make sure the stored item has an embedding, computing and persisting
    /// one if it is absent. A present embedding is left untouched.
    pub fn ensure_embedding(&self, item_id: u64) -> Result<(), SemanticError> {
        let item = self
            .store
            .get_by_id(item_id)?
            .ok_or(SemanticError::ItemNotFound(item_id))?;

        if item.embedding.is_some() {
            log::trace!("item {item_id} already has an embedding");
            return Ok(());
        }

        self.materialize(item)?;
        Ok(())
    }

    /// Take the embedding out of an already fetched item, computing and
    /// persisting it first when the item has none. Saves a second fetch
    /// when the caller already holds the record.
    pub fn materialize(&self, mut item: Item) -> Result<Embedded, SemanticError> {
        let embedding = match item.embedding.take() {
            Some(embedding) => embedding,
            None => {
                let embedding = self.compute(&item)?;
                check_finite(item.id, &embedding)?;
                self.store.set_embedding(item.id, embedding.clone())?;
                log::debug!("stored embedding for item {}", item.id);
                embedding
            }
        };

        Ok(Embedded { item, embedding })
    }

    /// Compute embeddings for every stored item lacking one.
    ///
    /// Items are embedded in batches spread over a rayon pool of
    /// `parallelism` threads (rayon's default when `None`). A batch that
    /// fails is retried item by item so one bad text only fails itself.
    /// Failures are logged and counted, they do not stop the run, except
    /// an unavailable model. `on_progress` is called once per item.
    pub fn backfill<F>(
        &self,
        parallelism: Option<usize>,
        on_progress: F,
    ) -> Result<BackfillReport, SemanticError>
    where
        F: Fn() + Sync,
    {
        let pending: Vec<Item> = self
            .store
            .list()?
            .into_iter()
            .filter(|item| item.embedding.is_none())
            .collect();

        let mut report = BackfillReport {
            scanned: pending.len(),
            ..Default::default()
        };

        if pending.is_empty() {
            return Ok(report);
        }

        log::info!("backfilling embeddings for {} items", pending.len());

        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(threads) = parallelism {
            builder = builder.num_threads(threads);
        }
        let pool = builder
            .build()
            .map_err(|err| SemanticError::Store(err.into()))?;

        let outcomes: Vec<(u64, Result<(), SemanticError>)> = pool.install(|| {
            pending
                .par_chunks(BACKFILL_BATCH_SIZE)
                .flat_map_iter(|batch| {
                    let outcomes = self.backfill_batch(batch);
                    outcomes.iter().for_each(|_| on_progress());
                    outcomes
                })
                .collect()
        });

        for (id, outcome) in outcomes {
            match outcome {
                Ok(()) => report.embedded += 1,
                Err(SemanticError::ModelUnavailable(msg)) => {
                    return Err(SemanticError::ModelUnavailable(msg))
                }
                Err(err) => {
                    log::warn!("failed to embed item {id}: {err}");
                    report.failed += 1;
                }
            }
        }

        log::info!(
            "backfill done: {} embedded, {} failed",
            report.embedded,
            report.failed
        );

        Ok(report)
    }

    fn backfill_batch(&self, items: &[Item]) -> Vec<(u64, Result<(), SemanticError>)> {
        let texts: Vec<String> = items
            .iter()
            .map(|item| embedding_text(&item.title, item.description.as_deref()))
            .collect();

        match self.embedder.embed_batch(&texts) {
            Ok(embeddings) if embeddings.len() == items.len() => items
                .iter()
                .zip(embeddings)
                .map(|(item, embedding)| {
                    let stored = check_finite(item.id, &embedding).and_then(|()| {
                        self.store
                            .set_embedding(item.id, embedding)
                            .map_err(SemanticError::from)
                    });
                    (item.id, stored)
                })
                .collect(),
            result => {
                if let Err(err) = result {
                    log::debug!("batch of {} failed ({err}), retrying one by one", items.len());
                }
                items
                    .iter()
                    .map(|item| (item.id, self.materialize(item.clone()).map(|_| ())))
                    .collect()
            }
        }
    }

    fn compute(&self, item: &Item) -> Result<Vec<f32>, SemanticError> {
        let text = embedding_text(&item.title, item.description.as_deref());
        Ok(self.embedder.embed(&text)?)
    }
}
