pub mod errors;

use std::sync::Arc;

use anyhow::Context;

use crate::{
    config::Config,
    items::{self, Item, ItemCreate, ItemStore},
    semantic::{BackfillReport, Embedder, EmbeddingCache, LazyEmbedder, MatchResult, Matcher},
};

pub use errors::AppError;

/// Wires the item store, the embedding provider and the matcher together.
/// Every entry point (HTTP handlers, CLI commands) goes through here.
pub struct App {
    store: Arc<dyn ItemStore>,
    cache: EmbeddingCache,
    matcher: Matcher,
    config: Config,
}

impl App {
    /// Build the app from config: a CSV item store under the base path and
    /// a lazily loaded embedding model.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let items_path = config.items_path();
        let items_path = items_path
            .to_str()
            .context("item database path is not valid utf8")?;
        let store = Arc::new(items::BackendCsv::load(items_path)?);

        let embedder = Arc::new(LazyEmbedder::new(&config.model, config.base_path().to_path_buf()));

        Ok(Self::new_with(store, embedder, config))
    }

    pub fn new_with(
        store: Arc<dyn ItemStore>,
        embedder: Arc<dyn Embedder>,
        config: Config,
    ) -> Self {
        let cache = EmbeddingCache::new(store.clone(), embedder);
        let matcher = Matcher::new(cache.clone());

        Self {
            store,
            cache,
            matcher,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Store a new item. With `embed_on_create` its embedding is computed
    /// right away; if that fails the item is still stored and the embedding
    /// is left for the next match request.
    pub fn create_item(&self, item_create: ItemCreate) -> Result<Item, AppError> {
        if item_create.title.trim().is_empty() {
            return Err(AppError::InvalidInput("title must not be empty".to_string()));
        }

        let item = self.store.create(item_create)?;
        log::info!("created {} item {}", item.kind, item.id);

        if !self.config.embed_on_create {
            return Ok(item);
        }

        let id = item.id;
        match self.cache.materialize(item) {
            Ok(embedded) => Ok(Item {
                embedding: Some(embedded.embedding),
                ..embedded.item
            }),
            Err(err) => {
                log::warn!("couldnt embed item {id} on create: {err}");
                self.get_item(id)
            }
        }
    }

    pub fn get_item(&self, id: u64) -> Result<Item, AppError> {
        self.store.get_by_id(id)?.ok_or(AppError::NotFound(id))
    }

    pub fn ensure_embedding(&self, id: u64) -> Result<(), AppError> {
        Ok(self.cache.ensure_embedding(id)?)
    }

    /// `top_k` falls back to the configured default.
    pub fn find_matches(&self, id: u64, top_k: Option<i64>) -> Result<Vec<MatchResult>, AppError> {
        let top_k = top_k.unwrap_or(self.config.default_top_k);
        Ok(self.matcher.find_matches(id, top_k)?)
    }

    pub fn backfill<F>(&self, on_progress: F) -> Result<BackfillReport, AppError>
    where
        F: Fn() + Sync,
    {
        Ok(self.cache.backfill(self.config.parallelism(), on_progress)?)
    }

    /// Number of items that still need an embedding.
    pub fn pending_embeddings(&self) -> Result<usize, AppError> {
        Ok(self
            .store
            .list()?
            .iter()
            .filter(|item| item.embedding.is_none())
            .count())
    }
}
