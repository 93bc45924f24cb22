//! Exact-text embedding cache.
//!
//! Keys are the SHA-256 of `model \0 text`, so switching embedding models
//! never returns a vector from the wrong space. The cache is owned by the
//! curator and lives for as long as the curator does.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use tracing::debug;

use ace_contracts::error::AceResult;
use ace_core::traits::EmbeddingService;

/// Stable cache key for `text` embedded by `model`.
pub fn content_key(model: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Default)]
pub struct EmbeddingCache {
    entries: HashMap<String, Vec<f32>>,
    hits: u64,
    misses: u64,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached vector for `text`, embedding it on a miss.
    pub fn get_or_compute(&mut self, text: &str, service: &dyn EmbeddingService) -> AceResult<Vec<f32>> {
        let key = content_key(service.model(), text);
        if let Some(vector) = self.entries.get(&key) {
            self.hits += 1;
            return Ok(vector.clone());
        }

        let vector = service.embed(text)?;
        self.misses += 1;
        debug!(model = service.model(), dimensions = vector.len(), "embedding cached");
        self.entries.insert(key, vector.clone());
        Ok(vector)
    }

    /// Seed the cache with a vector computed elsewhere.
    pub fn insert(&mut self, model: &str, text: &str, vector: Vec<f32>) {
        self.entries.insert(content_key(model, text), vector);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}
