use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use tokio::sync::RwLock;

use crate::cache::models::PredictionCacheEntry;
use crate::inference::pipeline::Classification;

/// In-memory prediction cache keyed by the SHA-256 of the uploaded bytes.
///
/// Inference is a pure function of the loaded weights and the input, so a hit
/// is exactly what rerunning the model would return.
#[derive(Clone)]
pub struct PredictionCache {
    state: Arc<RwLock<CacheState>>,
    capacity: usize,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, PredictionCacheEntry>,
    tick: u64,
}

impl CacheState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache miss")]
    CacheMiss,
}

impl PredictionCache {
    /// A cache holding at most `capacity` entries; zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(CacheState::default())),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    pub async fn get(&self, image_hash: &str) -> Option<PredictionCacheEntry> {
        if !self.is_enabled() {
            return None;
        }
        let mut state = self.state.write().await;
        let tick = state.next_tick();
        let entry = state.entries.get_mut(image_hash)?;
        entry.touch();
        entry.last_access_tick = tick;
        debug!("Prediction cache hit for {}", image_hash);
        Some(entry.clone())
    }

    pub async fn insert(
        &self,
        image_hash: String,
        file_name: Option<String>,
        classification: Classification,
    ) -> Option<PredictionCacheEntry> {
        if !self.is_enabled() {
            return None;
        }
        let mut state = self.state.write().await;

        if !state.entries.contains_key(&image_hash) && state.entries.len() >= self.capacity {
            let victim = state
                .entries
                .values()
                .min_by_key(|entry| entry.last_access_tick)
                .map(|entry| entry.image_hash.clone());
            if let Some(victim) = victim {
                state.entries.remove(&victim);
                debug!("Evicted {} from prediction cache", victim);
            }
        }

        let tick = state.next_tick();
        let mut entry = PredictionCacheEntry::new(image_hash.clone(), file_name, classification);
        entry.sequence = tick;
        entry.last_access_tick = tick;
        state.entries.insert(image_hash, entry.clone());
        Some(entry)
    }

    /// Cached predictions, most recently created first.
    pub async fn history(&self) -> Vec<PredictionCacheEntry> {
        let state = self.state.read().await;
        let mut entries: Vec<PredictionCacheEntry> = state.entries.values().cloned().collect();
        entries.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        entries
    }

    pub async fn remove(&self, image_hash: &str) -> Result<PredictionCacheEntry, CacheError> {
        self.state
            .write()
            .await
            .entries
            .remove(image_hash)
            .ok_or(CacheError::CacheMiss)
    }

    /// Drops every entry and returns how many there were.
    pub async fn clear(&self) -> usize {
        let mut state = self.state.write().await;
        let removed = state.entries.len();
        state.entries.clear();
        removed
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
