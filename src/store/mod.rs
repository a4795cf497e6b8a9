//! Entity records and the remote CRUD store
//!
//! Provides:
//! - `Entity`: a benchmarked subject with its sparse per-slot result list
//! - `RemoteStore`: the CRUD seam (HTTP in production, memory in tests)
//! - `EntityCache`: the caller-owned in-memory view the queue reads and writes

mod http;

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::benchmark::BenchmarkConfig;
use crate::prompt::PromptChain;

pub use http::HttpStore;

/// An entity that benchmark images are generated for (e.g. an artist)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    /// Sparse, slot-indexed image references; empty string means not generated
    #[serde(default)]
    pub benchmarks: Vec<String>,
}

impl Entity {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Image reference for a slot, if generated
    pub fn benchmark(&self, slot: usize) -> Option<&str> {
        self.benchmarks
            .get(slot)
            .map(String::as_str)
            .filter(|r| !r.is_empty())
    }

    /// Write an image reference at `slot`, padding earlier slots with empty
    /// placeholders. Existing entries are overwritten in place.
    pub fn set_benchmark(&mut self, slot: usize, image_ref: String) {
        if self.benchmarks.len() <= slot {
            self.benchmarks.resize(slot + 1, String::new());
        }
        self.benchmarks[slot] = image_ref;
    }

    /// Slots in `0..slot_count` without a result
    pub fn missing_slots(&self, slot_count: usize) -> Vec<usize> {
        (0..slot_count)
            .filter(|&slot| self.benchmark(slot).is_none())
            .collect()
    }
}

/// Remote store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{0} not found")]
    NotFound(String),
}

/// CRUD access to persisted entities, chains and benchmark configuration
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn list_entities(&self) -> Result<Vec<Entity>, StoreError>;

    async fn get_entity(&self, id: &str) -> Result<Option<Entity>, StoreError>;

    /// Write the full record; `benchmarks` is always sent whole
    async fn update_entity(&self, entity: &Entity) -> Result<(), StoreError>;

    async fn load_chain(&self, id: &str) -> Result<Option<PromptChain>, StoreError>;

    async fn save_chain(&self, chain: &PromptChain) -> Result<(), StoreError>;

    async fn load_benchmark_config(&self) -> Result<Option<BenchmarkConfig>, StoreError>;

    async fn save_benchmark_config(&self, config: &BenchmarkConfig) -> Result<(), StoreError>;
}

/// In-process store, used when no backend is configured and in tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    entities: RwLock<HashMap<String, Entity>>,
    chains: RwLock<HashMap<String, PromptChain>>,
    benchmark: RwLock<Option<BenchmarkConfig>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with entities
    pub fn with_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        let store = Self::new();
        {
            let mut map = store.entities.write();
            for entity in entities {
                map.insert(entity.id.clone(), entity);
            }
        }
        store
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list_entities(&self) -> Result<Vec<Entity>, StoreError> {
        let mut entities: Vec<Entity> = self.entities.read().values().cloned().collect();
        entities.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entities)
    }

    async fn get_entity(&self, id: &str) -> Result<Option<Entity>, StoreError> {
        Ok(self.entities.read().get(id).cloned())
    }

    async fn update_entity(&self, entity: &Entity) -> Result<(), StoreError> {
        self.entities
            .write()
            .insert(entity.id.clone(), entity.clone());
        Ok(())
    }

    async fn load_chain(&self, id: &str) -> Result<Option<PromptChain>, StoreError> {
        Ok(self.chains.read().get(id).cloned())
    }

    async fn save_chain(&self, chain: &PromptChain) -> Result<(), StoreError> {
        self.chains.write().insert(chain.id.clone(), chain.clone());
        Ok(())
    }

    async fn load_benchmark_config(&self) -> Result<Option<BenchmarkConfig>, StoreError> {
        Ok(self.benchmark.read().clone())
    }

    async fn save_benchmark_config(&self, config: &BenchmarkConfig) -> Result<(), StoreError> {
        *self.benchmark.write() = Some(config.clone());
        Ok(())
    }
}

/// Caller-owned snapshot of entity data.
///
/// The queue re-reads an entity here immediately before building its update
/// payload, and writes the result back before the remote write.
#[derive(Debug, Default)]
pub struct EntityCache {
    entities: RwLock<HashMap<String, Entity>>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest snapshot of an entity
    pub fn get(&self, id: &str) -> Option<Entity> {
        self.entities.read().get(id).cloned()
    }

    /// Insert or replace an entity
    pub fn upsert(&self, entity: Entity) {
        self.entities.write().insert(entity.id.clone(), entity);
    }

    /// Replace the whole view
    pub fn replace_all(&self, entities: Vec<Entity>) {
        let mut map = self.entities.write();
        map.clear();
        for entity in entities {
            map.insert(entity.id.clone(), entity);
        }
    }

    /// All entities sorted by name
    pub fn list(&self) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self.entities.read().values().cloned().collect();
        entities.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        entities
    }

    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    /// Reload the view from the remote store
    pub async fn refresh_from(&self, store: &dyn RemoteStore) -> Result<usize, StoreError> {
        let entities = store.list_entities().await?;
        let count = entities.len();
        self.replace_all(entities);
        debug!("Loaded {} entities into cache", count);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_benchmark_pads() {
        let mut entity = Entity::new("a1", "wlop");
        entity.set_benchmark(2, "img2".to_string());
        assert_eq!(entity.benchmarks, vec!["", "", "img2"]);

        entity.set_benchmark(0, "img0".to_string());
        assert_eq!(entity.benchmarks, vec!["img0", "", "img2"]);

        entity.set_benchmark(2, "img2b".to_string());
        assert_eq!(entity.benchmarks, vec!["img0", "", "img2b"]);
    }

    #[test]
    fn test_missing_slots() {
        let mut entity = Entity::new("a1", "wlop");
        entity.set_benchmark(1, "img1".to_string());
        assert_eq!(entity.missing_slots(4), vec![0, 2, 3]);
        assert_eq!(entity.benchmark(1), Some("img1"));
        assert_eq!(entity.benchmark(0), None);
    }

    #[test]
    fn test_entity_wire_format() {
        let mut entity = Entity::new("a1", "wlop");
        entity.set_benchmark(1, "img1".to_string());
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["imageUrl"], "");
        assert!(json.get("previewUrl").is_none());
        assert_eq!(json["benchmarks"], serde_json::json!(["", "img1"]));
    }

    #[tokio::test]
    async fn test_cache_refresh_from_store() {
        let store =
            MemoryStore::with_entities([Entity::new("b", "zeta"), Entity::new("a", "alpha")]);
        let cache = EntityCache::new();

        let count = cache.refresh_from(&store).await.unwrap();
        assert_eq!(count, 2);
        let names: Vec<String> = cache.list().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        assert!(store.load_benchmark_config().await.unwrap().is_none());

        let config = BenchmarkConfig::default();
        store.save_benchmark_config(&config).await.unwrap();
        assert_eq!(store.load_benchmark_config().await.unwrap(), Some(config));

        let chain = PromptChain {
            id: "c1".to_string(),
            ..Default::default()
        };
        store.save_chain(&chain).await.unwrap();
        assert_eq!(store.load_chain("c1").await.unwrap(), Some(chain));
    }
}
