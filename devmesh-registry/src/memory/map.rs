use super::MemoryShared;
use async_trait::async_trait;
use dashmap::DashMap;
use devmesh_error::CoordinationResult;
use devmesh_sdk::EntityMap;
use serde_json::{Map, Value};
use std::sync::Arc;

pub(crate) struct MemoryEntityMap {
    key: String,
    shared: Arc<MemoryShared>,
}

impl MemoryEntityMap {
    pub(crate) fn new(key: &str, shared: Arc<MemoryShared>) -> Self {
        MemoryEntityMap {
            key: key.to_string(),
            shared,
        }
    }

    fn entries(&self) -> Arc<DashMap<String, Value>> {
        self.shared
            .maps
            .entry(self.key.clone())
            .or_insert_with(|| Arc::new(DashMap::new()))
            .value()
            .clone()
    }
}

#[async_trait]
impl EntityMap for MemoryEntityMap {
    async fn put(&self, key: &str, value: Value) -> CoordinationResult<Option<Value>> {
        Ok(self.entries().insert(key.to_string(), value))
    }

    async fn get(&self, key: &str) -> CoordinationResult<Option<Value>> {
        let Some(entries) = self.shared.maps.get(&self.key).map(|m| m.value().clone())
        else {
            return Ok(None);
        };
        Ok(entries.get(key).map(|v| v.value().clone()))
    }

    async fn get_many(&self, keys: &[&str]) -> CoordinationResult<Map<String, Value>> {
        let mut result = Map::new();
        let Some(entries) = self.shared.maps.get(&self.key).map(|m| m.value().clone())
        else {
            return Ok(result);
        };
        for key in keys {
            if let Some(value) = entries.get(*key) {
                result.insert((*key).to_string(), value.value().clone());
            }
        }
        Ok(result)
    }

    async fn get_all(&self) -> CoordinationResult<Map<String, Value>> {
        let mut result = Map::new();
        let Some(entries) = self.shared.maps.get(&self.key).map(|m| m.value().clone())
        else {
            return Ok(result);
        };
        for entry in entries.iter() {
            result.insert(entry.key().clone(), entry.value().clone());
        }
        Ok(result)
    }

    async fn remove(&self, key: &str) -> CoordinationResult<Option<Value>> {
        let Some(entries) = self.shared.maps.get(&self.key).map(|m| m.value().clone())
        else {
            return Ok(None);
        };
        Ok(entries.remove(key).map(|(_, v)| v))
    }

    async fn clear(&self) -> CoordinationResult<()> {
        self.shared.maps.remove(&self.key);
        Ok(())
    }
}
