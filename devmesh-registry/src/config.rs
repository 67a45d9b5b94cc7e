//! Per-entity configuration scopes.
//!
//! A scope wraps one coordination entity map (`device:cfg:{id}` or
//! `product:cfg:{id}`). Inheritance between device and product scopes is
//! composed by the operation handles, not here.

use devmesh_error::{MeshError, MeshResult};
use devmesh_sdk::{CoordinationClient, EntityMap};
use serde_json::{Map, Value};
use std::sync::Arc;

/// One configuration scope bound to an entity key.
#[derive(Clone)]
pub struct ConfigScope {
    map: Arc<dyn EntityMap>,
}

impl ConfigScope {
    pub fn new(client: &dyn CoordinationClient, entity_key: &str) -> Self {
        ConfigScope {
            map: client.map(entity_key),
        }
    }

    /// Write one key. Null values are rejected.
    pub async fn put(&self, key: &str, value: Value) -> MeshResult<()> {
        if value.is_null() {
            return Err(MeshError::IllegalArgument(format!(
                "config value for '{key}' must not be null"
            )));
        }
        self.map.put(key, value).await?;
        Ok(())
    }

    /// Write many keys with per-entry writes (not atomic).
    ///
    /// `None` and an empty map are accepted silently.
    pub async fn put_all(&self, values: Option<&Map<String, Value>>) -> MeshResult<()> {
        let Some(values) = values else {
            return Ok(());
        };
        for (key, value) in values {
            self.put(key, value.clone()).await?;
        }
        Ok(())
    }

    pub async fn get(&self, key: &str) -> MeshResult<Option<Value>> {
        Ok(self.map.get(key).await?)
    }

    pub async fn get_many(&self, keys: &[&str]) -> MeshResult<Map<String, Value>> {
        Ok(self.map.get_many(keys).await?)
    }

    pub async fn get_all(&self) -> MeshResult<Map<String, Value>> {
        Ok(self.map.get_all().await?)
    }

    /// Remove one key, returning the prior value.
    pub async fn remove(&self, key: &str) -> MeshResult<Option<Value>> {
        Ok(self.map.remove(key).await?)
    }

    /// Drop the whole scope (entity deletion).
    pub async fn clear(&self) -> MeshResult<()> {
        Ok(self.map.clear().await?)
    }
}

/// Merge `overlay` onto `base`, overlay winning per key.
pub(crate) fn shadow_merge(
    mut base: Map<String, Value>,
    overlay: Map<String, Value>,
) -> Map<String, Value> {
    for (key, value) in overlay {
        base.insert(key, value);
    }
    base
}
