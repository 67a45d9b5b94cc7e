use super::MemoryShared;
use async_trait::async_trait;
use devmesh_error::{coordination::CoordinationError, CoordinationResult};
use devmesh_sdk::Bucket;
use moka::Expiry;
use serde_json::Value;
use std::{sync::Arc, time::Duration, time::Instant};

/// A stored value with its per-entry TTL.
#[derive(Clone)]
pub(crate) struct StoredValue {
    pub(crate) value: Value,
    pub(crate) ttl: Option<Duration>,
}

/// Maps each entry's TTL onto the cache's expiration clock.
pub(crate) struct BucketExpiry;

impl Expiry<String, StoredValue> for BucketExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        item: &StoredValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        item.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        item: &StoredValue,
        _updated_at: Instant,
        _remaining: Option<Duration>,
    ) -> Option<Duration> {
        item.ttl
    }
}

pub(crate) struct MemoryBucket {
    key: String,
    shared: Arc<MemoryShared>,
}

impl MemoryBucket {
    pub(crate) fn new(key: &str, shared: Arc<MemoryShared>) -> Self {
        MemoryBucket {
            key: key.to_string(),
            shared,
        }
    }
}

#[async_trait]
impl Bucket for MemoryBucket {
    async fn set(&self, value: Value, ttl: Option<Duration>) -> CoordinationResult<()> {
        if ttl.is_some_and(|t| t.is_zero()) {
            return Err(CoordinationError::InvalidTtl("ttl must be > 0".into()));
        }
        self.shared
            .buckets
            .insert(self.key.clone(), StoredValue { value, ttl })
            .await;
        Ok(())
    }

    async fn get(&self) -> CoordinationResult<Option<Value>> {
        Ok(self.shared.buckets.get(&self.key).await.map(|s| s.value))
    }

    async fn get_and_delete(&self) -> CoordinationResult<Option<Value>> {
        Ok(self.shared.buckets.remove(&self.key).await.map(|s| s.value))
    }

    async fn delete(&self) -> CoordinationResult<bool> {
        Ok(self.shared.buckets.remove(&self.key).await.is_some())
    }
}
