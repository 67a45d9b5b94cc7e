//! In-process implementation of the coordination capability traits.
//!
//! Backs the same seams a Redis-like service would: topics are broadcast
//! channels keyed by name, buckets are a TTL cache, semaphores are permit
//! counters with change notification, entity maps are concurrent hash
//! maps. Suitable for tests and single-node deployments; the publish ack
//! count and get-and-delete semantics match what the rendezvous expects
//! from the real service.

mod bucket;
mod map;
mod semaphore;
mod topic;

use bucket::{BucketExpiry, MemoryBucket, StoredValue};
use dashmap::DashMap;
use devmesh_sdk::{Bucket, CoordinationClient, DistributedSemaphore, EntityMap, Topic};
use map::MemoryEntityMap;
use moka::future::Cache;
use semaphore::{MemorySemaphore, SemaphoreState};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use topic::MemoryTopic;

/// Per-topic broadcast buffer. Bursts beyond this lag the subscriber,
/// which is logged and skipped, matching pub/sub best-effort delivery.
const TOPIC_CAPACITY: usize = 1024;

pub(crate) struct MemoryShared {
    pub(crate) topics: DashMap<String, broadcast::Sender<Value>>,
    pub(crate) buckets: Cache<String, StoredValue>,
    pub(crate) semaphores: DashMap<String, Arc<SemaphoreState>>,
    pub(crate) maps: DashMap<String, Arc<DashMap<String, Value>>>,
}

impl MemoryShared {
    fn new() -> Self {
        MemoryShared {
            topics: DashMap::new(),
            buckets: Cache::builder().expire_after(BucketExpiry).build(),
            semaphores: DashMap::new(),
            maps: DashMap::new(),
        }
    }

    pub(crate) fn sender(&self, topic: &str) -> broadcast::Sender<Value> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .value()
            .clone()
    }
}

/// In-process coordination backend.
#[derive(Clone)]
pub struct MemoryCoordination {
    inner: Arc<MemoryShared>,
}

impl Default for MemoryCoordination {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCoordination {
    pub fn new() -> Self {
        MemoryCoordination {
            inner: Arc::new(MemoryShared::new()),
        }
    }

    /// Whether a semaphore key currently exists. Diagnostics and tests.
    pub fn contains_semaphore(&self, key: &str) -> bool {
        self.inner.semaphores.contains_key(key)
    }
}

impl CoordinationClient for MemoryCoordination {
    fn topic(&self, name: &str) -> Arc<dyn Topic> {
        Arc::new(MemoryTopic::new(name, Arc::clone(&self.inner)))
    }

    fn bucket(&self, key: &str) -> Arc<dyn Bucket> {
        Arc::new(MemoryBucket::new(key, Arc::clone(&self.inner)))
    }

    fn semaphore(&self, key: &str) -> Arc<dyn DistributedSemaphore> {
        Arc::new(MemorySemaphore::new(key, Arc::clone(&self.inner)))
    }

    fn map(&self, key: &str) -> Arc<dyn EntityMap> {
        Arc::new(MemoryEntityMap::new(key, Arc::clone(&self.inner)))
    }
}
