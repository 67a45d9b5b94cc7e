//! Capability traits over the shared coordination service.
//!
//! The registry and the gateways only ever talk to the store through these
//! seams, so any Redis-like service with pub/sub, TTL buckets, counting
//! semaphores and hash maps can back a cluster. The in-process backend in
//! `devmesh-registry` implements the same traits for tests and single-node
//! deployments.

use async_trait::async_trait;
use devmesh_error::CoordinationResult;
use futures::future::BoxFuture;
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

/// Handler invoked for each payload delivered on a subscribed topic.
pub type TopicHandler = Box<dyn Fn(Value) -> BoxFuture<'static, ()> + Send + Sync>;

/// Factory for the four coordination primitives.
///
/// Handles are cheap, stateless views; the store is the single source of
/// truth and all methods hit it directly.
pub trait CoordinationClient: Send + Sync {
    fn topic(&self, name: &str) -> Arc<dyn Topic>;
    fn bucket(&self, key: &str) -> Arc<dyn Bucket>;
    fn semaphore(&self, key: &str) -> Arc<dyn DistributedSemaphore>;
    fn map(&self, key: &str) -> Arc<dyn EntityMap>;
}

/// Fire-and-forget pub/sub channel.
#[async_trait]
pub trait Topic: Send + Sync {
    fn name(&self) -> &str;

    /// Publish `payload`, returning the number of subscribers that
    /// received it.
    async fn publish(&self, payload: Value) -> CoordinationResult<u64>;

    /// Register `handler` for payloads published after this call.
    ///
    /// Delivery runs on a worker task per subscription; dropping the
    /// returned [`Subscription`] stops delivery.
    async fn subscribe(&self, handler: TopicHandler) -> CoordinationResult<Subscription>;
}

/// Single-value slot with optional TTL and atomic get-and-delete.
#[async_trait]
pub trait Bucket: Send + Sync {
    async fn set(&self, value: Value, ttl: Option<Duration>) -> CoordinationResult<()>;
    async fn get(&self) -> CoordinationResult<Option<Value>>;
    /// Read and remove the value in one step.
    async fn get_and_delete(&self) -> CoordinationResult<Option<Value>>;
    /// Remove the value; `true` when something was present.
    async fn delete(&self) -> CoordinationResult<bool>;
}

/// Cross-node counting semaphore.
///
/// Permits start at zero; `release` adds and `acquire` takes, blocking up
/// to the given timeout. The key disappears on `delete` or TTL expiry and
/// pending waiters then simply time out.
#[async_trait]
pub trait DistributedSemaphore: Send + Sync {
    /// Initialize the permit count if the semaphore does not exist yet.
    async fn try_set_permits(&self, permits: u32) -> CoordinationResult<bool>;
    /// Take `permits`, waiting up to `timeout`. `Ok(false)` on timeout.
    async fn acquire(&self, permits: u32, timeout: Duration) -> CoordinationResult<bool>;
    async fn release(&self, permits: u32) -> CoordinationResult<()>;
    async fn expire(&self, ttl: Duration) -> CoordinationResult<()>;
    async fn delete(&self) -> CoordinationResult<()>;
}

/// String-keyed hash map bound to one entity.
#[async_trait]
pub trait EntityMap: Send + Sync {
    /// Insert a value, returning the previous one.
    async fn put(&self, key: &str, value: Value) -> CoordinationResult<Option<Value>>;
    async fn get(&self, key: &str) -> CoordinationResult<Option<Value>>;
    /// Fetch a subset of keys; absent keys are omitted from the result.
    async fn get_many(
        &self,
        keys: &[&str],
    ) -> CoordinationResult<serde_json::Map<String, Value>>;
    async fn get_all(&self) -> CoordinationResult<serde_json::Map<String, Value>>;
    async fn remove(&self, key: &str) -> CoordinationResult<Option<Value>>;
    /// Drop the whole map.
    async fn clear(&self) -> CoordinationResult<()>;
}

/// Active topic subscription; delivery stops when this is dropped.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    token: CancellationToken,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, token: CancellationToken) -> Self {
        Subscription {
            topic: topic.into(),
            token,
        }
    }

    #[inline]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Stop delivery explicitly instead of by drop.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
