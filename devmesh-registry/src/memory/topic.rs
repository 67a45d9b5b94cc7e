use super::MemoryShared;
use async_trait::async_trait;
use devmesh_error::CoordinationResult;
use devmesh_sdk::{Subscription, Topic, TopicHandler};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub(crate) struct MemoryTopic {
    name: String,
    shared: Arc<MemoryShared>,
}

impl MemoryTopic {
    pub(crate) fn new(name: &str, shared: Arc<MemoryShared>) -> Self {
        MemoryTopic {
            name: name.to_string(),
            shared,
        }
    }
}

#[async_trait]
impl Topic for MemoryTopic {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, payload: Value) -> CoordinationResult<u64> {
        let Some(sender) = self.shared.topics.get(&self.name).map(|s| s.value().clone())
        else {
            return Ok(0);
        };
        // send() fails only when no receiver is attached, which is the
        // zero-subscriber case rather than an error.
        match sender.send(payload) {
            Ok(received) => Ok(received as u64),
            Err(_) => Ok(0),
        }
    }

    async fn subscribe(&self, handler: TopicHandler) -> CoordinationResult<Subscription> {
        let sender = self.shared.sender(&self.name);
        let mut receiver = sender.subscribe();
        let token = CancellationToken::new();
        let child = token.clone();
        let topic = self.name.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    received = receiver.recv() => match received {
                        Ok(payload) => handler(payload).await,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(topic = %topic, skipped, "subscriber lagged, messages dropped");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!(topic = %topic, "subscription worker stopped");
        });
        Ok(Subscription::new(self.name.clone(), token))
    }
}
