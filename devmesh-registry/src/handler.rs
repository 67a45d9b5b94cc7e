use dashmap::{mapref::entry::Entry, DashMap};
use devmesh_error::{MeshError, MeshResult};
use devmesh_sdk::{
    constants::{
        alive_check_topic, alive_reply_key, message_accept_topic, message_reply_key,
        reply_semaphore_key, PROBE_ID_FIELD,
    },
    CoordinationClient, MessageEnvelope, Settings, Subscription,
};
use futures::future::BoxFuture;
use serde_json::Value;
use std::{
    future::Future,
    sync::{Arc, Mutex, Weak},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type DeviceHandler = Arc<dyn Fn(MessageEnvelope) -> BoxFuture<'static, ()> + Send + Sync>;

/// Gateway-side message plumbing for one server id.
///
/// Consumes the node's accept topic, fans messages out to per-device
/// workers (serialized per device, concurrent across devices) and writes
/// replies back through the bucket-then-semaphore rendezvous. Also
/// answers liveness probes for this server id: constructing a gateway is
/// what makes the node "alive" to its peers.
#[derive(Clone)]
pub struct MessageGateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    server_id: String,
    client: Arc<dyn CoordinationClient>,
    settings: Settings,
    handlers: DashMap<String, DeviceHandler>,
    queues: DashMap<String, mpsc::Sender<MessageEnvelope>>,
    subscriptions: Mutex<Vec<Subscription>>,
    shutdown: CancellationToken,
}

impl MessageGateway {
    pub async fn new(
        client: Arc<dyn CoordinationClient>,
        server_id: impl Into<String>,
        settings: Settings,
    ) -> MeshResult<Self> {
        let server_id = server_id.into();
        let inner = Arc::new(GatewayInner {
            server_id: server_id.clone(),
            client: Arc::clone(&client),
            settings,
            handlers: DashMap::new(),
            queues: DashMap::new(),
            subscriptions: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
        });

        let dispatch_target = Arc::downgrade(&inner);
        let accept = client
            .topic(&message_accept_topic(&server_id))
            .subscribe(Box::new(move |payload| {
                let target = Weak::clone(&dispatch_target);
                Box::pin(async move {
                    if let Some(inner) = target.upgrade() {
                        inner.dispatch(payload).await;
                    }
                })
            }))
            .await?;

        let probe_target = Arc::downgrade(&inner);
        let alive = client
            .topic(&alive_check_topic(&server_id))
            .subscribe(Box::new(move |payload| {
                let target = Weak::clone(&probe_target);
                Box::pin(async move {
                    if let Some(inner) = target.upgrade() {
                        inner.answer_probe(payload).await;
                    }
                })
            }))
            .await?;

        {
            let mut subscriptions = inner
                .subscriptions
                .lock()
                .expect("gateway subscription lock poisoned");
            subscriptions.push(accept);
            subscriptions.push(alive);
        }
        info!(server_id = %inner.server_id, "message gateway listening");
        Ok(MessageGateway { inner })
    }

    #[inline]
    pub fn server_id(&self) -> &str {
        &self.inner.server_id
    }

    /// Register (or replace) the consumer for one device.
    ///
    /// Messages for the device are handled one at a time in arrival
    /// order; different devices are handled concurrently.
    pub fn handle_message<F, Fut>(&self, device_id: impl Into<String>, handler: F)
    where
        F: Fn(MessageEnvelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let device_id = device_id.into();
        let handler: DeviceHandler = Arc::new(move |envelope| Box::pin(handler(envelope)));
        self.inner.handlers.insert(device_id.clone(), handler);
        self.inner.ensure_worker(device_id);
    }

    /// Store a reply and wake the waiting sender.
    ///
    /// The bucket write happens strictly before the semaphore release so
    /// the waiter that acquires always observes the value. Both steps run
    /// even if the waiter already timed out: the TTL cleans up after us.
    pub async fn reply(&self, reply: MessageEnvelope) -> MeshResult<()> {
        let message_id = reply.message_id.clone();
        if message_id.is_empty() {
            return Err(MeshError::IllegalArgument(
                "reply message id must not be empty".into(),
            ));
        }
        let ttl = self.inner.settings.message.reply_ttl();
        self.inner
            .client
            .bucket(&message_reply_key(&message_id))
            .set(reply.to_value()?, Some(ttl))
            .await?;
        self.inner
            .client
            .semaphore(&reply_semaphore_key(&message_id))
            .release(1)
            .await?;
        debug!(message_id = %message_id, "reply stored and waiter released");
        Ok(())
    }

    /// Acknowledge a fire-and-forget message without writing a reply, so
    /// the sender is not blocked until its timeout.
    pub async fn mark_message_async(&self, message_id: &str) -> MeshResult<()> {
        self.inner
            .client
            .semaphore(&reply_semaphore_key(message_id))
            .release(1)
            .await?;
        Ok(())
    }

    /// Stop consuming topics and tear down all device workers.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let mut subscriptions = self
            .inner
            .subscriptions
            .lock()
            .expect("gateway subscription lock poisoned");
        subscriptions.clear();
        info!(server_id = %self.inner.server_id, "message gateway stopped");
    }
}

impl GatewayInner {
    async fn dispatch(&self, payload: Value) {
        let envelope = match MessageEnvelope::from_value(payload) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(%error, server_id = %self.server_id, "dropping undecodable message");
                return;
            }
        };
        let Some(queue) = self
            .queues
            .get(&envelope.device_id)
            .map(|q| q.value().clone())
        else {
            debug!(device_id = %envelope.device_id, "no consumer registered on this gateway");
            return;
        };
        if let Err(error) = queue.try_send(envelope) {
            warn!(%error, server_id = %self.server_id, "device queue saturated, dropping message");
        }
    }

    async fn answer_probe(&self, payload: Value) {
        let Ok(envelope) = MessageEnvelope::from_value(payload) else {
            return;
        };
        let Some(probe_id) = envelope.body.get(PROBE_ID_FIELD).and_then(Value::as_str)
        else {
            warn!(server_id = %self.server_id, "liveness probe without probe id");
            return;
        };
        if let Err(error) = self
            .client
            .semaphore(&alive_reply_key(probe_id))
            .release(1)
            .await
        {
            warn!(%error, probe_id, "failed to answer liveness probe");
        }
    }

    fn ensure_worker(self: &Arc<Self>, device_id: String) {
        if let Entry::Vacant(vacant) = self.queues.entry(device_id.clone()) {
            let (tx, mut rx) = mpsc::channel(self.settings.handler.queue_capacity);
            vacant.insert(tx);
            let gateway = Arc::downgrade(self);
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        received = rx.recv() => {
                            let Some(envelope) = received else { break };
                            let Some(inner) = gateway.upgrade() else { break };
                            let handler = inner
                                .handlers
                                .get(&device_id)
                                .map(|h| Arc::clone(h.value()));
                            drop(inner);
                            if let Some(handler) = handler {
                                handler(envelope).await;
                            }
                        }
                    }
                }
                debug!(device_id = %device_id, "device worker stopped");
            });
        }
    }
}
