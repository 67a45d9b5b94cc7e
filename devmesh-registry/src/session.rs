use devmesh_error::MeshResult;
use devmesh_sdk::{
    constants::{
        alive_check_topic, alive_reply_key, device_state_key, DEVICE_OFFLINE_TOPIC,
        DEVICE_ONLINE_TOPIC, PROBE_ID_FIELD, SESSION_FIELD,
    },
    new_message_id, CoordinationClient, DeviceState, EntityMap, MessageEnvelope, MessageType,
    SessionState, Settings,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Session tuple storage and liveness reconciliation for one device.
///
/// The whole tuple is serialized as one value so a reader never observes
/// the new state next to the old server-id.
#[derive(Clone)]
pub(crate) struct SessionStore {
    device_id: String,
    client: Arc<dyn CoordinationClient>,
    settings: Settings,
}

impl SessionStore {
    pub(crate) fn new(
        device_id: &str,
        client: Arc<dyn CoordinationClient>,
        settings: Settings,
    ) -> Self {
        SessionStore {
            device_id: device_id.to_string(),
            client,
            settings,
        }
    }

    fn map(&self) -> Arc<dyn EntityMap> {
        self.client.map(&device_state_key(&self.device_id))
    }

    pub(crate) async fn load(&self) -> MeshResult<Option<SessionState>> {
        match self.map().get(SESSION_FIELD).await? {
            Some(blob) => Ok(Some(serde_json::from_value(blob)?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn store(&self, session: &SessionState) -> MeshResult<()> {
        self.map()
            .put(SESSION_FIELD, serde_json::to_value(session)?)
            .await?;
        Ok(())
    }

    pub(crate) async fn clear(&self) -> MeshResult<()> {
        Ok(self.map().clear().await?)
    }

    pub(crate) async fn state(&self) -> MeshResult<DeviceState> {
        Ok(self
            .load()
            .await?
            .map(|s| s.state)
            .unwrap_or(DeviceState::Unknown))
    }

    pub(crate) async fn server_id(&self) -> MeshResult<Option<String>> {
        Ok(self.load().await?.and_then(|s| s.server_id))
    }

    pub(crate) async fn session_id(&self) -> MeshResult<Option<String>> {
        Ok(self.load().await?.and_then(|s| s.session_id))
    }

    /// Bind the device to its gateway connection and announce it.
    pub(crate) async fn online(&self, server_id: &str, session_id: &str) -> MeshResult<()> {
        let session = SessionState::online(server_id, session_id);
        self.store(&session).await?;
        info!(device_id = %self.device_id, server_id, "device online");
        self.publish_event(DEVICE_ONLINE_TOPIC, &session).await;
        Ok(())
    }

    /// Clear the owner tuple and announce the drop.
    pub(crate) async fn offline(&self) -> MeshResult<()> {
        let session = SessionState::offline();
        self.store(&session).await?;
        info!(device_id = %self.device_id, "device offline");
        self.publish_event(DEVICE_OFFLINE_TOPIC, &session).await;
        Ok(())
    }

    async fn publish_event(&self, topic: &str, session: &SessionState) {
        let event = MessageEnvelope::new(MessageType::Event, self.device_id.clone()).with_body(
            json!({
                "deviceId": self.device_id,
                "state": session.state,
                "serverId": session.server_id,
                "sessionId": session.session_id,
            }),
        );
        match event.to_value() {
            Ok(payload) => {
                if let Err(error) = self.client.topic(topic).publish(payload).await {
                    warn!(%error, topic, "failed to publish session event");
                }
            }
            Err(error) => warn!(%error, topic, "failed to encode session event"),
        }
    }

    /// Reconcile a possibly stale online state against the real gateway.
    ///
    /// Publishes a probe on the owner's alive-check topic. No subscriber,
    /// or no answer within the configured window, means the owner is gone
    /// and the device is marked offline.
    pub(crate) async fn check_state(&self) -> MeshResult<DeviceState> {
        let Some(session) = self.load().await? else {
            return Ok(DeviceState::Unknown);
        };
        if session.state != DeviceState::Online {
            return Ok(session.state);
        }
        let Some(server_id) = session.server_id.as_deref() else {
            // Online without an owner should not happen; repair it.
            warn!(device_id = %self.device_id, "online session without server id, resetting");
            self.offline().await?;
            return Ok(DeviceState::Offline);
        };

        let probe_id = new_message_id();
        let probe = MessageEnvelope::new(MessageType::Ping, self.device_id.clone())
            .with_body(json!({ PROBE_ID_FIELD: probe_id, "serverId": server_id }));
        let ack = self
            .client
            .topic(&alive_check_topic(server_id))
            .publish(probe.to_value()?)
            .await?;
        if ack == 0 {
            info!(device_id = %self.device_id, server_id, "owning gateway vanished, marking offline");
            self.offline().await?;
            return Ok(DeviceState::Offline);
        }

        let semaphore = self.client.semaphore(&alive_reply_key(&probe_id));
        let window = self.settings.state.check_timeout();
        semaphore.expire(window * 2).await?;
        let answered = semaphore.acquire(1, window).await?;
        semaphore.delete().await?;
        if answered {
            debug!(device_id = %self.device_id, server_id, "gateway answered liveness probe");
            Ok(DeviceState::Online)
        } else {
            info!(device_id = %self.device_id, server_id, "liveness probe timed out, marking offline");
            self.offline().await?;
            Ok(DeviceState::Offline)
        }
    }
}
