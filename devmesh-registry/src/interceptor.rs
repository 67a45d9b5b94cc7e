use crate::device::DeviceOperation;
use async_trait::async_trait;
use devmesh_error::MeshResult;
use devmesh_sdk::MessageEnvelope;

/// Hooks wrapped around every message produced by a registry's senders.
///
/// The chain is append-only after registry construction; each sender
/// snapshots it when built. `retrieve_reply` deliberately bypasses the
/// chain: interceptors wrap `send()` only.
#[async_trait]
pub trait SenderInterceptor: Send + Sync {
    /// Rewrite the outgoing message before it is published.
    ///
    /// `operation` is absent when the device handle has been dropped.
    async fn pre_send(
        &self,
        operation: Option<DeviceOperation>,
        message: MessageEnvelope,
    ) -> MeshResult<MessageEnvelope> {
        let _ = operation;
        Ok(message)
    }

    /// Observe or transform the reply after the rendezvous completes.
    async fn after_reply(
        &self,
        operation: Option<DeviceOperation>,
        request: &MessageEnvelope,
        reply: MessageEnvelope,
    ) -> MeshResult<MessageEnvelope> {
        let _ = (operation, request);
        Ok(reply)
    }
}
