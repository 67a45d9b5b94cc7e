use crate::{
    config::{shadow_merge, ConfigScope},
    interceptor::SenderInterceptor,
    product::ProductOperation,
    sender::MessageSender,
    session::SessionStore,
};
use arc_swap::ArcSwap;
use dashmap::DashMap;
use devmesh_error::{MeshError, MeshResult};
use devmesh_sdk::{
    constants::{device_config_key, device_info_key},
    CoordinationClient, DeviceInfo, DeviceMetadata, DeviceState, ProtocolSupport,
    ProtocolSupports, SessionState, Settings,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// State shared by every handle a registry produces.
pub(crate) struct RegistryShared {
    pub(crate) client: Arc<dyn CoordinationClient>,
    pub(crate) protocol_supports: Arc<dyn ProtocolSupports>,
    pub(crate) settings: Settings,
    /// Append-only after construction; senders snapshot on build.
    pub(crate) interceptors: ArcSwap<Vec<Arc<dyn SenderInterceptor>>>,
}

/// Device and product registry over the shared coordination service.
///
/// All record, session and config state lives in the store, so every node
/// holding a registry sees the same cluster view. The in-process maps are
/// only handle caches.
pub struct DeviceRegistry {
    shared: Arc<RegistryShared>,
    operations: DashMap<String, DeviceOperation>,
    products: DashMap<String, ProductOperation>,
}

impl DeviceRegistry {
    pub fn new(
        client: Arc<dyn CoordinationClient>,
        protocol_supports: Arc<dyn ProtocolSupports>,
        settings: Settings,
    ) -> Self {
        DeviceRegistry {
            shared: Arc::new(RegistryShared {
                client,
                protocol_supports,
                settings,
                interceptors: ArcSwap::from_pointee(Vec::new()),
            }),
            operations: DashMap::new(),
            products: DashMap::new(),
        }
    }

    /// Append an interceptor applied to every sender built from here on.
    pub fn add_interceptor(&self, interceptor: Arc<dyn SenderInterceptor>) {
        self.shared.interceptors.rcu(|chain| {
            let mut next = (**chain).clone();
            next.push(Arc::clone(&interceptor));
            next
        });
    }

    /// Handle over a device id; never fails, unknown devices read `Unknown`.
    pub fn get_device(&self, device_id: &str) -> DeviceOperation {
        self.operations
            .entry(device_id.to_string())
            .or_insert_with(|| DeviceOperation::new(device_id, Arc::clone(&self.shared)))
            .value()
            .clone()
    }

    /// Handle over a product id; never fails.
    pub fn get_product(&self, product_id: &str) -> ProductOperation {
        self.products
            .entry(product_id.to_string())
            .or_insert_with(|| ProductOperation::new(product_id, Arc::clone(&self.shared)))
            .value()
            .clone()
    }

    /// Persist a device record and hand back its operation handle.
    ///
    /// Re-registering overwrites the record but preserves any live
    /// session; a fresh device starts `Offline`.
    pub async fn register(&self, device: DeviceInfo) -> MeshResult<DeviceOperation> {
        if device.id.is_empty() {
            return Err(MeshError::IllegalArgument("device id must not be empty".into()));
        }
        if device.product_id.is_empty() {
            return Err(MeshError::IllegalArgument(
                "device product id must not be empty".into(),
            ));
        }
        self.shared
            .client
            .bucket(&device_info_key(&device.id))
            .set(serde_json::to_value(&device)?, None)
            .await?;
        let operation = self.get_device(&device.id);
        if operation.inner.session.load().await?.is_none() {
            operation.inner.session.store(&SessionState::offline()).await?;
        }
        info!(device_id = %device.id, product_id = %device.product_id, "device registered");
        Ok(operation)
    }

    /// Delete the record, session state and device-scoped configuration.
    pub async fn unregister(&self, device_id: &str) -> MeshResult<()> {
        let operation = self.get_device(device_id);
        self.shared
            .client
            .bucket(&device_info_key(device_id))
            .delete()
            .await?;
        operation.inner.session.clear().await?;
        operation.inner.config.clear().await?;
        self.operations.remove(device_id);
        info!(device_id, "device unregistered");
        Ok(())
    }
}

/// Shareable handle over one device.
#[derive(Clone)]
pub struct DeviceOperation {
    pub(crate) inner: Arc<DeviceOperationInner>,
}

pub(crate) struct DeviceOperationInner {
    pub(crate) device_id: String,
    pub(crate) shared: Arc<RegistryShared>,
    pub(crate) session: SessionStore,
    pub(crate) config: ConfigScope,
}

impl DeviceOperation {
    fn new(device_id: &str, shared: Arc<RegistryShared>) -> Self {
        let session = SessionStore::new(
            device_id,
            Arc::clone(&shared.client),
            shared.settings.clone(),
        );
        let config = ConfigScope::new(shared.client.as_ref(), &device_config_key(device_id));
        DeviceOperation {
            inner: Arc::new(DeviceOperationInner {
                device_id: device_id.to_string(),
                shared,
                session,
                config,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<DeviceOperationInner>) -> Self {
        DeviceOperation { inner }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.inner.device_id
    }

    /// Read the device record, if any.
    pub async fn try_info(&self) -> MeshResult<Option<DeviceInfo>> {
        let stored = self
            .inner
            .shared
            .client
            .bucket(&device_info_key(&self.inner.device_id))
            .get()
            .await?;
        match stored {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Read the device record, failing for unknown devices.
    pub async fn info(&self) -> MeshResult<DeviceInfo> {
        self.try_info()
            .await?
            .ok_or_else(|| MeshError::DeviceNotFound(self.inner.device_id.clone()))
    }

    /// Product handle this device is bound to.
    pub async fn product(&self) -> MeshResult<ProductOperation> {
        let info = self.info().await?;
        Ok(ProductOperation::new(
            &info.product_id,
            Arc::clone(&self.inner.shared),
        ))
    }

    /// Resolve the protocol, honoring a per-device override.
    pub async fn protocol(&self) -> MeshResult<Arc<dyn ProtocolSupport>> {
        let info = self.info().await?;
        if let Some(protocol_id) = info.protocol.as_deref() {
            return self
                .inner
                .shared
                .protocol_supports
                .protocol(protocol_id)
                .await?
                .ok_or_else(|| MeshError::ProtocolNotFound(protocol_id.to_string()));
        }
        ProductOperation::new(&info.product_id, Arc::clone(&self.inner.shared))
            .protocol()
            .await
    }

    /// Device model metadata resolved through the protocol.
    pub async fn metadata(&self) -> MeshResult<Arc<dyn DeviceMetadata>> {
        Ok(self.protocol().await?.metadata())
    }

    // Session state.

    pub async fn state(&self) -> MeshResult<DeviceState> {
        self.inner.session.state().await
    }

    pub async fn is_online(&self) -> MeshResult<bool> {
        Ok(self.state().await?.is_online())
    }

    pub async fn server_id(&self) -> MeshResult<Option<String>> {
        self.inner.session.server_id().await
    }

    pub async fn session_id(&self) -> MeshResult<Option<String>> {
        self.inner.session.session_id().await
    }

    pub async fn online(&self, server_id: &str, session_id: &str) -> MeshResult<()> {
        self.inner.session.online(server_id, session_id).await
    }

    pub async fn offline(&self) -> MeshResult<()> {
        self.inner.session.offline().await
    }

    /// Reconcile a possibly stale online state against the real gateway.
    pub async fn check_state(&self) -> MeshResult<DeviceState> {
        self.inner.session.check_state().await
    }

    // Configuration with product inheritance.

    /// Device value when present, otherwise the product value.
    pub async fn get(&self, key: &str) -> MeshResult<Option<Value>> {
        if let Some(value) = self.inner.config.get(key).await? {
            return Ok(Some(value));
        }
        match self.try_product_scope().await? {
            Some(product) => product.get(key).await,
            None => Ok(None),
        }
    }

    /// Compose a subset of keys from both scopes, device shadowing product.
    pub async fn get_many(&self, keys: &[&str]) -> MeshResult<Map<String, Value>> {
        let own = self.inner.config.get_many(keys).await?;
        let base = match self.try_product_scope().await? {
            Some(product) => product.get_many(keys).await?,
            None => Map::new(),
        };
        Ok(shadow_merge(base, own))
    }

    /// Merged snapshot of both scopes, device shadowing product.
    pub async fn get_all(&self) -> MeshResult<Map<String, Value>> {
        let own = self.inner.config.get_all().await?;
        let base = match self.try_product_scope().await? {
            Some(product) => product.get_all().await?,
            None => Map::new(),
        };
        Ok(shadow_merge(base, own))
    }

    /// Write into the device scope. Null values are rejected.
    pub async fn put(&self, key: &str, value: Value) -> MeshResult<()> {
        self.inner.config.put(key, value).await
    }

    pub async fn put_all(&self, values: Option<&Map<String, Value>>) -> MeshResult<()> {
        self.inner.config.put_all(values).await
    }

    /// Remove from the device scope, returning the prior value.
    pub async fn remove(&self, key: &str) -> MeshResult<Option<Value>> {
        self.inner.config.remove(key).await
    }

    async fn try_product_scope(&self) -> MeshResult<Option<ProductOperation>> {
        match self.try_info().await? {
            Some(info) => Ok(Some(ProductOperation::new(
                &info.product_id,
                Arc::clone(&self.inner.shared),
            ))),
            None => {
                debug!(device_id = %self.inner.device_id, "no device record, skipping product config fallback");
                Ok(None)
            }
        }
    }

    /// Build a message sender for this device.
    ///
    /// The sender snapshots the interceptor chain and keeps only a weak
    /// reference back to this handle.
    pub fn message_sender(&self) -> MessageSender {
        MessageSender::new(self)
    }
}
