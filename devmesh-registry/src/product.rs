use crate::{config::ConfigScope, device::RegistryShared};
use devmesh_error::{MeshError, MeshResult};
use devmesh_sdk::{
    constants::{product_config_key, product_info_key},
    Bucket, DeviceMetadata, ProductInfo, ProtocolSupport,
};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Handle over one product record and its configuration scope.
///
/// Always constructible, even for an unknown product id; operations that
/// need the record fail with `ProductNotFound` instead.
#[derive(Clone)]
pub struct ProductOperation {
    inner: Arc<ProductOperationInner>,
}

struct ProductOperationInner {
    product_id: String,
    shared: Arc<RegistryShared>,
    config: ConfigScope,
}

impl ProductOperation {
    pub(crate) fn new(product_id: &str, shared: Arc<RegistryShared>) -> Self {
        let config = ConfigScope::new(shared.client.as_ref(), &product_config_key(product_id));
        ProductOperation {
            inner: Arc::new(ProductOperationInner {
                product_id: product_id.to_string(),
                shared,
                config,
            }),
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.inner.product_id
    }

    fn record(&self) -> Arc<dyn Bucket> {
        self.inner
            .shared
            .client
            .bucket(&product_info_key(&self.inner.product_id))
    }

    /// Read the product record, if any.
    pub async fn try_info(&self) -> MeshResult<Option<ProductInfo>> {
        match self.record().get().await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Read the product record, failing when it does not exist.
    pub async fn info(&self) -> MeshResult<ProductInfo> {
        self.try_info()
            .await?
            .ok_or_else(|| MeshError::ProductNotFound(self.inner.product_id.clone()))
    }

    /// Overwrite the product record wholesale.
    pub async fn update(&self, info: &ProductInfo) -> MeshResult<()> {
        self.record()
            .set(serde_json::to_value(info)?, None)
            .await?;
        Ok(())
    }

    /// Resolve this product's protocol through the protocol registry.
    pub async fn protocol(&self) -> MeshResult<Arc<dyn ProtocolSupport>> {
        let info = self.info().await?;
        self.inner
            .shared
            .protocol_supports
            .protocol(&info.protocol)
            .await?
            .ok_or(MeshError::ProtocolNotFound(info.protocol))
    }

    pub async fn metadata(&self) -> MeshResult<Arc<dyn DeviceMetadata>> {
        Ok(self.protocol().await?.metadata())
    }

    // Product-scoped configuration.

    pub async fn get(&self, key: &str) -> MeshResult<Option<Value>> {
        self.inner.config.get(key).await
    }

    pub async fn get_many(&self, keys: &[&str]) -> MeshResult<Map<String, Value>> {
        self.inner.config.get_many(keys).await
    }

    pub async fn get_all(&self) -> MeshResult<Map<String, Value>> {
        self.inner.config.get_all().await
    }

    pub async fn put(&self, key: &str, value: Value) -> MeshResult<()> {
        self.inner.config.put(key, value).await
    }

    pub async fn put_all(&self, values: Option<&Map<String, Value>>) -> MeshResult<()> {
        self.inner.config.put_all(values).await
    }

    pub async fn remove(&self, key: &str) -> MeshResult<Option<Value>> {
        self.inner.config.remove(key).await
    }
}
