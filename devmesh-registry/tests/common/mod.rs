#![allow(dead_code)]

use async_trait::async_trait;
use devmesh_error::MeshResult;
use devmesh_registry::{DeviceRegistry, MemoryCoordination};
use devmesh_sdk::{
    settings::{Inner, MessageSettings},
    DeviceInfo, DeviceMetadata, DeviceType, FunctionMetadata, ProductInfo, PropertyMetadata,
    ProtocolSupport, ProtocolSupports, Settings, ValueType,
};
use std::{collections::HashMap, sync::Arc, sync::Once};

pub const TEST_PROTOCOL: &str = "mesh-test";

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Fixed device model: a zero-argument `test` function and a one-argument
/// `setSpeed` function for the validation paths.
pub struct StaticMetadata {
    functions: HashMap<String, Arc<FunctionMetadata>>,
    properties: HashMap<String, Arc<PropertyMetadata>>,
}

impl Default for StaticMetadata {
    fn default() -> Self {
        let mut functions = HashMap::new();
        functions.insert(
            "test".to_string(),
            Arc::new(FunctionMetadata {
                id: "test".into(),
                name: "Connectivity test".into(),
                inputs: Vec::new(),
                output: Some(ValueType::String),
            }),
        );
        functions.insert(
            "setSpeed".to_string(),
            Arc::new(FunctionMetadata {
                id: "setSpeed".into(),
                name: "Set rotation speed".into(),
                inputs: vec![PropertyMetadata {
                    id: "rpm".into(),
                    name: "Revolutions per minute".into(),
                    value_type: ValueType::Int,
                }],
                output: None,
            }),
        );
        StaticMetadata {
            functions,
            properties: HashMap::new(),
        }
    }
}

impl DeviceMetadata for StaticMetadata {
    fn function(&self, function_id: &str) -> Option<Arc<FunctionMetadata>> {
        self.functions.get(function_id).cloned()
    }

    fn functions(&self) -> Vec<Arc<FunctionMetadata>> {
        self.functions.values().cloned().collect()
    }

    fn property(&self, property_id: &str) -> Option<Arc<PropertyMetadata>> {
        self.properties.get(property_id).cloned()
    }

    fn properties(&self) -> Vec<Arc<PropertyMetadata>> {
        self.properties.values().cloned().collect()
    }
}

pub struct TestProtocol {
    metadata: Arc<StaticMetadata>,
}

impl ProtocolSupport for TestProtocol {
    fn id(&self) -> &str {
        TEST_PROTOCOL
    }

    fn name(&self) -> &str {
        "Test protocol"
    }

    fn metadata(&self) -> Arc<dyn DeviceMetadata> {
        Arc::clone(&self.metadata) as Arc<dyn DeviceMetadata>
    }
}

pub struct TestProtocolSupports {
    protocols: HashMap<String, Arc<dyn ProtocolSupport>>,
}

impl Default for TestProtocolSupports {
    fn default() -> Self {
        let mut protocols: HashMap<String, Arc<dyn ProtocolSupport>> = HashMap::new();
        protocols.insert(
            TEST_PROTOCOL.to_string(),
            Arc::new(TestProtocol {
                metadata: Arc::new(StaticMetadata::default()),
            }),
        );
        TestProtocolSupports { protocols }
    }
}

#[async_trait]
impl ProtocolSupports for TestProtocolSupports {
    async fn protocol(&self, protocol_id: &str) -> MeshResult<Option<Arc<dyn ProtocolSupport>>> {
        Ok(self.protocols.get(protocol_id).cloned())
    }
}

pub fn new_registry(client: &MemoryCoordination, settings: Settings) -> DeviceRegistry {
    DeviceRegistry::new(
        Arc::new(client.clone()),
        Arc::new(TestProtocolSupports::default()),
        settings,
    )
}

pub fn settings_with_await(seconds: u64) -> Settings {
    Settings::from_inner(Inner {
        message: MessageSettings {
            await_max_seconds: seconds,
            ..Default::default()
        },
        ..Default::default()
    })
}

pub fn new_device_info(id: &str, product_id: &str) -> DeviceInfo {
    DeviceInfo {
        id: id.to_string(),
        product_id: product_id.to_string(),
        product_name: Some("test product".into()),
        protocol: None,
        creator_id: Some("admin".into()),
        creator_name: Some("admin".into()),
        project_id: Some("p001".into()),
        project_name: Some("project one".into()),
        device_type: DeviceType::Device,
    }
}

pub fn new_product_info(id: &str) -> ProductInfo {
    ProductInfo {
        id: id.to_string(),
        name: "test product".into(),
        protocol: TEST_PROTOCOL.to_string(),
        project_id: Some("p001".into()),
        project_name: None,
    }
}
