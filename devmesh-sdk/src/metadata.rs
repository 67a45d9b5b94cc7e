//! Protocol metadata seams.
//!
//! The registry never interprets device payloads itself; it resolves a
//! protocol through [`ProtocolSupports`] and asks its [`DeviceMetadata`]
//! about functions and properties. Concrete protocol stacks live outside
//! this workspace and plug in through these traits.

use async_trait::async_trait;
use devmesh_error::MeshResult;
use serde_json::Value;
use std::sync::Arc;

/// Resolves protocol ids to protocol implementations.
#[async_trait]
pub trait ProtocolSupports: Send + Sync {
    /// Look up a protocol by id; `Ok(None)` when unknown.
    async fn protocol(&self, protocol_id: &str) -> MeshResult<Option<Arc<dyn ProtocolSupport>>>;
}

/// One protocol implementation.
pub trait ProtocolSupport: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    /// Device model description for devices speaking this protocol.
    fn metadata(&self) -> Arc<dyn DeviceMetadata>;
}

/// Describes the functions and properties a device model exposes.
pub trait DeviceMetadata: Send + Sync {
    fn function(&self, function_id: &str) -> Option<Arc<FunctionMetadata>>;
    fn functions(&self) -> Vec<Arc<FunctionMetadata>>;
    fn property(&self, property_id: &str) -> Option<Arc<PropertyMetadata>>;
    fn properties(&self) -> Vec<Arc<PropertyMetadata>>;
}

impl std::fmt::Debug for dyn DeviceMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceMetadata")
            .field("functions", &self.functions())
            .field("properties", &self.properties())
            .finish()
    }
}

impl std::fmt::Debug for dyn ProtocolSupport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolSupport")
            .field("id", &self.id())
            .field("name", &self.name())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct FunctionMetadata {
    pub id: String,
    pub name: String,
    pub inputs: Vec<PropertyMetadata>,
    pub output: Option<ValueType>,
}

#[derive(Debug, Clone)]
pub struct PropertyMetadata {
    pub id: String,
    pub name: String,
    pub value_type: ValueType,
}

/// Value types understood by the validation path.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ValueType {
    Boolean,
    Int,
    Float,
    String,
    Object,
    Array,
    /// Accepts anything; validation always succeeds.
    Any,
}

impl ValueType {
    /// Strict shape check of `value` against this type.
    pub fn validate(&self, value: &Value) -> ValidateResult {
        let ok = match self {
            ValueType::Boolean => value.is_boolean(),
            ValueType::Int => value.is_i64() || value.is_u64(),
            ValueType::Float => value.is_number(),
            ValueType::String => value.is_string(),
            ValueType::Object => value.is_object(),
            ValueType::Array => value.is_array(),
            ValueType::Any => true,
        };
        if ok {
            ValidateResult::success()
        } else {
            ValidateResult::fail(format!("expected {self:?}, got {value}"))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidateResult {
    pub success: bool,
    pub reason: Option<String>,
}

impl ValidateResult {
    pub fn success() -> Self {
        ValidateResult {
            success: true,
            reason: None,
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        ValidateResult {
            success: false,
            reason: Some(reason.into()),
        }
    }
}
