pub mod coordination;

use anyhow::Error as AnyhowError;
use config::ConfigError;
use coordination::CoordinationError;
use serde_json::Error as SerdeJsonError;
use std::{error::Error as StdError, io::Error as IoError};
use thiserror::Error;
use tokio::task::JoinError;

pub type MeshResult<T, E = MeshError> = anyhow::Result<T, E>;
pub type CoordinationResult<T, E = CoordinationError> = Result<T, E>;

#[derive(Error, Debug, Default)]
pub enum MeshError {
    #[error("service unavailable")]
    #[default]
    ServiceUnavailable,
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("product not found: {0}")]
    ProductNotFound(String),
    #[error("protocol not found: {0}")]
    ProtocolNotFound(String),
    #[error("function undefined: {0}")]
    FunctionUndefined(String),
    #[error("parameter undefined: {0}")]
    ParameterUndefined(String),
    #[error("illegal argument: {0}")]
    IllegalArgument(String),
    #[error("interceptor error: {0}")]
    Interceptor(String),
    #[error("{0}")]
    Coordination(#[from] CoordinationError),
    #[error("{0}")]
    Json(#[from] SerdeJsonError),
    #[error("{0}")]
    ConfigError(#[from] ConfigError),
    #[error("{0}")]
    IoError(#[from] IoError),
    #[error("{0}")]
    JoinError(#[from] JoinError),
    #[error("{0}")]
    StdError(#[from] Box<dyn StdError + Send + Sync>),
    #[error("{0}")]
    Anyhow(#[from] AnyhowError),
    #[error("{0}")]
    Msg(String),
}

impl From<String> for MeshError {
    #[inline]
    fn from(e: String) -> Self {
        MeshError::Msg(e)
    }
}

impl From<&str> for MeshError {
    #[inline]
    fn from(e: &str) -> Self {
        MeshError::Msg(e.to_string())
    }
}

impl MeshError {
    /// Whether this error came from the coordination service itself.
    #[inline]
    pub fn is_coordination(&self) -> bool {
        matches!(self, MeshError::Coordination(_))
    }
}
