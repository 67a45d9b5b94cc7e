//! Shared-store key schema.
//!
//! These key shapes are wire-compatible with peer nodes; do not change
//! them without a cluster-wide rollout.

/// Topic carrying `device:online` session events.
pub const DEVICE_ONLINE_TOPIC: &str = "device:online";
/// Topic carrying `device:offline` session events.
pub const DEVICE_OFFLINE_TOPIC: &str = "device:offline";

/// Bucket holding the device record.
#[inline]
pub fn device_info_key(device_id: &str) -> String {
    format!("device:info:{device_id}")
}

/// Entity map holding device-scoped configuration.
#[inline]
pub fn device_config_key(device_id: &str) -> String {
    format!("device:cfg:{device_id}")
}

/// Entity map holding the device session tuple.
#[inline]
pub fn device_state_key(device_id: &str) -> String {
    format!("device:state:{device_id}")
}

/// Bucket holding the product record.
#[inline]
pub fn product_info_key(product_id: &str) -> String {
    format!("product:info:{product_id}")
}

/// Entity map holding product-scoped configuration.
#[inline]
pub fn product_config_key(product_id: &str) -> String {
    format!("product:cfg:{product_id}")
}

/// Inbound command topic for one gateway node.
#[inline]
pub fn message_accept_topic(server_id: &str) -> String {
    format!("device:message:accept:{server_id}")
}

/// Reply bucket for one message id.
#[inline]
pub fn message_reply_key(message_id: &str) -> String {
    format!("device:message:reply:{message_id}")
}

/// Reply semaphore for one message id. TTL matches the reply bucket.
#[inline]
pub fn reply_semaphore_key(message_id: &str) -> String {
    format!("device:reply:{message_id}")
}

/// Liveness probe topic for one gateway node.
#[inline]
pub fn alive_check_topic(server_id: &str) -> String {
    format!("device:alive:check:{server_id}")
}

/// Semaphore released by a live gateway answering one probe.
#[inline]
pub fn alive_reply_key(probe_id: &str) -> String {
    format!("device:alive:reply:{probe_id}")
}

/// Field inside the session entity map holding the serialized tuple.
pub const SESSION_FIELD: &str = "session";
/// Header marking a message as fire-and-forget.
pub const ASYNC_HEADER: &str = "async";
/// Body field carrying the probe id of a liveness check.
pub const PROBE_ID_FIELD: &str = "probeId";
