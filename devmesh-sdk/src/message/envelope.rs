use crate::constants::ASYNC_HEADER;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub type Headers = Map<String, Value>;

/// Generate a fresh globally-unique message id.
#[inline]
pub fn new_message_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Wire type tag of a [`MessageEnvelope`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageType {
    Function,
    ReadProperty,
    WriteProperty,
    FunctionReply,
    ReadPropertyReply,
    WritePropertyReply,
    /// Generic reply produced by gateways that do not type their replies.
    Common,
    /// Liveness probe on a gateway's alive-check topic.
    Ping,
    /// Session event (`device:online` / `device:offline`).
    Event,
}

/// The one JSON shape every message travels as:
/// `{messageId, deviceId, timestamp, type, headers{}, body{}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub message_id: String,
    pub device_id: String,
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Headers::is_empty")]
    pub headers: Headers,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub body: Value,
}

impl MessageEnvelope {
    pub fn new(message_type: MessageType, device_id: impl Into<String>) -> Self {
        MessageEnvelope {
            message_id: new_message_id(),
            device_id: device_id.into(),
            timestamp: Utc::now().timestamp_millis(),
            message_type,
            headers: Headers::new(),
            body: Value::Null,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn insert_header(&mut self, key: impl Into<String>, value: Value) {
        self.headers.insert(key.into(), value);
    }

    #[inline]
    pub fn header(&self, key: &str) -> Option<&Value> {
        self.headers.get(key)
    }

    /// Whether the sender marked this message fire-and-forget.
    #[inline]
    pub fn is_async(&self) -> bool {
        matches!(self.header(ASYNC_HEADER), Some(Value::Bool(true)))
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_wire_shape() {
        let mut env = MessageEnvelope::new(MessageType::Function, "dev-1")
            .with_body(json!({"functionId": "reboot"}));
        env.insert_header("traceId", json!("t-1"));
        let v = env.to_value().unwrap();
        assert_eq!(v["type"], "function");
        assert_eq!(v["deviceId"], "dev-1");
        assert_eq!(v["headers"]["traceId"], "t-1");
        assert_eq!(v["body"]["functionId"], "reboot");
        assert!(v["messageId"].as_str().is_some_and(|s| !s.is_empty()));
    }

    #[test]
    fn reply_type_tags_are_camel_case() {
        for (ty, tag) in [
            (MessageType::ReadProperty, "readProperty"),
            (MessageType::FunctionReply, "functionReply"),
            (MessageType::WritePropertyReply, "writePropertyReply"),
        ] {
            assert_eq!(serde_json::to_value(ty).unwrap(), tag);
        }
    }

    #[test]
    fn async_header_detection() {
        let mut env = MessageEnvelope::new(MessageType::Function, "dev-1");
        assert!(!env.is_async());
        env.insert_header(ASYNC_HEADER, json!(true));
        assert!(env.is_async());
    }

    #[test]
    fn message_ids_are_unique() {
        assert_ne!(new_message_id(), new_message_id());
    }
}
