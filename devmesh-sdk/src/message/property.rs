use super::envelope::{new_message_id, Headers, MessageEnvelope, MessageType};
use chrono::Utc;
use serde_json::{json, Map, Value};

/// Request to read one or more device properties.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadPropertyMessage {
    pub message_id: String,
    pub device_id: String,
    pub timestamp: i64,
    pub headers: Headers,
    pub properties: Vec<String>,
}

impl ReadPropertyMessage {
    pub fn new(device_id: impl Into<String>) -> Self {
        ReadPropertyMessage {
            message_id: new_message_id(),
            device_id: device_id.into(),
            timestamp: Utc::now().timestamp_millis(),
            headers: Headers::new(),
            properties: Vec::new(),
        }
    }

    pub fn add_properties<I, S>(&mut self, properties: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.properties.extend(properties.into_iter().map(Into::into));
    }

    pub fn add_header(&mut self, key: impl Into<String>, value: Value) {
        self.headers.insert(key.into(), value);
    }

    pub fn to_envelope(&self) -> MessageEnvelope {
        MessageEnvelope {
            message_id: self.message_id.clone(),
            device_id: self.device_id.clone(),
            timestamp: self.timestamp,
            message_type: MessageType::ReadProperty,
            headers: self.headers.clone(),
            body: json!({ "properties": self.properties }),
        }
    }
}

/// Request to write device properties.
#[derive(Debug, Clone, PartialEq)]
pub struct WritePropertyMessage {
    pub message_id: String,
    pub device_id: String,
    pub timestamp: i64,
    pub headers: Headers,
    pub properties: Map<String, Value>,
}

impl WritePropertyMessage {
    pub fn new(device_id: impl Into<String>) -> Self {
        WritePropertyMessage {
            message_id: new_message_id(),
            device_id: device_id.into(),
            timestamp: Utc::now().timestamp_millis(),
            headers: Headers::new(),
            properties: Map::new(),
        }
    }

    pub fn add_property(&mut self, property: impl Into<String>, value: Value) {
        self.properties.insert(property.into(), value);
    }

    pub fn add_header(&mut self, key: impl Into<String>, value: Value) {
        self.headers.insert(key.into(), value);
    }

    pub fn to_envelope(&self) -> MessageEnvelope {
        MessageEnvelope {
            message_id: self.message_id.clone(),
            device_id: self.device_id.clone(),
            timestamp: self.timestamp,
            message_type: MessageType::WriteProperty,
            headers: self.headers.clone(),
            body: json!({ "properties": self.properties }),
        }
    }
}
