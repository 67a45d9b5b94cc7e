use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Product definition shared across nodes.
///
/// Identity is `id`; updates replace the record wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInfo {
    pub id: String,
    pub name: String,
    /// Protocol id resolved through `ProtocolSupports`.
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
}

/// Device record shared across nodes.
///
/// `product_id` is a required foreign key; `protocol` overrides the
/// product protocol when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub id: String,
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(default)]
    pub device_type: DeviceType,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize_repr, Deserialize_repr)]
#[repr(i16)]
pub enum DeviceType {
    #[default]
    Device = 0,
    Gateway = 1,
    ChildDevice = 2,
}

/// Connection state of a device session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize_repr, Deserialize_repr)]
#[repr(i8)]
pub enum DeviceState {
    /// No record exists for this device (only after unregister, or never registered).
    Unknown = -1,
    /// Registered but administratively disabled.
    NoActive = 0,
    #[default]
    Offline = 1,
    Online = 2,
}

impl DeviceState {
    #[inline]
    pub fn is_online(&self) -> bool {
        matches!(self, DeviceState::Online)
    }
}

/// Session tuple for one device.
///
/// Serialized and swapped as a single blob so readers never observe a mix
/// of old server-id and new state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    #[serde(default)]
    pub state: DeviceState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub last_ping_ts: i64,
}

impl SessionState {
    /// Fresh offline tuple, as written at registration time.
    pub fn offline() -> Self {
        SessionState {
            state: DeviceState::Offline,
            server_id: None,
            session_id: None,
            last_ping_ts: Utc::now().timestamp_millis(),
        }
    }

    /// Online tuple bound to the owning gateway connection.
    pub fn online(server_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        SessionState {
            state: DeviceState::Online,
            server_id: Some(server_id.into()),
            session_id: Some(session_id.into()),
            last_ping_ts: Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_state_blob_round_trip() {
        let state = SessionState::online("server-01", "session-01");
        let blob = serde_json::to_value(&state).unwrap();
        assert_eq!(blob["state"], 2);
        assert_eq!(blob["serverId"], "server-01");
        let back: SessionState = serde_json::from_value(blob).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn offline_tuple_has_no_owner() {
        let state = SessionState::offline();
        assert_eq!(state.state, DeviceState::Offline);
        assert!(state.server_id.is_none());
        assert!(state.session_id.is_none());
    }

    #[test]
    fn device_info_uses_camel_case_keys() {
        let info = DeviceInfo {
            id: "d1".into(),
            product_id: "p1".into(),
            product_name: Some("demo".into()),
            protocol: None,
            creator_id: Some("admin".into()),
            creator_name: None,
            project_id: None,
            project_name: None,
            device_type: DeviceType::Device,
        };
        let v = serde_json::to_value(&info).unwrap();
        assert_eq!(v["productId"], "p1");
        assert_eq!(v["creatorId"], "admin");
        assert!(v.get("protocol").is_none());
    }
}
