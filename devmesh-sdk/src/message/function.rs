use super::envelope::{Headers, MessageEnvelope, MessageType};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One named input of a function invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionParameter {
    pub name: String,
    pub value: Value,
}

impl FunctionParameter {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        FunctionParameter {
            name: name.into(),
            value,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FunctionInvokeBody<'a> {
    function_id: &'a str,
    inputs: &'a [FunctionParameter],
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FunctionInvokeBodyOwned {
    function_id: String,
    #[serde(default)]
    inputs: Vec<FunctionParameter>,
}

/// Request to invoke a device function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionInvokeMessage {
    pub message_id: String,
    pub device_id: String,
    pub timestamp: i64,
    pub headers: Headers,
    pub function_id: String,
    pub inputs: Vec<FunctionParameter>,
}

impl FunctionInvokeMessage {
    pub fn new(device_id: impl Into<String>, function_id: impl Into<String>) -> Self {
        FunctionInvokeMessage {
            message_id: super::envelope::new_message_id(),
            device_id: device_id.into(),
            timestamp: Utc::now().timestamp_millis(),
            headers: Headers::new(),
            function_id: function_id.into(),
            inputs: Vec::new(),
        }
    }

    pub fn add_input(&mut self, name: impl Into<String>, value: Value) {
        self.inputs.push(FunctionParameter::new(name, value));
    }

    pub fn add_header(&mut self, key: impl Into<String>, value: Value) {
        self.headers.insert(key.into(), value);
    }

    pub fn to_envelope(&self) -> MessageEnvelope {
        MessageEnvelope {
            message_id: self.message_id.clone(),
            device_id: self.device_id.clone(),
            timestamp: self.timestamp,
            message_type: MessageType::Function,
            headers: self.headers.clone(),
            body: serde_json::to_value(FunctionInvokeBody {
                function_id: &self.function_id,
                inputs: &self.inputs,
            })
            .unwrap_or(Value::Null),
        }
    }
}

impl TryFrom<&MessageEnvelope> for FunctionInvokeMessage {
    type Error = serde_json::Error;

    fn try_from(env: &MessageEnvelope) -> Result<Self, Self::Error> {
        let body: FunctionInvokeBodyOwned = serde_json::from_value(env.body.clone())?;
        Ok(FunctionInvokeMessage {
            message_id: env.message_id.clone(),
            device_id: env.device_id.clone(),
            timestamp: env.timestamp,
            headers: env.headers.clone(),
            function_id: body.function_id,
            inputs: body.inputs,
        })
    }
}
