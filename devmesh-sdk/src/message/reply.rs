use super::{
    codes::ErrorCode,
    envelope::{Headers, MessageEnvelope, MessageType},
};
use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Reply-specific payload carried alongside the common reply fields.
pub trait ReplyBody:
    Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static
{
    /// Wire tag this reply serializes under.
    fn message_type() -> MessageType;
}

/// A device reply: common outcome fields plus a typed body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reply<B> {
    pub message_id: String,
    pub device_id: String,
    pub timestamp: i64,
    pub headers: Headers,
    pub success: bool,
    pub code: Option<ErrorCode>,
    pub message: Option<String>,
    pub body: B,
}

/// Body shape on the wire: outcome fields flattened next to the typed payload.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireBody<B> {
    #[serde(default)]
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(flatten)]
    rest: B,
}

impl<B: ReplyBody> Reply<B> {
    /// Successful reply carrying `body`.
    pub fn ok(body: B) -> Self {
        Reply {
            timestamp: Utc::now().timestamp_millis(),
            success: true,
            body,
            ..Default::default()
        }
    }

    /// Failed reply carrying `code` and its default message.
    pub fn error(code: ErrorCode) -> Self {
        Reply {
            timestamp: Utc::now().timestamp_millis(),
            success: false,
            code: Some(code),
            message: Some(code.text().to_string()),
            ..Default::default()
        }
    }

    pub fn set_error(&mut self, code: ErrorCode) {
        self.success = false;
        self.code = Some(code);
        self.message = Some(code.text().to_string());
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Copy the request's correlation fields onto this reply.
    pub fn inherit_from(&mut self, request: &MessageEnvelope) {
        self.message_id = request.message_id.clone();
        self.device_id = request.device_id.clone();
    }

    pub fn to_envelope(&self) -> MessageEnvelope {
        let body = serde_json::to_value(WireBody {
            success: self.success,
            code: self.code,
            message: self.message.clone(),
            rest: self.body.clone(),
        })
        .unwrap_or(Value::Null);
        MessageEnvelope {
            message_id: self.message_id.clone(),
            device_id: self.device_id.clone(),
            timestamp: self.timestamp,
            message_type: B::message_type(),
            headers: self.headers.clone(),
            body,
        }
    }

    /// Decode a reply from any reply-shaped envelope.
    ///
    /// The type tag is not required to match `B`: a gateway may answer
    /// with a generic reply whose body still carries the expected fields.
    pub fn from_envelope(env: &MessageEnvelope) -> serde_json::Result<Self> {
        let wire: WireBody<B> = serde_json::from_value(env.body.clone())?;
        Ok(Reply {
            message_id: env.message_id.clone(),
            device_id: env.device_id.clone(),
            timestamp: env.timestamp,
            headers: env.headers.clone(),
            success: wire.success,
            code: wire.code,
            message: wire.message,
            body: wire.rest,
        })
    }
}

/// Raw reply value as it comes out of the rendezvous pipeline.
#[derive(Debug, Clone)]
pub enum RawReply {
    /// Nothing was written to the reply bucket.
    None,
    /// The pipeline short-circuited with an error code.
    Code(ErrorCode),
    /// Whatever the gateway stored in the reply bucket.
    Payload(Value),
}

/// Convert a raw reply into the typed reply the caller expects.
///
/// `None` becomes `NO_REPLY`; an in-process code is propagated; a stored
/// payload is decoded directly when it is already an envelope, after one
/// level of JSON-string unwrapping otherwise. Unrecognizable payloads yield
/// `UNSUPPORTED_MESSAGE`. Correlation fields are copied from `request`.
pub fn convert_reply<B: ReplyBody>(
    raw: RawReply,
    request: Option<&MessageEnvelope>,
) -> Reply<B> {
    let mut reply = match raw {
        RawReply::None => Reply::error(ErrorCode::NoReply),
        RawReply::Code(code) => Reply::error(code),
        RawReply::Payload(value) => decode_payload(value),
    };
    if let Some(request) = request {
        reply.inherit_from(request);
    }
    reply
}

fn decode_payload<B: ReplyBody>(value: Value) -> Reply<B> {
    let value = match value {
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(inner) => inner,
            Err(error) => {
                warn!(%error, "reply payload string is not valid JSON");
                return Reply::error(ErrorCode::UnsupportedMessage);
            }
        },
        other => other,
    };
    let env = match MessageEnvelope::from_value(value) {
        Ok(env) => env,
        Err(error) => {
            warn!(%error, "reply payload is not a message envelope");
            return Reply::error(ErrorCode::UnsupportedMessage);
        }
    };
    match Reply::from_envelope(&env) {
        Ok(reply) => reply,
        Err(error) => {
            warn!(%error, message_type = ?env.message_type, "unsupported reply body");
            Reply::error(ErrorCode::UnsupportedMessage)
        }
    }
}

/// Body of a function-invoke reply.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

impl ReplyBody for FunctionOutput {
    fn message_type() -> MessageType {
        MessageType::FunctionReply
    }
}

/// Body of a read-property reply.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadPropertyOutput {
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
}

impl ReplyBody for ReadPropertyOutput {
    fn message_type() -> MessageType {
        MessageType::ReadPropertyReply
    }
}

/// Body of a write-property reply, echoing the written values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WritePropertyOutput {
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
}

impl ReplyBody for WritePropertyOutput {
    fn message_type() -> MessageType {
        MessageType::WritePropertyReply
    }
}

pub type FunctionInvokeMessageReply = Reply<FunctionOutput>;
pub type ReadPropertyMessageReply = Reply<ReadPropertyOutput>;
pub type WritePropertyMessageReply = Reply<WritePropertyOutput>;
