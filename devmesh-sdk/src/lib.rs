pub mod constants;
pub mod coordination;
pub mod message;
pub mod metadata;
mod model;
pub mod settings;

pub use coordination::{
    Bucket, CoordinationClient, DistributedSemaphore, EntityMap, Subscription, Topic, TopicHandler,
};
pub use message::{
    convert_reply, new_message_id, ErrorCode, FunctionInvokeMessage, FunctionInvokeMessageReply,
    FunctionOutput, FunctionParameter, Headers, MessageEnvelope, MessageType, RawReply,
    ReadPropertyMessage, ReadPropertyMessageReply, ReadPropertyOutput, Reply, ReplyBody,
    WritePropertyMessage, WritePropertyMessageReply, WritePropertyOutput,
};
pub use metadata::{
    DeviceMetadata, FunctionMetadata, PropertyMetadata, ProtocolSupport, ProtocolSupports,
    ValidateResult, ValueType,
};
pub use model::{DeviceInfo, DeviceState, DeviceType, ProductInfo, SessionState};
pub use settings::Settings;
