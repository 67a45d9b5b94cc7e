//! Wire messages exchanged between nodes and gateways.
//!
//! Every message travels as a [`MessageEnvelope`], a flat JSON object with
//! a type tag and a type-specific `body`. Typed request structs build
//! envelopes; typed replies decode from them.

mod codes;
mod envelope;
mod function;
mod property;
mod reply;

pub use codes::ErrorCode;
pub use envelope::{new_message_id, Headers, MessageEnvelope, MessageType};
pub use function::{FunctionInvokeMessage, FunctionParameter};
pub use property::{ReadPropertyMessage, WritePropertyMessage};
pub use reply::{
    convert_reply, FunctionInvokeMessageReply, FunctionOutput, RawReply, ReadPropertyMessageReply,
    ReadPropertyOutput, Reply, ReplyBody, WritePropertyMessageReply, WritePropertyOutput,
};
