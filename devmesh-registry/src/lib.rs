//! Distributed device registry and message-dispatch plane.
//!
//! Any node can send a command to any device: the sender publishes to the
//! owning gateway's topic and parks on a reply semaphore, the gateway
//! invokes the device and writes the reply bucket before releasing the
//! semaphore. Session state, device/product records and configuration all
//! live in the shared coordination service, so nodes stay stateless.

pub mod config;
mod device;
mod handler;
mod interceptor;
pub mod memory;
mod product;
mod sender;
mod session;

pub use device::{DeviceOperation, DeviceRegistry};
pub use handler::MessageGateway;
pub use interceptor::SenderInterceptor;
pub use memory::MemoryCoordination;
pub use product::ProductOperation;
pub use sender::{
    FunctionInvokeSender, MessageSender, ReadPropertySender, WritePropertySender,
};
