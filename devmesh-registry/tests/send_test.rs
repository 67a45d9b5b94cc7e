mod common;

use async_trait::async_trait;
use common::{init_tracing, new_device_info, new_registry, settings_with_await};
use devmesh_error::MeshResult;
use devmesh_registry::{
    DeviceOperation, DeviceRegistry, MemoryCoordination, MessageGateway, SenderInterceptor,
};
use devmesh_sdk::{
    constants::{message_reply_key, reply_semaphore_key},
    CoordinationClient, DeviceState, ErrorCode, FunctionInvokeMessageReply, FunctionOutput,
    MessageEnvelope, MessageType, ReadPropertyOutput, Reply, Settings, WritePropertyOutput,
};
use serde_json::{json, Map, Value};
use std::{sync::Arc, time::Duration};
use tokio::time::timeout;

async fn online_device(
    registry: &DeviceRegistry,
    device_id: &str,
    server_id: &str,
) -> DeviceOperation {
    let operation = registry
        .register(new_device_info(device_id, "p1"))
        .await
        .unwrap();
    operation.online(server_id, "session-1").await.unwrap();
    operation
}

/// Wire a gateway consumer that echoes a successful function reply.
fn echo_ok(gateway: &MessageGateway, device_id: &str) {
    let replier = gateway.clone();
    gateway.handle_message(device_id, move |request: MessageEnvelope| {
        let replier = replier.clone();
        async move {
            let mut reply = Reply::ok(FunctionOutput {
                output: Some(json!("ok")),
            });
            reply.message = Some("ok".into());
            reply.inherit_from(&request);
            replier.reply(reply.to_envelope()).await.unwrap();
        }
    });
}

#[tokio::test]
async fn function_invoke_happy_path() {
    init_tracing();
    let client = MemoryCoordination::new();
    let settings = Settings::default();
    let registry = new_registry(&client, settings.clone());
    let operation = online_device(&registry, "d1", "srv1").await;

    let gateway = MessageGateway::new(Arc::new(client.clone()), "srv1", settings)
        .await
        .unwrap();
    echo_ok(&gateway, "d1");

    let reply = timeout(
        Duration::from_secs(1),
        operation
            .message_sender()
            .invoke_function("test")
            .message_id("msg-happy")
            .send(),
    )
    .await
    .expect("reply within one second")
    .unwrap();

    assert!(reply.is_success());
    assert_eq!(reply.message.as_deref(), Some("ok"));
    assert_eq!(reply.message_id, "msg-happy");
    // The rendezvous cleans its semaphore up in all paths.
    assert!(!client.contains_semaphore(&reply_semaphore_key("msg-happy")));
}

#[tokio::test]
async fn offline_device_short_circuits() {
    init_tracing();
    let client = MemoryCoordination::new();
    let registry = new_registry(&client, Settings::default());
    let operation = registry
        .register(new_device_info("d2", "p1"))
        .await
        .unwrap();

    let reply = timeout(
        Duration::from_millis(100),
        operation.message_sender().invoke_function("test").send(),
    )
    .await
    .expect("offline reply is immediate")
    .unwrap();

    assert_eq!(reply.code, Some(ErrorCode::ClientOffline));
    assert!(!reply.is_success());
}

#[tokio::test]
async fn silent_gateway_times_out_with_no_reply() {
    init_tracing();
    let client = MemoryCoordination::new();
    let settings = settings_with_await(1);
    let registry = new_registry(&client, settings.clone());
    let operation = online_device(&registry, "d3", "srv-x").await;

    let gateway = MessageGateway::new(Arc::new(client.clone()), "srv-x", settings)
        .await
        .unwrap();
    // Consumer accepts the message but never answers.
    gateway.handle_message("d3", |_request: MessageEnvelope| async {});

    let reply = operation
        .message_sender()
        .invoke_function("test")
        .message_id("msg-timeout")
        .send()
        .await
        .unwrap();

    assert_eq!(reply.code, Some(ErrorCode::NoReply));
    assert_eq!(reply.message_id, "msg-timeout");
    assert_eq!(
        client
            .bucket(&message_reply_key("msg-timeout"))
            .get()
            .await
            .unwrap(),
        None
    );
    assert!(!client.contains_semaphore(&reply_semaphore_key("msg-timeout")));
}

#[tokio::test]
async fn stale_owner_self_heals_to_offline() {
    init_tracing();
    let client = MemoryCoordination::new();
    let registry = new_registry(&client, Settings::default());
    // Nothing ever subscribes to srv-dead's topic.
    let operation = online_device(&registry, "d4", "srv-dead").await;

    let reply = operation
        .message_sender()
        .invoke_function("test")
        .send()
        .await
        .unwrap();

    assert_eq!(reply.code, Some(ErrorCode::ClientOffline));
    assert_eq!(operation.state().await.unwrap(), DeviceState::Offline);
    assert_eq!(operation.server_id().await.unwrap(), None);
}

#[tokio::test]
async fn check_state_keeps_live_owner_online() {
    init_tracing();
    let client = MemoryCoordination::new();
    let settings = Settings::default();
    let registry = new_registry(&client, settings.clone());
    let operation = online_device(&registry, "d-live", "srv-live").await;

    let _gateway = MessageGateway::new(Arc::new(client.clone()), "srv-live", settings)
        .await
        .unwrap();

    assert_eq!(operation.check_state().await.unwrap(), DeviceState::Online);
    assert!(operation.is_online().await.unwrap());
}

struct UppercaseReplyMessage;

#[async_trait]
impl SenderInterceptor for UppercaseReplyMessage {
    async fn after_reply(
        &self,
        _operation: Option<DeviceOperation>,
        _request: &MessageEnvelope,
        mut reply: MessageEnvelope,
    ) -> MeshResult<MessageEnvelope> {
        if let Some(message) = reply.body.get_mut("message") {
            if let Some(text) = message.as_str() {
                *message = json!(text.to_uppercase());
            }
        }
        Ok(reply)
    }
}

#[tokio::test]
async fn interceptor_transforms_the_reply() {
    init_tracing();
    let client = MemoryCoordination::new();
    let settings = Settings::default();
    let registry = new_registry(&client, settings.clone());
    registry.add_interceptor(Arc::new(UppercaseReplyMessage));
    let operation = online_device(&registry, "d6", "srv6").await;

    let gateway = MessageGateway::new(Arc::new(client.clone()), "srv6", settings)
        .await
        .unwrap();
    echo_ok(&gateway, "d6");

    let reply = operation
        .message_sender()
        .invoke_function("test")
        .send()
        .await
        .unwrap();
    assert!(reply.is_success());
    assert_eq!(reply.message.as_deref(), Some("OK"));
}

#[tokio::test]
async fn duplicate_gateways_all_must_answer() {
    init_tracing();
    let client = MemoryCoordination::new();
    let settings = Settings::default();
    let registry = new_registry(&client, settings.clone());
    let operation = online_device(&registry, "d-dup", "srv-dup").await;

    // Two gateway services sharing one server id: a deployment mistake
    // the rendezvous tolerates by requiring every replica to release.
    let first = MessageGateway::new(Arc::new(client.clone()), "srv-dup", settings.clone())
        .await
        .unwrap();
    let second = MessageGateway::new(Arc::new(client.clone()), "srv-dup", settings)
        .await
        .unwrap();
    echo_ok(&first, "d-dup");
    echo_ok(&second, "d-dup");

    let reply = timeout(
        Duration::from_secs(1),
        operation.message_sender().invoke_function("test").send(),
    )
    .await
    .expect("both replicas answer quickly")
    .unwrap();
    assert!(reply.is_success());
}

#[tokio::test]
async fn async_invoke_is_acknowledged_then_retrievable() {
    init_tracing();
    let client = MemoryCoordination::new();
    let settings = Settings::default();
    let registry = new_registry(&client, settings.clone());
    let operation = online_device(&registry, "d7", "srv7").await;

    let gateway = MessageGateway::new(Arc::new(client.clone()), "srv7", settings)
        .await
        .unwrap();
    let replier = gateway.clone();
    gateway.handle_message("d7", move |request: MessageEnvelope| {
        let replier = replier.clone();
        async move {
            if request.is_async() {
                replier.mark_message_async(&request.message_id).await.unwrap();
                // The device answers later; the sender is already gone.
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    let mut reply = Reply::ok(FunctionOutput {
                        output: Some(json!("done")),
                    });
                    reply.inherit_from(&request);
                    replier.reply(reply.to_envelope()).await.unwrap();
                });
            }
        }
    });

    let sender = operation.message_sender();
    let reply = timeout(
        Duration::from_secs(1),
        sender
            .invoke_function("test")
            .message_id("msg-async")
            .invoke_async(true)
            .send(),
    )
    .await
    .expect("async acknowledgement is fast")
    .unwrap();
    // Acknowledged without a payload.
    assert_eq!(reply.code, Some(ErrorCode::NoReply));

    tokio::time::sleep(Duration::from_millis(300)).await;
    let later: FunctionInvokeMessageReply = sender.retrieve_reply("msg-async").await.unwrap();
    assert!(later.is_success());
    assert_eq!(later.message_id, "msg-async");
    assert_eq!(later.body.output, Some(json!("done")));
}

#[tokio::test]
async fn cancelled_caller_still_cleans_up() {
    init_tracing();
    let client = MemoryCoordination::new();
    let settings = Settings::default();
    let registry = new_registry(&client, settings.clone());
    let operation = online_device(&registry, "d8", "srv8").await;

    let gateway = MessageGateway::new(Arc::new(client.clone()), "srv8", settings)
        .await
        .unwrap();
    let replier = gateway.clone();
    gateway.handle_message("d8", move |request: MessageEnvelope| {
        let replier = replier.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            let mut reply = Reply::ok(FunctionOutput::default());
            reply.inherit_from(&request);
            replier.reply(reply.to_envelope()).await.unwrap();
        }
    });

    // Give up after 50ms; the detached pipeline keeps running.
    let cancelled = timeout(
        Duration::from_millis(50),
        operation
            .message_sender()
            .invoke_function("test")
            .message_id("msg-cancel")
            .send(),
    )
    .await;
    assert!(cancelled.is_err());

    tokio::time::sleep(Duration::from_millis(600)).await;
    // The background chain consumed the reply and removed both keys.
    assert_eq!(
        client
            .bucket(&message_reply_key("msg-cancel"))
            .get()
            .await
            .unwrap(),
        None
    );
    assert!(!client.contains_semaphore(&reply_semaphore_key("msg-cancel")));
}

#[tokio::test]
async fn read_and_write_property_round_trip() {
    init_tracing();
    let client = MemoryCoordination::new();
    let settings = Settings::default();
    let registry = new_registry(&client, settings.clone());
    let operation = online_device(&registry, "d10", "srv10").await;

    let gateway = MessageGateway::new(Arc::new(client.clone()), "srv10", settings)
        .await
        .unwrap();
    let replier = gateway.clone();
    gateway.handle_message("d10", move |request: MessageEnvelope| {
        let replier = replier.clone();
        async move {
            let envelope = match request.message_type {
                MessageType::ReadProperty => {
                    let mut properties = Map::new();
                    properties.insert("temperature".into(), json!(21.5));
                    let mut reply = Reply::ok(ReadPropertyOutput { properties });
                    reply.inherit_from(&request);
                    reply.to_envelope()
                }
                MessageType::WriteProperty => {
                    let properties = request
                        .body
                        .get("properties")
                        .and_then(Value::as_object)
                        .cloned()
                        .unwrap_or_default();
                    let mut reply = Reply::ok(WritePropertyOutput { properties });
                    reply.inherit_from(&request);
                    reply.to_envelope()
                }
                _ => return,
            };
            replier.reply(envelope).await.unwrap();
        }
    });

    let sender = operation.message_sender();
    let read = timeout(
        Duration::from_secs(1),
        sender.read_property(["temperature"]).send(),
    )
    .await
    .expect("read reply within one second")
    .unwrap();
    assert!(read.is_success());
    assert_eq!(read.body.properties["temperature"], json!(21.5));

    let written = timeout(
        Duration::from_secs(1),
        sender.write_property().write("setpoint", json!(22)).send(),
    )
    .await
    .expect("write reply within one second")
    .unwrap();
    assert!(written.is_success());
    assert_eq!(written.body.properties["setpoint"], json!(22));
}

#[tokio::test]
async fn per_call_timeout_override_applies() {
    init_tracing();
    let client = MemoryCoordination::new();
    // Default await is 30s; the per-call override must win.
    let settings = Settings::default();
    let registry = new_registry(&client, settings.clone());
    let operation = online_device(&registry, "d9", "srv9").await;

    let gateway = MessageGateway::new(Arc::new(client.clone()), "srv9", settings)
        .await
        .unwrap();
    gateway.handle_message("d9", |_request: MessageEnvelope| async {});

    let reply = timeout(
        Duration::from_secs(2),
        operation
            .message_sender()
            .invoke_function("test")
            .timeout(Duration::from_millis(200))
            .send(),
    )
    .await
    .expect("override keeps the wait short")
    .unwrap();
    assert_eq!(reply.code, Some(ErrorCode::NoReply));
}
