use crate::{
    device::{DeviceOperation, DeviceOperationInner},
    interceptor::SenderInterceptor,
    session::SessionStore,
};
use devmesh_error::{MeshError, MeshResult};
use devmesh_sdk::{
    constants::{message_accept_topic, message_reply_key, reply_semaphore_key, ASYNC_HEADER},
    convert_reply, CoordinationClient, DistributedSemaphore, ErrorCode, FunctionInvokeMessage,
    FunctionInvokeMessageReply, FunctionParameter, MessageEnvelope, RawReply,
    ReadPropertyMessage, ReadPropertyMessageReply, Reply, ReplyBody, Settings, ValidateResult,
    WritePropertyMessage, WritePropertyMessageReply,
};
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    sync::{Arc, Weak},
    time::Duration,
};
use tracing::{debug, error, warn};

/// Immutable context shared by a sender and all builders cloned from it.
pub(crate) struct SenderContext {
    pub(crate) device_id: String,
    pub(crate) client: Arc<dyn CoordinationClient>,
    pub(crate) settings: Settings,
    pub(crate) session: SessionStore,
    /// Snapshot of the registry chain at sender construction.
    pub(crate) interceptors: Vec<Arc<dyn SenderInterceptor>>,
}

/// Per-device message sender: fluent builders over the reply rendezvous.
#[derive(Clone)]
pub struct MessageSender {
    ctx: Arc<SenderContext>,
    /// Weak so sender handles never keep an unregistered device alive.
    operation: Weak<DeviceOperationInner>,
}

impl MessageSender {
    pub(crate) fn new(operation: &DeviceOperation) -> Self {
        let inner = &operation.inner;
        MessageSender {
            ctx: Arc::new(SenderContext {
                device_id: inner.device_id.clone(),
                client: Arc::clone(&inner.shared.client),
                settings: inner.shared.settings.clone(),
                session: inner.session.clone(),
                interceptors: inner.shared.interceptors.load_full().as_ref().clone(),
            }),
            operation: Arc::downgrade(&operation.inner),
        }
    }

    #[inline]
    pub fn device_id(&self) -> &str {
        &self.ctx.device_id
    }

    /// Start a function-invoke message.
    pub fn invoke_function(&self, function_id: impl Into<String>) -> FunctionInvokeSender {
        FunctionInvokeSender {
            sender: self.clone(),
            message: FunctionInvokeMessage::new(self.ctx.device_id.clone(), function_id),
            max_await: None,
        }
    }

    /// Start a read-property message.
    pub fn read_property<I, S>(&self, properties: I) -> ReadPropertySender
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut message = ReadPropertyMessage::new(self.ctx.device_id.clone());
        message.add_properties(properties);
        ReadPropertySender {
            sender: self.clone(),
            message,
            max_await: None,
        }
    }

    /// Start a write-property message.
    pub fn write_property(&self) -> WritePropertySender {
        WritePropertySender {
            sender: self.clone(),
            message: WritePropertyMessage::new(self.ctx.device_id.clone()),
            max_await: None,
        }
    }

    /// Fetch a previously stored reply without publishing anything.
    ///
    /// Companion of `send()` for fire-and-forget messages; interceptors
    /// are not applied on this path.
    pub async fn retrieve_reply<B: ReplyBody>(&self, message_id: &str) -> MeshResult<Reply<B>> {
        let stored = self
            .ctx
            .client
            .bucket(&message_reply_key(message_id))
            .get_and_delete()
            .await?;
        let raw = match stored {
            Some(value) => RawReply::Payload(value),
            None => RawReply::None,
        };
        let mut reply = convert_reply::<B>(raw, None);
        reply.message_id = message_id.to_string();
        Ok(reply)
    }

    /// Run the full rendezvous for one request envelope.
    ///
    /// The pipeline is spawned so a caller dropping the returned future
    /// cancels only its wait; the chain still runs to completion and
    /// cleans up its semaphore, discarding the result.
    pub(crate) async fn send_envelope<B: ReplyBody>(
        &self,
        request: MessageEnvelope,
        max_await: Option<Duration>,
    ) -> MeshResult<Reply<B>> {
        let ctx = Arc::clone(&self.ctx);
        let operation = self.operation.clone();
        tokio::spawn(send_pipeline::<B>(ctx, operation, request, max_await)).await?
    }

    fn operation_handle(&self) -> Option<DeviceOperation> {
        handle_of(&self.operation)
    }
}

fn handle_of(operation: &Weak<DeviceOperationInner>) -> Option<DeviceOperation> {
    operation.upgrade().map(DeviceOperation::from_inner)
}

async fn send_pipeline<B: ReplyBody>(
    ctx: Arc<SenderContext>,
    operation: Weak<DeviceOperationInner>,
    mut request: MessageEnvelope,
    max_await: Option<Duration>,
) -> MeshResult<Reply<B>> {
    let max_await = max_await.unwrap_or(ctx.settings.message.max_await());

    // No owning gateway: short-circuit without touching the wire.
    let Some(server_id) = ctx.session.server_id().await? else {
        debug!(device_id = %ctx.device_id, message_id = %request.message_id, "device has no owning gateway");
        let mut reply = Reply::<B>::error(ErrorCode::ClientOffline);
        reply.inherit_from(&request);
        return Ok(reply);
    };

    for interceptor in &ctx.interceptors {
        request = interceptor.pre_send(handle_of(&operation), request).await?;
    }

    // Transport failures inside the rendezvous become a SYSTEM_ERROR
    // reply; coordination errors elsewhere propagate as failures.
    let raw = match rendezvous(&ctx, &operation, &server_id, &request, max_await).await {
        Ok(raw) => raw,
        Err(err) => {
            error!(error = %err, message_id = %request.message_id, "rendezvous failed");
            RawReply::Code(ErrorCode::SystemError)
        }
    };

    let mut reply = convert_reply::<B>(raw, Some(&request));

    if !ctx.interceptors.is_empty() {
        let mut envelope = reply.to_envelope();
        for interceptor in &ctx.interceptors {
            envelope = interceptor
                .after_reply(handle_of(&operation), &request, envelope)
                .await?;
        }
        reply = Reply::from_envelope(&envelope)
            .map_err(|e| MeshError::Interceptor(format!("after_reply produced an undecodable reply: {e}")))?;
    }
    Ok(reply)
}

async fn rendezvous(
    ctx: &SenderContext,
    operation: &Weak<DeviceOperationInner>,
    server_id: &str,
    request: &MessageEnvelope,
    max_await: Duration,
) -> MeshResult<RawReply> {
    let subscribers = ctx
        .client
        .topic(&message_accept_topic(server_id))
        .publish(request.to_value()?)
        .await?;

    if subscribers == 0 {
        // The registered owner is not consuming its topic: the gateway
        // probably crashed with stale state behind it. Reconcile, then
        // report offline.
        debug!(device_id = %ctx.device_id, server_id, "no subscriber on gateway topic, reconciling state");
        let checked = match handle_of(operation) {
            Some(op) => op.check_state().await,
            None => ctx.session.check_state().await,
        };
        if let Err(err) = checked {
            warn!(error = %err, device_id = %ctx.device_id, "state check after empty publish failed");
        }
        return Ok(RawReply::Code(ErrorCode::ClientOffline));
    }
    if subscribers > 1 {
        warn!(server_id, subscribers, "multiple gateway services share this server id");
    }
    debug!(device_id = %ctx.device_id, message_id = %request.message_id, server_id, "device message published");

    // Every subscriber must release before the waiter proceeds, so a
    // duplicated gateway cannot hand us a half-written reply.
    let semaphore = ctx
        .client
        .semaphore(&reply_semaphore_key(&request.message_id));
    semaphore
        .expire(ctx.settings.message.reply_ttl_for(max_await))
        .await?;
    let outcome = await_reply(ctx, semaphore.as_ref(), request, subscribers, max_await).await;
    if let Err(err) = semaphore.delete().await {
        warn!(error = %err, message_id = %request.message_id, "failed to delete reply semaphore");
    }
    outcome
}

async fn await_reply(
    ctx: &SenderContext,
    semaphore: &dyn DistributedSemaphore,
    request: &MessageEnvelope,
    subscribers: u64,
    max_await: Duration,
) -> MeshResult<RawReply> {
    let permits = subscribers.min(u64::from(u32::MAX)) as u32;
    let acquired = semaphore.acquire(permits, max_await).await?;
    if !acquired {
        warn!(
            message_id = %request.message_id,
            await_seconds = max_await.as_secs(),
            "timed out waiting for device reply; tune message.await_max_seconds if this is expected"
        );
    }
    // A timeout is not a failure: a partial reply may still be present.
    let stored = ctx
        .client
        .bucket(&message_reply_key(&request.message_id))
        .get_and_delete()
        .await?;
    if stored.is_some() {
        debug!(device_id = %request.device_id, message_id = %request.message_id, "received device reply");
    }
    Ok(match stored {
        Some(value) => RawReply::Payload(value),
        None => RawReply::None,
    })
}

/// Builder for a function-invoke message.
pub struct FunctionInvokeSender {
    sender: MessageSender,
    message: FunctionInvokeMessage,
    max_await: Option<Duration>,
}

impl std::fmt::Debug for FunctionInvokeSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionInvokeSender")
            .field("message", &self.message)
            .field("max_await", &self.max_await)
            .finish()
    }
}

impl FunctionInvokeSender {
    /// Override the auto-generated message id.
    pub fn message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message.message_id = message_id.into();
        self
    }

    pub fn add_input(mut self, name: impl Into<String>, value: Value) -> Self {
        self.message.add_input(name, value);
        self
    }

    /// Replace all inputs at once.
    pub fn inputs(mut self, inputs: Vec<FunctionParameter>) -> Self {
        self.message.inputs = inputs;
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: Value) -> Self {
        self.message.add_header(key, value);
        self
    }

    /// Mark the invocation fire-and-forget; the gateway acknowledges via
    /// `mark_message_async` and the reply is fetched later.
    pub fn invoke_async(mut self, is_async: bool) -> Self {
        self.message.add_header(ASYNC_HEADER, json!(is_async));
        self
    }

    /// Arbitrary access to the message under construction.
    pub fn custom(mut self, configurator: impl FnOnce(&mut FunctionInvokeMessage)) -> Self {
        configurator(&mut self.message);
        self
    }

    /// Per-call override of the reply await window.
    pub fn timeout(mut self, max_await: Duration) -> Self {
        self.max_await = Some(max_await);
        self
    }

    /// Check the inputs against the device's function metadata.
    ///
    /// Fails when the function is undefined, the arity mismatches or an
    /// input name is unknown; otherwise feeds each input's validation
    /// result to `consumer`.
    pub async fn validate<F>(self, mut consumer: F) -> MeshResult<Self>
    where
        F: FnMut(&FunctionParameter, &ValidateResult),
    {
        let Some(operation) = self.sender.operation_handle() else {
            return Err(MeshError::DeviceNotFound(self.sender.ctx.device_id.clone()));
        };
        let metadata = operation.metadata().await?;
        let function = metadata
            .function(&self.message.function_id)
            .ok_or_else(|| MeshError::FunctionUndefined(self.message.function_id.clone()))?;
        if function.inputs.len() != self.message.inputs.len() {
            warn!(
                function_id = %self.message.function_id,
                expected = function.inputs.len(),
                actual = self.message.inputs.len(),
                "function parameter count mismatch"
            );
            return Err(MeshError::IllegalArgument(format!(
                "function '{}' expects {} parameters, got {}",
                self.message.function_id,
                function.inputs.len(),
                self.message.inputs.len()
            )));
        }
        let by_id: HashMap<&str, _> = function
            .inputs
            .iter()
            .map(|meta| (meta.id.as_str(), meta))
            .collect();
        for input in &self.message.inputs {
            let meta = by_id
                .get(input.name.as_str())
                .ok_or_else(|| MeshError::ParameterUndefined(input.name.clone()))?;
            consumer(input, &meta.value_type.validate(&input.value));
        }
        Ok(self)
    }

    pub async fn send(self) -> MeshResult<FunctionInvokeMessageReply> {
        self.sender
            .send_envelope(self.message.to_envelope(), self.max_await)
            .await
    }

    pub async fn retrieve_reply(self) -> MeshResult<FunctionInvokeMessageReply> {
        self.sender.retrieve_reply(&self.message.message_id).await
    }
}

/// Builder for a read-property message.
pub struct ReadPropertySender {
    sender: MessageSender,
    message: ReadPropertyMessage,
    max_await: Option<Duration>,
}

impl ReadPropertySender {
    pub fn message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message.message_id = message_id.into();
        self
    }

    pub fn read<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.message.add_properties(properties);
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: Value) -> Self {
        self.message.add_header(key, value);
        self
    }

    pub fn custom(mut self, configurator: impl FnOnce(&mut ReadPropertyMessage)) -> Self {
        configurator(&mut self.message);
        self
    }

    pub fn timeout(mut self, max_await: Duration) -> Self {
        self.max_await = Some(max_await);
        self
    }

    pub async fn send(self) -> MeshResult<ReadPropertyMessageReply> {
        self.sender
            .send_envelope(self.message.to_envelope(), self.max_await)
            .await
    }

    pub async fn retrieve_reply(self) -> MeshResult<ReadPropertyMessageReply> {
        self.sender.retrieve_reply(&self.message.message_id).await
    }
}

/// Builder for a write-property message.
pub struct WritePropertySender {
    sender: MessageSender,
    message: WritePropertyMessage,
    max_await: Option<Duration>,
}

impl WritePropertySender {
    pub fn message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message.message_id = message_id.into();
        self
    }

    pub fn write(mut self, property: impl Into<String>, value: Value) -> Self {
        self.message.add_property(property, value);
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: Value) -> Self {
        self.message.add_header(key, value);
        self
    }

    pub fn custom(mut self, configurator: impl FnOnce(&mut WritePropertyMessage)) -> Self {
        configurator(&mut self.message);
        self
    }

    pub fn timeout(mut self, max_await: Duration) -> Self {
        self.max_await = Some(max_await);
        self
    }

    pub async fn send(self) -> MeshResult<WritePropertyMessageReply> {
        self.sender
            .send_envelope(self.message.to_envelope(), self.max_await)
            .await
    }

    pub async fn retrieve_reply(self) -> MeshResult<WritePropertyMessageReply> {
        self.sender.retrieve_reply(&self.message.message_id).await
    }
}
