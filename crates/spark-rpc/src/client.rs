//! # client 模块说明
//!
//! ## 角色定位（Why）
//! - [`Client`] 是分发器的门面：持有通道表、方法注册表与待决调用表，
//!   对上提供调用入口（发起、取消、发送客户端流分片），对下提供报文路由入口 [`Client::route`]；
//! - 调用方只拿到 [`CallHandle`]，调用本身始终由待决调用表独占。
//!
//! ## 并发契约（What）
//! - 待决调用表由单把 `parking_lot::Mutex` 保护，调用状态的读写都在锁内完成；
//! - 编码、[`ChannelOutput::send`](crate::channel::ChannelOutput::send)、载荷解码与用户回调全部在锁外执行，
//!   因此同步传输可以在 `send` 内部直接回调 `route`；
//! - 调用在发送请求之前登记，发送失败时按世代号回滚；
//! - 取消与报文交付由同一把锁线性化，后到者成为空操作；
//! - 同一调用的事件在锁内排队，终态事件不会先于更早裁决的流元素到达回调。
//!
//! ## 风险提示（Trade-offs）
//! - 同一调用的事件按锁内裁决顺序经单一排空者交付；多个接收线程并发路由时，
//!   回调可能在另一个接收线程上执行；
//! - 未设置超时，等待超时由上层在 [`CallHandle::cancel`] 之上实现。

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;
use thiserror::Error;

use crate::call::{Callback, Event, NoopSink, Transition};
use crate::channel::{Channel, ChannelTable};
use crate::config::{ClientConfig, ConfigError};
use crate::error::RpcError;
use crate::invoker;
use crate::method::MethodDescriptor;
use crate::packet::{Packet, PacketError, PacketType};
use crate::pending::{CallKey, CancelOutcome, PendingCallTable};
use crate::registry::MethodRegistry;

/// 入站报文被判定为不可路由的原因。
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum RejectReason {
    /// 信封无法解码。
    #[error("malformed envelope: {0}")]
    EnvelopeDecode(#[from] PacketError),
    /// 报文长度超过配置上限。
    #[error("packet of {size} bytes exceeds the {limit}-byte limit")]
    Oversized { size: usize, limit: usize },
    /// 通道未绑定。
    #[error("channel {0} is not bound")]
    UnknownChannel(u32),
    /// 服务未注册。
    #[error("service {service_id:#010x} is not registered")]
    UnknownService { service_id: u32 },
    /// 服务已注册但方法未注册。
    #[error("method {method_id:#010x} is not registered on service {service_id:#010x}")]
    UnknownMethod { service_id: u32, method_id: u32 },
}

/// 一次路由的结果。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RouteOutcome {
    /// 报文驱动了某个调用的状态机并交付给接收端。
    Delivered,
    /// 报文身份合法，但其类型对客户端无意义（例如对端回显的 REQUEST）。
    Ignored,
    /// 报文身份合法，但没有对应的待决调用（调用已完成或已取消）。
    NoPendingCall,
    /// 报文不可路由。
    Rejected(RejectReason),
}

impl RouteOutcome {
    /// 报文身份是否被识别，即 [`Client::route`] 的返回值。
    pub fn is_recognized(&self) -> bool {
        !matches!(self, RouteOutcome::Rejected(_))
    }
}

/// 客户端调用分发器。
///
/// # 教案式说明
/// - **意图 (Why)**：跟踪少量逻辑通道上的在途调用，把异步到达的响应报文送到正确的调用，
///   并把用户回调的失败隔离在分发器状态之外；
/// - **契约 (What)**：
///   - `Client` 可廉价克隆，所有克隆共享同一组表；
///   - 每个 `(通道, 服务, 方法)` 至多一个在途调用；
///   - 释放最后一个 `Client` 时，仍在途的调用收到取消通知，阻塞等待方被唤醒。
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    channels: ChannelTable,
    registry: MethodRegistry,
    config: ClientConfig,
    pending: Mutex<PendingCallTable>,
}

impl Client {
    /// 以缺省配置构造客户端。
    pub fn new(channels: ChannelTable, registry: MethodRegistry) -> Self {
        Self::from_parts(channels, registry, ClientConfig::default())
    }

    /// 以显式配置构造客户端，配置先经校验。
    pub fn with_config(
        channels: ChannelTable,
        registry: MethodRegistry,
        config: ClientConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_parts(channels, registry, config))
    }

    fn from_parts(channels: ChannelTable, registry: MethodRegistry, config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                channels,
                registry,
                config,
                pending: Mutex::new(PendingCallTable::new()),
            }),
        }
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.inner.registry
    }

    pub fn channels(&self) -> &ChannelTable {
        &self.inner.channels
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// 取得不延长客户端生命周期的弱引用，供需要在 `send` 内回调 [`route`](Self::route)
    /// 的传输实现持有，避免“客户端 → 通道 → 传输 → 客户端”的引用环。
    pub fn downgrade(&self) -> WeakClient {
        WeakClient {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// 当前在途调用数量。
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// 给定身份上是否存在在途调用。
    pub fn is_pending(&self, channel_id: u32, service_id: u32, method_id: u32) -> bool {
        self.inner
            .pending
            .lock()
            .lookup(&CallKey::new(channel_id, service_id, method_id))
            .is_some()
    }

    /// 发起调用。
    ///
    /// # 教案式注释
    /// - **意图 (Why)**：以身份三元组发起任意类型的调用，结果经 `callback` 异步交付；
    /// - **执行 (How)**：
    ///   1. 校验通道与方法，按请求编解码器编码载荷并检查报文长度；
    ///   2. 在锁内登记调用，已有同键调用时返回 [`RpcError::AlreadyPending`]；
    ///   3. 在锁外发送 REQUEST 报文，失败时回滚本次登记；
    /// - **契约 (What)**：`callback` 为 `None` 时结果被丢弃；返回 `Err` 时表中不残留本次调用。
    pub fn invoke(
        &self,
        channel_id: u32,
        service_id: u32,
        method_id: u32,
        request: &dyn Any,
        callback: Option<Callback>,
    ) -> Result<CallHandle, RpcError> {
        let method = self.lookup_method(service_id, method_id)?;
        let sink = callback.unwrap_or_else(|| Arc::new(NoopSink));
        self.start_call(channel_id, method, request, sink)
    }

    /// 以全限定名发起调用。
    pub fn invoke_by_name(
        &self,
        channel_id: u32,
        qualified_name: &str,
        request: &dyn Any,
        callback: Option<Callback>,
    ) -> Result<CallHandle, RpcError> {
        let method = self
            .inner
            .registry
            .lookup_by_name(qualified_name)
            .ok_or_else(|| RpcError::UnknownMethodName(qualified_name.to_owned()))?;
        let sink = callback.unwrap_or_else(|| Arc::new(NoopSink));
        self.start_call(channel_id, method, request, sink)
    }

    pub(crate) fn lookup_method(
        &self,
        service_id: u32,
        method_id: u32,
    ) -> Result<Arc<MethodDescriptor>, RpcError> {
        self.inner
            .registry
            .lookup(service_id, method_id)
            .ok_or(RpcError::UnknownMethod {
                service_id,
                method_id,
            })
    }

    pub(crate) fn start_call(
        &self,
        channel_id: u32,
        method: Arc<MethodDescriptor>,
        request: &dyn Any,
        sink: Callback,
    ) -> Result<CallHandle, RpcError> {
        let channel = self.inner.channel(channel_id)?;
        let encoded = self.inner.encode_packet(
            PacketType::Request,
            channel_id,
            &method,
            request,
        )?;

        let (key, generation) = self
            .inner
            .pending
            .lock()
            .begin(channel_id, method.clone(), sink)?;

        if let Err(source) = channel.send(encoded) {
            self.inner.pending.lock().remove_generation(&key, generation);
            tracing::warn!(
                channel_id,
                method = method.qualified_name(),
                error = %source,
                "failed to send RPC request; call rolled back",
            );
            return Err(RpcError::Send {
                channel_id,
                method: method.qualified_name().to_owned(),
                source,
            });
        }
        tracing::trace!(channel_id, method = method.qualified_name(), generation, "RPC invoked");

        Ok(CallHandle {
            key,
            generation,
            method,
            client: Arc::downgrade(&self.inner),
        })
    }

    /// 取消调用；仅当句柄仍指向本客户端的当前在途调用时返回 `true`。
    pub fn cancel(&self, handle: &CallHandle) -> bool {
        if !Weak::ptr_eq(&handle.client, &Arc::downgrade(&self.inner)) {
            return false;
        }
        self.inner.cancel(handle.key, handle.generation)
    }

    /// 向客户端流或双向流调用发送一个请求分片。
    pub fn send_client_stream(
        &self,
        handle: &CallHandle,
        request: &dyn Any,
    ) -> Result<(), RpcError> {
        if !Weak::ptr_eq(&handle.client, &Arc::downgrade(&self.inner)) {
            return Err(RpcError::CallNotPending {
                method: handle.method.qualified_name().to_owned(),
            });
        }
        self.inner.send_client_stream(handle, request)
    }

    /// 路由一个入站报文；返回报文身份是否被识别。
    ///
    /// 无法解码、通道未绑定、服务或方法未注册时返回 `false`；身份合法但无待决调用时返回 `true`。
    pub fn route(&self, bytes: &[u8]) -> bool {
        self.process_packet(bytes).is_recognized()
    }

    /// 路由一个入站报文并返回详细结果。
    ///
    /// # 执行逻辑（How）
    /// 1. 长度检查与信封解码，失败即拒绝；
    /// 2. 依次校验通道、服务、方法；
    /// 3. 锁内查找待决调用并推进状态机，事件进入该调用的交付队列，终止裁决同时移除条目；
    /// 4. 锁外排空交付队列：解码载荷并经回调隔离层交付。另一线程正在排空时直接返回，
    ///    事件由该线程按序送出。
    pub fn process_packet(&self, bytes: &[u8]) -> RouteOutcome {
        let inner = &self.inner;
        let packet = match inner.classify(bytes) {
            Ok(packet) => packet,
            Err(reason) => {
                tracing::warn!(
                    len = bytes.len(),
                    reason = %reason,
                    "discarding unroutable RPC packet",
                );
                return RouteOutcome::Rejected(reason);
            }
        };
        let key = CallKey::new(packet.channel_id, packet.service_id, packet.method_id);

        let (completed, sink, method, outbox) = {
            let mut pending = inner.pending.lock();
            let Some(call) = pending.lookup_mut(&key) else {
                if inner.config.report_stale_packets {
                    tracing::debug!(
                        channel_id = key.channel_id,
                        service_id = key.service_id,
                        method_id = key.method_id,
                        packet_type = ?packet.packet_type,
                        "RPC packet has no pending call; discarded",
                    );
                }
                return RouteOutcome::NoPendingCall;
            };
            let (event, completed) = match call.on_packet(packet.packet_type, packet.status) {
                Transition::Ignore => {
                    tracing::debug!(
                        channel_id = key.channel_id,
                        method = call.method().qualified_name(),
                        packet_type = ?packet.packet_type,
                        "ignoring client-to-server packet type",
                    );
                    return RouteOutcome::Ignored;
                }
                Transition::StreamItem => {
                    let payload = Some(packet.payload.clone());
                    (Event::Next { status: None, payload }, None)
                }
                Transition::Complete {
                    status,
                    with_payload,
                } => {
                    let payload = with_payload.then(|| packet.payload.clone());
                    let event = Event::Next {
                        status: Some(status),
                        payload,
                    };
                    (event, Some(status))
                }
            };
            let sink = call.sink().clone();
            let method = call.method().clone();
            let outbox = call.outbox().clone();
            // 入队在锁内完成，交付顺序与裁决顺序一致。
            outbox.push(event);
            if completed.is_some() {
                pending.remove(&key);
            }
            (completed, sink, method, outbox)
        };

        if let Some(status) = completed {
            tracing::trace!(
                channel_id = key.channel_id,
                method = method.qualified_name(),
                status = %status,
                "RPC call completed",
            );
        }
        invoker::drain(&outbox, &sink, &method, key);
        RouteOutcome::Delivered
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("channels", &self.inner.channels.len())
            .field("methods", &self.inner.registry.len())
            .field("pending", &self.pending_calls())
            .finish()
    }
}

impl ClientInner {
    fn channel(&self, channel_id: u32) -> Result<&Channel, RpcError> {
        self.channels
            .get(channel_id)
            .ok_or(RpcError::UnknownChannel(channel_id))
    }

    fn encode_packet(
        &self,
        packet_type: PacketType,
        channel_id: u32,
        method: &MethodDescriptor,
        message: &dyn Any,
    ) -> Result<Bytes, RpcError> {
        let payload = method
            .request_codec()
            .encode_dyn(message)
            .map_err(|source| RpcError::Encode {
                method: method.qualified_name().to_owned(),
                source,
            })?;
        let packet = Packet::new(
            packet_type,
            channel_id,
            method.service_id(),
            method.method_id(),
            payload,
        );
        let size = packet.encoded_len();
        if size > self.config.max_packet_bytes {
            return Err(RpcError::PacketTooLarge {
                method: method.qualified_name().to_owned(),
                size,
                limit: self.config.max_packet_bytes,
            });
        }
        Ok(packet.encode())
    }

    fn classify(&self, bytes: &[u8]) -> Result<Packet, RejectReason> {
        let limit = self.config.max_packet_bytes;
        if bytes.len() > limit {
            return Err(RejectReason::Oversized {
                size: bytes.len(),
                limit,
            });
        }
        let packet = Packet::decode(bytes)?;
        if !self.channels.contains(packet.channel_id) {
            return Err(RejectReason::UnknownChannel(packet.channel_id));
        }
        if self
            .registry
            .lookup(packet.service_id, packet.method_id)
            .is_none()
        {
            return Err(if self.registry.has_service(packet.service_id) {
                RejectReason::UnknownMethod {
                    service_id: packet.service_id,
                    method_id: packet.method_id,
                }
            } else {
                RejectReason::UnknownService {
                    service_id: packet.service_id,
                }
            });
        }
        Ok(packet)
    }

    fn cancel(&self, key: CallKey, generation: u64) -> bool {
        let outcome = self.pending.lock().cancel(&key, generation);
        let (notify_peer, call) = match outcome {
            CancelOutcome::NotPending => return false,
            CancelOutcome::Cancelled { notify_peer, call } => (notify_peer, call),
        };

        let method = call.method().qualified_name();
        if notify_peer {
            let packet = Packet::new(
                PacketType::Cancel,
                key.channel_id,
                key.service_id,
                key.method_id,
                Bytes::new(),
            );
            let sent = self
                .channels
                .get(key.channel_id)
                .map(|channel| channel.send(packet.encode()));
            if let Some(Err(error)) = sent {
                tracing::warn!(
                    channel_id = key.channel_id,
                    method,
                    error = %error,
                    "failed to send RPC cancellation; call removed locally",
                );
            }
        }
        tracing::debug!(channel_id = key.channel_id, method, notify_peer, "RPC call cancelled");
        invoker::drain(call.outbox(), call.sink(), call.method(), key);
        true
    }

    fn send_client_stream(&self, handle: &CallHandle, request: &dyn Any) -> Result<(), RpcError> {
        let method = &handle.method;
        if !method.kind().has_client_stream() {
            return Err(RpcError::InvalidCallKind {
                method: method.qualified_name().to_owned(),
                kind: method.kind(),
                operation: "client stream chunks",
            });
        }
        if self
            .pending
            .lock()
            .lookup_generation(&handle.key, handle.generation)
            .is_none()
        {
            return Err(RpcError::CallNotPending {
                method: method.qualified_name().to_owned(),
            });
        }
        let channel_id = handle.key.channel_id;
        let channel = self.channel(channel_id)?;
        let encoded =
            self.encode_packet(PacketType::ClientStreamChunk, channel_id, method, request)?;
        channel.send(encoded).map_err(|source| RpcError::Send {
            channel_id,
            method: method.qualified_name().to_owned(),
            source,
        })
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        for call in self.pending.get_mut().drain() {
            let key = CallKey::for_method(call.channel_id(), call.method());
            invoker::drain(call.outbox(), call.sink(), call.method(), key);
        }
    }
}

/// [`Client`] 的弱引用。
#[derive(Clone, Debug, Default)]
pub struct WeakClient {
    inner: Weak<ClientInner>,
}

impl WeakClient {
    pub fn upgrade(&self) -> Option<Client> {
        self.inner.upgrade().map(|inner| Client { inner })
    }
}

/// 在途调用的句柄。
///
/// # 教案式说明
/// - **意图 (Why)**：调用方需要“指向某次调用”的凭据以便取消或续发分片，但不应拥有调用本身；
/// - **契约 (What)**：
///   - 句柄记录身份三元组与世代号，并以弱引用指向客户端；
///   - 调用完成、被取消或被同键新调用取代后，句柄上的操作均为空操作
///     （`cancel` 返回 `false`，`send_client_stream` 返回 [`RpcError::CallNotPending`]）；
///   - 客户端释放后，句柄上的操作返回 `false` 或 [`RpcError::ClientDropped`]。
#[derive(Clone)]
pub struct CallHandle {
    key: CallKey,
    generation: u64,
    method: Arc<MethodDescriptor>,
    client: Weak<ClientInner>,
}

impl CallHandle {
    pub fn key(&self) -> CallKey {
        self.key
    }

    pub fn channel_id(&self) -> u32 {
        self.key.channel_id
    }

    pub fn service_id(&self) -> u32 {
        self.key.service_id
    }

    pub fn method_id(&self) -> u32 {
        self.key.method_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn method(&self) -> &Arc<MethodDescriptor> {
        &self.method
    }

    /// 调用是否仍在途。
    pub fn is_pending(&self) -> bool {
        self.client.upgrade().is_some_and(|inner| {
            inner
                .pending
                .lock()
                .lookup_generation(&self.key, self.generation)
                .is_some()
        })
    }

    /// 取消调用；幂等。
    pub fn cancel(&self) -> bool {
        self.client
            .upgrade()
            .is_some_and(|inner| inner.cancel(self.key, self.generation))
    }

    /// 发送客户端流分片。
    pub fn send_client_stream(&self, request: &dyn Any) -> Result<(), RpcError> {
        let inner = self.client.upgrade().ok_or(RpcError::ClientDropped)?;
        inner.send_client_stream(self, request)
    }
}

impl fmt::Debug for CallHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallHandle")
            .field("key", &self.key)
            .field("generation", &self.generation)
            .field("method", &self.method.qualified_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::callback;
    use crate::channel::SendError;
    use crate::codec::{Message, RawBytesCodec, erase};
    use crate::method::CallKind;
    use crate::status::Status;
    use tracing_test::traced_test;

    fn client_with(output: impl crate::channel::ChannelOutput) -> Client {
        let registry = MethodRegistry::builder()
            .method(MethodDescriptor::new(
                "svc.Echo",
                "Unary",
                CallKind::Unary,
                erase(RawBytesCodec::default()),
                erase(RawBytesCodec::default()),
            ))
            .build()
            .expect("registry");
        let channels = ChannelTable::new([Channel::new(1, output)]).expect("channels");
        Client::new(channels, registry)
    }

    fn method(client: &Client) -> Arc<MethodDescriptor> {
        client
            .registry()
            .lookup_by_name("svc.Echo.Unary")
            .expect("method")
    }

    #[test]
    fn failed_send_rolls_back_registration() {
        let client = client_with(|_: &[u8]| -> Result<(), SendError> { Err(SendError::Closed) });
        let method = method(&client);
        let err = client
            .invoke(
                1,
                method.service_id(),
                method.method_id(),
                &Bytes::new(),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, RpcError::Send { channel_id: 1, .. }), "{err}");
        assert_eq!(client.pending_calls(), 0);
    }

    #[test]
    fn oversized_requests_are_rejected_before_registration() {
        let client = client_with(|_: &[u8]| -> Result<(), SendError> { Ok(()) });
        let method = method(&client);
        let big = Bytes::from(vec![0_u8; 2048]);
        let err = client
            .invoke(1, method.service_id(), method.method_id(), &big, None)
            .unwrap_err();
        assert!(matches!(err, RpcError::PacketTooLarge { limit: 1024, .. }), "{err}");
        assert_eq!(client.pending_calls(), 0);
    }

    #[test]
    #[traced_test]
    fn unroutable_packets_are_logged() {
        let client = client_with(|_: &[u8]| -> Result<(), SendError> { Ok(()) });
        assert!(!client.route(b"\xff\xff\xff"));
        assert!(logs_contain("discarding unroutable RPC packet"));

        let method = method(&client);
        let foreign = Packet::new(
            PacketType::Response,
            9,
            method.service_id(),
            method.method_id(),
            Bytes::new(),
        );
        assert_eq!(
            client.process_packet(&foreign.encode()),
            RouteOutcome::Rejected(RejectReason::UnknownChannel(9))
        );
        assert!(logs_contain("channel 9 is not bound"));
    }

    #[test]
    #[traced_test]
    fn stale_packets_are_reported_at_debug() {
        let client = client_with(|_: &[u8]| -> Result<(), SendError> { Ok(()) });
        let method = method(&client);
        let late = Packet::new(
            PacketType::Response,
            1,
            method.service_id(),
            method.method_id(),
            Bytes::new(),
        );
        assert_eq!(client.process_packet(&late.encode()), RouteOutcome::NoPendingCall);
        assert!(logs_contain("RPC packet has no pending call"));
    }

    #[test]
    #[traced_test]
    fn panicking_callback_leaves_dispatcher_usable() {
        let client = client_with(|_: &[u8]| -> Result<(), SendError> { Ok(()) });
        let method = method(&client);
        let response = Packet::new(
            PacketType::Response,
            1,
            method.service_id(),
            method.method_id(),
            Bytes::from_static(b"ok"),
        )
        .with_status(Status::Ok)
        .encode();

        client
            .invoke(
                1,
                method.service_id(),
                method.method_id(),
                &Bytes::new(),
                Some(callback(|_, _| panic!("Something went wrong!"))),
            )
            .expect("invoke");
        assert!(client.route(&response));
        assert!(logs_contain("Something went wrong!"));
        assert_eq!(client.pending_calls(), 0);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in = seen.clone();
        client
            .invoke(
                1,
                method.service_id(),
                method.method_id(),
                &Bytes::new(),
                Some(callback(move |status, response| {
                    let body = response.and_then(|m| m.downcast::<Bytes>().ok());
                    seen_in.lock().push((status, body.map(|b| *b)));
                })),
            )
            .expect("invoke after panic");
        assert!(client.route(&response));
        assert_eq!(
            seen.lock().as_slice(),
            &[(Some(Status::Ok), Some(Bytes::from_static(b"ok")))]
        );
    }

    #[test]
    fn handles_from_another_client_are_rejected() {
        let first = client_with(|_: &[u8]| -> Result<(), SendError> { Ok(()) });
        let second = client_with(|_: &[u8]| -> Result<(), SendError> { Ok(()) });
        let method = method(&first);
        let handle = first
            .invoke(1, method.service_id(), method.method_id(), &Bytes::new(), None)
            .expect("invoke");
        assert!(!second.cancel(&handle));
        assert!(handle.is_pending());
        assert!(first.cancel(&handle));
        assert!(!handle.is_pending());
    }

    #[test]
    fn dropping_the_client_notifies_pending_calls() {
        struct Flag(Arc<Mutex<bool>>);
        impl crate::call::CallSink for Flag {
            fn on_next(&self, _: Option<Status>, _: Option<Message>) {}
            fn on_cancelled(&self) {
                *self.0.lock() = true;
            }
        }

        let client = client_with(|_: &[u8]| -> Result<(), SendError> { Ok(()) });
        let method = method(&client);
        let flag = Arc::new(Mutex::new(false));
        let handle = client
            .invoke(
                1,
                method.service_id(),
                method.method_id(),
                &Bytes::new(),
                Some(Arc::new(Flag(flag.clone()))),
            )
            .expect("invoke");
        drop(client);
        assert!(*flag.lock());
        assert!(!handle.cancel());
        assert!(matches!(
            handle.send_client_stream(&Bytes::new()),
            Err(RpcError::ClientDropped)
        ));
    }
}
