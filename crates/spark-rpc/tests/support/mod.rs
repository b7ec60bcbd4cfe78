//! 集成测试共享夹具。
//!
//! # 教案级导览
//!
//! - **Why**：分发器的绝大多数性质只有在“发送请求 → 对端回包 → 路由”完整闭环中才能观测；
//!   夹具以同步回环传输模拟对端：测试先排队响应报文，客户端在 `send` 中发出请求时，
//!   传输立即把排队的报文逐个交给 [`Client::route`]，并记录每个报文的路由结果。
//! - **How**：
//!   - `SomeMessage` / `AnotherMessage` 及其编解码器按 protobuf 线格式手写，未知字段一律拒绝，
//!     使“无效载荷”可以稳定地触发解码失败；
//!   - `PublicService` 的四个方法由 TOML schema 装载，覆盖四种调用类型；
//!   - 通道 1 走回环传输，通道 2 只记录发送不回包。
//! - **What**：
//!   - `enqueue_*` 只排队不路由，下一次发送时才被处理；
//!   - `route_results` 按处理顺序返回 `route` 的布尔结果；
//!   - `fail_sends(true)` 之后所有发送返回 [`SendError::Closed`]。

#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use spark_rpc::packet::varint::{decode_varint, encode_varint};
use spark_rpc::{
    Channel, ChannelTable, Client, ClientConfig, CodecCatalog, DecodeError, EncodeError,
    MessageCodec, MethodDescriptor, MethodRegistry, Packet, PacketType, SendError, Status,
    WeakClient,
};

pub const SERVICE: &str = "pw.test1.PublicService";
pub const UNARY: &str = "pw.test1.PublicService.SomeUnary";
pub const SERVER_STREAMING: &str = "pw.test1.PublicService.SomeServerStreaming";
pub const CLIENT_STREAMING: &str = "pw.test1.PublicService.SomeClientStreaming";
pub const BIDI_STREAMING: &str = "pw.test1.PublicService.SomeBidiStreaming";

pub const SCHEMA: &str = r#"
[[services]]
name = "pw.test1.PublicService"

[[services.methods]]
name = "SomeUnary"
kind = "unary"
request = "pw.test1.SomeMessage"
response = "pw.test1.AnotherMessage"

[[services.methods]]
name = "SomeServerStreaming"
kind = "server_streaming"
request = "pw.test1.SomeMessage"
response = "pw.test1.AnotherMessage"

[[services.methods]]
name = "SomeClientStreaming"
kind = "client_streaming"
request = "pw.test1.SomeMessage"
response = "pw.test1.AnotherMessage"

[[services.methods]]
name = "SomeBidiStreaming"
kind = "bidirectional_streaming"
request = "pw.test1.SomeMessage"
response = "pw.test1.AnotherMessage"
"#;

/// `message SomeMessage { uint32 magic_number = 1; }`
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SomeMessage {
    pub magic_number: u32,
}

/// `message AnotherMessage { Result result = 1; string payload = 2; }`
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AnotherMessage {
    pub result: u32,
    pub payload: String,
}

impl AnotherMessage {
    pub fn with_payload(payload: &str) -> Self {
        Self {
            result: 0,
            payload: payload.to_owned(),
        }
    }
}

fn put_varint_field(field: u64, value: u64, buf: &mut BytesMut) {
    if value != 0 {
        encode_varint(field << 3, buf);
        encode_varint(value, buf);
    }
}

/// 逐字段读取，只接受 varint 与 length-delimited，回调返回 `false` 表示字段未知。
fn read_fields(
    type_name: &str,
    mut bytes: &[u8],
    mut on_field: impl FnMut(u64, FieldValue<'_>) -> bool,
) -> Result<(), DecodeError> {
    let fail = |detail: &str| DecodeError::new(type_name, detail);
    while !bytes.is_empty() {
        let key = decode_varint(&mut bytes).map_err(|e| fail(&e.to_string()))?;
        let field = key >> 3;
        let value = match key & 0x7 {
            0 => FieldValue::Varint(decode_varint(&mut bytes).map_err(|e| fail(&e.to_string()))?),
            2 => {
                let len = decode_varint(&mut bytes).map_err(|e| fail(&e.to_string()))? as usize;
                if len > bytes.len() {
                    return Err(fail("length-delimited field truncated"));
                }
                let (head, tail) = bytes.split_at(len);
                bytes = tail;
                FieldValue::Bytes(head)
            }
            other => return Err(fail(&format!("unsupported wire type {other}"))),
        };
        if !on_field(field, value) {
            return Err(fail(&format!("unexpected field {field}")));
        }
    }
    Ok(())
}

enum FieldValue<'a> {
    Varint(u64),
    Bytes(&'a [u8]),
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SomeMessageCodec;

impl MessageCodec for SomeMessageCodec {
    type Message = SomeMessage;

    fn type_name(&self) -> &str {
        "pw.test1.SomeMessage"
    }

    fn encode(&self, message: &SomeMessage) -> Result<Bytes, EncodeError> {
        let mut buf = BytesMut::new();
        put_varint_field(1, u64::from(message.magic_number), &mut buf);
        Ok(buf.freeze())
    }

    fn decode(&self, bytes: &[u8]) -> Result<SomeMessage, DecodeError> {
        let mut message = SomeMessage::default();
        read_fields(self.type_name(), bytes, |field, value| match (field, value) {
            (1, FieldValue::Varint(v)) => {
                message.magic_number = v as u32;
                true
            }
            _ => false,
        })?;
        Ok(message)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AnotherMessageCodec;

impl MessageCodec for AnotherMessageCodec {
    type Message = AnotherMessage;

    fn type_name(&self) -> &str {
        "pw.test1.AnotherMessage"
    }

    fn encode(&self, message: &AnotherMessage) -> Result<Bytes, EncodeError> {
        let mut buf = BytesMut::new();
        put_varint_field(1, u64::from(message.result), &mut buf);
        if !message.payload.is_empty() {
            encode_varint(2 << 3 | 2, &mut buf);
            encode_varint(message.payload.len() as u64, &mut buf);
            buf.put_slice(message.payload.as_bytes());
        }
        Ok(buf.freeze())
    }

    fn decode(&self, bytes: &[u8]) -> Result<AnotherMessage, DecodeError> {
        let mut message = AnotherMessage::default();
        let mut utf8_error = false;
        read_fields(self.type_name(), bytes, |field, value| match (field, value) {
            (1, FieldValue::Varint(v)) => {
                message.result = v as u32;
                true
            }
            (2, FieldValue::Bytes(raw)) => {
                match std::str::from_utf8(raw) {
                    Ok(text) => message.payload = text.to_owned(),
                    Err(_) => utf8_error = true,
                }
                true
            }
            _ => false,
        })?;
        if utf8_error {
            return Err(DecodeError::new(self.type_name(), "payload is not UTF-8"));
        }
        Ok(message)
    }
}

pub fn encode_another(message: &AnotherMessage) -> Bytes {
    AnotherMessageCodec
        .encode(message)
        .expect("AnotherMessage always encodes")
}

pub fn catalog() -> CodecCatalog {
    let mut catalog = CodecCatalog::new();
    catalog
        .register(SomeMessageCodec)
        .register(AnotherMessageCodec);
    catalog
}

pub fn registry() -> MethodRegistry {
    MethodRegistry::from_toml_str(SCHEMA, &catalog()).expect("test schema loads")
}

#[derive(Default)]
struct LoopState {
    client: OnceLock<WeakClient>,
    sent: Mutex<Vec<Packet>>,
    queued: Mutex<Vec<Bytes>>,
    route_results: Mutex<Vec<bool>>,
    fail_sends: Mutex<bool>,
}

impl LoopState {
    fn on_send(&self, bytes: &[u8], loopback: bool) -> Result<(), SendError> {
        if *self.fail_sends.lock() {
            return Err(SendError::Closed);
        }
        let packet = Packet::decode(bytes).expect("client emits well-formed envelopes");
        self.sent.lock().push(packet);
        if loopback {
            self.flush();
        }
        Ok(())
    }

    fn flush(&self) {
        let queued = std::mem::take(&mut *self.queued.lock());
        let Some(client) = self.client.get().and_then(WeakClient::upgrade) else {
            return;
        };
        for bytes in queued {
            let recognized = client.route(&bytes);
            self.route_results.lock().push(recognized);
        }
    }
}

/// 带回环传输的客户端；克隆共享同一客户端与回环状态。
#[derive(Clone)]
pub struct Harness {
    pub client: Client,
    state: Arc<LoopState>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        let state = Arc::new(LoopState::default());
        let loopback = state.clone();
        let silent = state.clone();
        let channels = ChannelTable::new([
            Channel::new(1, move |bytes: &[u8]| loopback.on_send(bytes, true)),
            Channel::new(2, move |bytes: &[u8]| silent.on_send(bytes, false)),
        ])
        .expect("distinct channel ids");
        let client = Client::with_config(channels, registry(), config).expect("valid config");
        let _ = state.client.set(client.downgrade());
        Self { client, state }
    }

    pub fn method(&self, qualified_name: &str) -> Arc<MethodDescriptor> {
        self.client
            .registry()
            .lookup_by_name(qualified_name)
            .expect("method is registered")
    }

    pub fn enqueue_raw(&self, bytes: Bytes) {
        self.state.queued.lock().push(bytes);
    }

    pub fn enqueue_packet(&self, packet: Packet) {
        self.enqueue_raw(packet.encode());
    }

    pub fn enqueue_response(
        &self,
        channel_id: u32,
        method: &MethodDescriptor,
        status: Status,
        payload: Bytes,
    ) {
        self.enqueue_response_ids(
            channel_id,
            method.service_id(),
            method.method_id(),
            status,
            payload,
        );
    }

    /// 排队一个携带 `AnotherMessage { payload }` 的成功响应。
    pub fn enqueue_payload(&self, channel_id: u32, method: &MethodDescriptor, payload: &str) {
        let body = encode_another(&AnotherMessage::with_payload(payload));
        self.enqueue_response(channel_id, method, Status::Ok, body);
    }

    pub fn enqueue_response_ids(
        &self,
        channel_id: u32,
        service_id: u32,
        method_id: u32,
        status: Status,
        payload: Bytes,
    ) {
        self.enqueue_packet(
            Packet::new(PacketType::Response, channel_id, service_id, method_id, payload)
                .with_status(status),
        );
    }

    pub fn enqueue_stream_end(&self, channel_id: u32, method: &MethodDescriptor, status: Status) {
        self.enqueue_packet(
            Packet::new(
                PacketType::StreamCompletion,
                channel_id,
                method.service_id(),
                method.method_id(),
                Bytes::new(),
            )
            .with_status(status),
        );
    }

    pub fn enqueue_error(&self, channel_id: u32, method: &MethodDescriptor, status: Status) {
        self.enqueue_packet(
            Packet::new(
                PacketType::Error,
                channel_id,
                method.service_id(),
                method.method_id(),
                Bytes::new(),
            )
            .with_status(status),
        );
    }

    /// 立即处理排队的报文，不依赖下一次发送。
    pub fn flush(&self) {
        self.state.flush();
    }

    pub fn sent(&self) -> Vec<Packet> {
        self.state.sent.lock().clone()
    }

    pub fn last_sent(&self) -> Option<Packet> {
        self.state.sent.lock().last().cloned()
    }

    pub fn clear_sent(&self) {
        self.state.sent.lock().clear();
    }

    pub fn take_route_results(&self) -> Vec<bool> {
        std::mem::take(&mut *self.state.route_results.lock())
    }

    pub fn fail_sends(&self, fail: bool) {
        *self.state.fail_sends.lock() = fail;
    }
}

/// 解出最近一次请求的 `SomeMessage` 载荷。
pub fn sent_magic_number(packet: &Packet) -> u32 {
    SomeMessageCodec
        .decode(&packet.payload)
        .expect("request payload decodes")
        .magic_number
}

/// 记录回调收到的事件，响应按 `AnotherMessage` 下转型。
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<(Option<Status>, Option<AnotherMessage>)>>>,
}

impl Recorder {
    pub fn callback(&self) -> spark_rpc::Callback {
        let events = self.events.clone();
        spark_rpc::callback(move |status, response| {
            let response = response
                .and_then(|message| message.downcast::<AnotherMessage>().ok())
                .map(|boxed| *boxed);
            events.lock().push((status, response));
        })
    }

    pub fn events(&self) -> Vec<(Option<Status>, Option<AnotherMessage>)> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}
