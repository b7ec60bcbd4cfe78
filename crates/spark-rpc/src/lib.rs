//! # spark-rpc
//!
//! ## 定位与职责（Why）
//! - 作为 RPC 框架的客户端调用分发器：跟踪少量逻辑通道上的在途调用，把异步到达的响应报文
//!   路由到正确的调用，并驱动单次、服务端流、客户端流与双向流调用走向完成、取消或错误；
//! - 用户回调的失败被隔离在分发器状态之外，单个回调 panic 不影响其他调用与后续报文。
//!
//! ## 架构嵌入（Where）
//! - `packet`、`status`：线上报文信封与状态码；
//! - `ids`、`method`、`schema`、`registry`、`codec`：方法元数据与载荷编解码接缝；
//! - `channel`：通道表与出站发送原语，真实传输由外部协作方实现；
//! - `pending`、`call`、`invoker`：待决调用表、调用状态机与回调隔离层；
//! - `client`、`blocking`、`stub`：调用入口、报文路由、阻塞式入口与强类型调用桩。
//!
//! ## 行为不变式（What）
//! - 每个 `(通道, 服务, 方法)` 至多一个在途调用，第二次调用同步返回
//!   [`RpcError::AlreadyPending`]；
//! - 不可解码、通道未知或方法未注册的报文被丢弃，[`Client::route`] 返回 `false`；
//! - 取消幂等：只有第一次取消仍在途的调用返回 `true`；
//! - 回调与传输发送都在待决调用表的锁之外执行。
//!
//! ## 非目标（Trade-offs）
//! - 不包含服务端分发路径、网络传输实现与 schema 代码生成。

/// 通道表与出站发送原语。
pub mod channel;

/// 载荷编解码接缝。
pub mod codec;

/// 客户端配置。
pub mod config;

/// 调用入口错误。
pub mod error;

/// 服务与方法标识派生。
pub mod ids;

/// 方法描述符与调用类型。
pub mod method;

/// 报文信封与线上编解码。
pub mod packet;

/// 方法注册表。
pub mod registry;

/// TOML 形式的服务描述。
pub mod schema;

/// RPC 状态码。
pub mod status;

pub mod blocking;
pub mod call;
pub mod client;
pub mod pending;
pub mod stub;

mod invoker;

pub use blocking::{BlockingCall, StreamResponse, UnaryResponse};
pub use call::{CallSink, CallState, Callback, CallbackSink, callback};
pub use channel::{Channel, ChannelOutput, ChannelTable, SendError};
pub use client::{CallHandle, Client, RejectReason, RouteOutcome, WeakClient};
pub use codec::{CodecCatalog, DecodeError, EncodeError, Message, MessageCodec, RawBytesCodec};
pub use config::ClientConfig;
pub use error::RpcError;
pub use method::{CallKind, MethodDescriptor};
pub use packet::{Packet, PacketType};
pub use registry::MethodRegistry;
pub use status::Status;
pub use stub::{ChannelClient, MethodStub};
