//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义调用入口同步返回给调用方的错误；入站报文的问题不会以错误形式出现，
//!   而是由路由结果 [`RouteOutcome`](crate::client::RouteOutcome) 与日志事件表达；
//! - 区分“编程错误”（重复调用、未知方法、错误的调用类型）与“运行期错误”（发送失败、取消），
//!   方便上层决定是立即暴露还是重试。
//!
//! ## 设计要求（What）
//! - 所有变体派生 `thiserror::Error`，携带通道 ID 与方法全名等排障上下文；
//! - 分发器在本层不会产生致命错误：所有情况要么同步返回给调用方，要么记录日志后吸收。

use thiserror::Error;

use crate::channel::SendError;
use crate::codec::EncodeError;
use crate::method::CallKind;

/// 调用入口错误。
#[derive(Debug, Error)]
pub enum RpcError {
    /// 同一通道上的同一方法已有待决调用。
    ///
    /// - **意图 (Why)**：每个 `(通道, 服务, 方法)` 至多一个在途调用，第二次调用不会排队；
    /// - **契约 (What)**：返回本错误时未登记任何调用、未发送任何报文。
    #[error("a call to `{method}` is already pending on channel {channel_id}")]
    AlreadyPending { channel_id: u32, method: String },

    /// 通道未绑定。
    #[error("channel {0} is not bound to this client")]
    UnknownChannel(u32),

    /// `(service_id, method_id)` 未在注册表中登记。
    #[error("method ({service_id:#010x}, {method_id:#010x}) is not registered")]
    UnknownMethod { service_id: u32, method_id: u32 },

    /// 全限定名未在注册表中登记。
    #[error("method `{0}` is not registered")]
    UnknownMethodName(String),

    /// 请求载荷编码失败，未登记调用。
    #[error("failed to encode request for `{method}`: {source}")]
    Encode {
        method: String,
        #[source]
        source: EncodeError,
    },

    /// 编码后的报文超过配置上限，未登记调用。
    #[error("packet for `{method}` is {size} bytes, exceeding the {limit}-byte limit")]
    PacketTooLarge {
        method: String,
        size: usize,
        limit: usize,
    },

    /// 通道输出失败；请求报文失败时对应调用已被回滚。
    #[error("failed to send packet for `{method}` on channel {channel_id}: {source}")]
    Send {
        channel_id: u32,
        method: String,
        #[source]
        source: SendError,
    },

    /// 句柄指向的调用已完成、已取消或被同名新调用取代。
    #[error("the call to `{method}` is no longer pending")]
    CallNotPending { method: String },

    /// 调用类型不支持请求的操作，例如向单次调用发送客户端流分片。
    #[error("`{method}` is a {kind} method and does not support {operation}")]
    InvalidCallKind {
        method: String,
        kind: CallKind,
        operation: &'static str,
    },

    /// 阻塞等待期间调用被取消。
    #[error("the call to `{method}` was cancelled")]
    Cancelled { method: String },

    /// 句柄对应的客户端已被释放。
    #[error("the client owning this call has been dropped")]
    ClientDropped,
}

impl RpcError {
    /// 是否属于调用方的编程错误，而非运行期故障。
    pub fn is_programming_error(&self) -> bool {
        match self {
            RpcError::AlreadyPending { .. }
            | RpcError::UnknownChannel(_)
            | RpcError::UnknownMethod { .. }
            | RpcError::UnknownMethodName(_)
            | RpcError::InvalidCallKind { .. } => true,
            RpcError::Encode { source, .. } => matches!(source, EncodeError::TypeMismatch { .. }),
            _ => false,
        }
    }
}
