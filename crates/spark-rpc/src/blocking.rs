//! # blocking 模块说明
//!
//! ## 角色定位（Why）
//! - 为不需要回调的调用方提供阻塞式入口：发起调用后在当前线程等待终态；
//! - 底层仍是普通调用，只是接收端换成 [`Collector`]，由路由线程写入结果并唤醒等待方。
//!
//! ## 契约（What）
//! - 单次调用返回 [`UnaryResponse`]，流式调用返回按到达顺序收集的 [`StreamResponse`]；
//! - 调用被取消（包括客户端被释放）时，等待方以 [`RpcError::Cancelled`] 返回；
//! - 流元素载荷解码失败时该元素不进入集合，只记录日志；
//! - 本层不设超时，需要超时的调用方应在其他线程持有 [`CallHandle`] 并在到期时取消。
//!
//! ## 风险提示（Trade-offs）
//! - 在同步传输上调用阻塞入口时，响应可能在 `send` 返回前就已写入收集器，`wait` 会立即返回；
//! - 若在路由线程上阻塞等待，调用永远不会完成，这属于调用方的使用错误。

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::call::CallSink;
use crate::client::{CallHandle, Client};
use crate::codec::Message;
use crate::error::RpcError;
use crate::method::MethodDescriptor;
use crate::status::Status;

/// 单次调用的结果。
pub struct UnaryResponse<T = Message> {
    pub status: Status,
    /// 载荷解码失败时为 `None`。
    pub response: Option<T>,
}

impl UnaryResponse {
    /// 将响应下转型为具体消息类型；类型不符时响应为 `None`。
    pub fn downcast<T: 'static>(self) -> UnaryResponse<T> {
        UnaryResponse {
            status: self.status,
            response: self.response.and_then(downcast_message::<T>),
        }
    }
}

impl<T> fmt::Debug for UnaryResponse<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnaryResponse")
            .field("status", &self.status)
            .field("has_response", &self.response.is_some())
            .finish()
    }
}

/// 流式调用的结果。
pub struct StreamResponse<T = Message> {
    pub status: Status,
    pub responses: Vec<T>,
}

impl StreamResponse {
    /// 将流元素下转型为具体消息类型；类型不符的元素被丢弃。
    pub fn downcast<T: 'static>(self) -> StreamResponse<T> {
        StreamResponse {
            status: self.status,
            responses: self
                .responses
                .into_iter()
                .filter_map(downcast_message::<T>)
                .collect(),
        }
    }
}

impl<T> fmt::Debug for StreamResponse<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamResponse")
            .field("status", &self.status)
            .field("responses", &self.responses.len())
            .finish()
    }
}

pub(crate) fn downcast_message<T: 'static>(message: Message) -> Option<T> {
    match message.downcast::<T>() {
        Ok(typed) => Some(*typed),
        Err(_) => {
            tracing::warn!(
                expected = std::any::type_name::<T>(),
                "RPC response has an unexpected message type; dropped",
            );
            None
        }
    }
}

#[derive(Default)]
struct Collected {
    responses: Vec<Message>,
    terminal: Option<(Status, Option<Message>)>,
    cancelled: bool,
}

/// 阻塞式调用的结果收集器。
#[derive(Default)]
pub(crate) struct Collector {
    state: Mutex<Collected>,
    ready: Condvar,
}

impl CallSink for Collector {
    fn on_next(&self, status: Option<Status>, response: Option<Message>) {
        let mut state = self.state.lock();
        match status {
            None => match response {
                Some(message) => state.responses.push(message),
                None => tracing::debug!("undecodable RPC stream item omitted from blocking result"),
            },
            Some(status) => {
                state.terminal = Some((status, response));
                self.ready.notify_all();
            }
        }
    }

    fn on_cancelled(&self) {
        self.state.lock().cancelled = true;
        self.ready.notify_all();
    }
}

/// 已发起、尚未等待的阻塞式调用。
pub struct BlockingCall {
    handle: CallHandle,
    collector: Arc<Collector>,
}

impl BlockingCall {
    pub fn handle(&self) -> &CallHandle {
        &self.handle
    }

    /// 阻塞直到调用终止或被取消，返回终态状态码、终态响应与流元素。
    pub fn wait(self) -> Result<(Status, Option<Message>, Vec<Message>), RpcError> {
        let mut state = self.collector.state.lock();
        loop {
            if let Some((status, response)) = state.terminal.take() {
                let responses = std::mem::take(&mut state.responses);
                return Ok((status, response, responses));
            }
            if state.cancelled {
                return Err(RpcError::Cancelled {
                    method: self.handle.method().qualified_name().to_owned(),
                });
            }
            self.collector.ready.wait(&mut state);
        }
    }

    /// 等待并只保留终态响应。
    pub fn wait_unary(self) -> Result<UnaryResponse, RpcError> {
        let (status, response, _) = self.wait()?;
        Ok(UnaryResponse { status, response })
    }

    /// 等待并只保留流元素。
    pub fn wait_stream(self) -> Result<StreamResponse, RpcError> {
        let (status, _, responses) = self.wait()?;
        Ok(StreamResponse { status, responses })
    }
}

impl fmt::Debug for BlockingCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingCall")
            .field("handle", &self.handle)
            .finish()
    }
}

impl Client {
    /// 以收集器作为接收端发起调用，稍后通过 [`BlockingCall::wait`] 取得结果。
    pub fn invoke_blocking(
        &self,
        channel_id: u32,
        service_id: u32,
        method_id: u32,
        request: &dyn Any,
    ) -> Result<BlockingCall, RpcError> {
        let method = self.lookup_method(service_id, method_id)?;
        self.start_blocking(channel_id, method, request)
    }

    pub(crate) fn start_blocking(
        &self,
        channel_id: u32,
        method: Arc<MethodDescriptor>,
        request: &dyn Any,
    ) -> Result<BlockingCall, RpcError> {
        let collector = Arc::new(Collector::default());
        let handle = self.start_call(channel_id, method, request, collector.clone())?;
        Ok(BlockingCall { handle, collector })
    }

    /// 发起单次调用并阻塞等待响应。
    pub fn call_unary(
        &self,
        channel_id: u32,
        service_id: u32,
        method_id: u32,
        request: &dyn Any,
    ) -> Result<UnaryResponse, RpcError> {
        let method = self.lookup_method(service_id, method_id)?;
        ensure_kind(&method, false, "blocking unary calls")?;
        self.start_blocking(channel_id, method, request)?.wait_unary()
    }

    /// 发起流式调用并阻塞收集全部响应直到流结束。
    pub fn call_server_stream(
        &self,
        channel_id: u32,
        service_id: u32,
        method_id: u32,
        request: &dyn Any,
    ) -> Result<StreamResponse, RpcError> {
        let method = self.lookup_method(service_id, method_id)?;
        ensure_kind(&method, true, "blocking stream collection")?;
        self.start_blocking(channel_id, method, request)?.wait_stream()
    }
}

/// 阻塞式入口只接受与之匹配的调用类型。
pub(crate) fn ensure_kind(
    method: &MethodDescriptor,
    streaming: bool,
    operation: &'static str,
) -> Result<(), RpcError> {
    if method.kind().is_streaming() == streaming {
        return Ok(());
    }
    Err(RpcError::InvalidCallKind {
        method: method.qualified_name().to_owned(),
        kind: method.kind(),
        operation,
    })
}
