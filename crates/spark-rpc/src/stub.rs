//! 按名称定位方法的强类型调用桩。
//!
//! ```ignore
//! let stub = client.channel(1)?.method("pw.test1.PublicService.SomeUnary")?;
//! let reply = stub.call::<SomeMessage, AnotherMessage>(&SomeMessage { magic_number: 6 })?;
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::blocking::{StreamResponse, UnaryResponse, downcast_message, ensure_kind};
use crate::call::{Callback, callback};
use crate::client::{CallHandle, Client};
use crate::error::RpcError;
use crate::method::MethodDescriptor;
use crate::status::Status;

/// 绑定到单个通道的客户端视图。
#[derive(Clone, Debug)]
pub struct ChannelClient {
    client: Client,
    channel_id: u32,
}

impl Client {
    /// 取得通道视图；通道未绑定时返回 [`RpcError::UnknownChannel`]。
    pub fn channel(&self, channel_id: u32) -> Result<ChannelClient, RpcError> {
        if !self.channels().contains(channel_id) {
            return Err(RpcError::UnknownChannel(channel_id));
        }
        Ok(ChannelClient {
            client: self.clone(),
            channel_id,
        })
    }
}

impl ChannelClient {
    pub fn id(&self) -> u32 {
        self.channel_id
    }

    /// 按全限定名取得方法桩，接受 `pkg.Service.Method` 与 `pkg.Service/Method`。
    pub fn method(&self, qualified_name: &str) -> Result<MethodStub, RpcError> {
        let method = self
            .client
            .registry()
            .lookup_by_name(qualified_name)
            .ok_or_else(|| RpcError::UnknownMethodName(qualified_name.to_owned()))?;
        Ok(MethodStub {
            client: self.client.clone(),
            channel_id: self.channel_id,
            method,
        })
    }
}

/// 某通道上某方法的调用桩。
///
/// # 教案式说明
/// - **意图 (Why)**：以强类型请求/响应包装类型擦除的调用入口，调用方不再手写下转型；
/// - **契约 (What)**：
///   - `Req` 必须与方法请求编解码器的消息类型一致，否则返回 [`RpcError::Encode`]；
///   - 响应类型不符时，该响应按“无响应”处理并记录 `warn` 日志；
///   - 桩本身无状态，可自由克隆，同一方法的并发调用仍受“至多一个在途调用”约束。
#[derive(Clone)]
pub struct MethodStub {
    client: Client,
    channel_id: u32,
    method: Arc<MethodDescriptor>,
}

impl MethodStub {
    pub fn method(&self) -> &Arc<MethodDescriptor> {
        &self.method
    }

    pub fn channel_id(&self) -> u32 {
        self.channel_id
    }

    /// 以类型擦除的回调发起调用。
    pub fn invoke(
        &self,
        request: &dyn Any,
        callback: Option<Callback>,
    ) -> Result<CallHandle, RpcError> {
        self.client.invoke(
            self.channel_id,
            self.method.service_id(),
            self.method.method_id(),
            request,
            callback,
        )
    }

    /// 以强类型回调发起调用。
    pub fn invoke_with_callback<Req, Resp, F>(
        &self,
        request: &Req,
        mut on_next: F,
    ) -> Result<CallHandle, RpcError>
    where
        Req: Any,
        Resp: 'static,
        F: FnMut(Option<Status>, Option<Resp>) + Send + 'static,
    {
        let typed = callback(move |status, response| {
            on_next(status, response.and_then(downcast_message::<Resp>));
        });
        self.invoke(request, Some(typed))
    }

    /// 发起单次调用并阻塞等待响应。
    pub fn call<Req, Resp>(&self, request: &Req) -> Result<UnaryResponse<Resp>, RpcError>
    where
        Req: Any,
        Resp: 'static,
    {
        ensure_kind(&self.method, false, "blocking unary calls")?;
        let response = self
            .client
            .start_blocking(self.channel_id, self.method.clone(), request)?
            .wait_unary()?;
        Ok(response.downcast())
    }

    /// 发起流式调用并阻塞收集全部响应。
    pub fn call_stream<Req, Resp>(&self, request: &Req) -> Result<StreamResponse<Resp>, RpcError>
    where
        Req: Any,
        Resp: 'static,
    {
        ensure_kind(&self.method, true, "blocking stream collection")?;
        let response = self
            .client
            .start_blocking(self.channel_id, self.method.clone(), request)?
            .wait_stream()?;
        Ok(response.downcast())
    }
}

impl fmt::Debug for MethodStub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodStub")
            .field("channel_id", &self.channel_id)
            .field("method", &self.method.qualified_name())
            .finish()
    }
}
