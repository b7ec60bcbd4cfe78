//! 方法描述符与调用类型。

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::codec::DynMessageCodec;
use crate::ids;

/// 调用类型，决定请求与响应报文的数量。
///
/// # 教案式说明
/// - **意图 (Why)**：调用状态机依据调用类型决定收到响应后是否终止、取消时是否通知对端；
/// - **契约 (What)**：schema 中以 snake_case 书写（`unary`、`server_streaming`、
///   `client_streaming`、`bidirectional_streaming`）。
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    /// 单请求、单响应。
    Unary,
    /// 单请求、响应流。
    ServerStreaming,
    /// 请求流、单响应。
    ClientStreaming,
    /// 请求流、响应流。
    BidirectionalStreaming,
}

impl CallKind {
    /// 是否为任意形式的流式调用。
    ///
    /// 流式调用在取消时需要向对端发送 CANCEL 报文；单次调用只做本地移除。
    pub fn is_streaming(self) -> bool {
        !matches!(self, CallKind::Unary)
    }

    /// 调用方是否可以发送客户端流分片。
    pub fn has_client_stream(self) -> bool {
        matches!(
            self,
            CallKind::ClientStreaming | CallKind::BidirectionalStreaming
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallKind::Unary => "unary",
            CallKind::ServerStreaming => "server_streaming",
            CallKind::ClientStreaming => "client_streaming",
            CallKind::BidirectionalStreaming => "bidirectional_streaming",
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 不可变的方法描述符。
///
/// # 教案式说明
/// - **意图 (Why)**：集中描述一次调用所需的全部静态信息：身份、调用类型与载荷编解码器；
/// - **契约 (What)**：
///   - 在注册表构造时创建，此后只以 `Arc<MethodDescriptor>` 共享，永不修改；
///   - 服务 ID 与方法 ID 缺省由名称哈希得出（见 [`ids::calculate`]），可通过
///     [`with_ids`](Self::with_ids) 覆盖；
///   - `qualified_name` 形如 `pw.test1.PublicService.SomeUnary`。
#[derive(Clone, Debug)]
pub struct MethodDescriptor {
    service_id: u32,
    method_id: u32,
    service_name: String,
    name: String,
    qualified_name: String,
    kind: CallKind,
    request: Arc<dyn DynMessageCodec>,
    response: Arc<dyn DynMessageCodec>,
}

impl MethodDescriptor {
    /// 以服务全名与方法名构造描述符，标识由名称哈希派生。
    pub fn new(
        service_name: impl Into<String>,
        name: impl Into<String>,
        kind: CallKind,
        request: Arc<dyn DynMessageCodec>,
        response: Arc<dyn DynMessageCodec>,
    ) -> Self {
        let service_name = service_name.into();
        let name = name.into();
        Self {
            service_id: ids::calculate(&service_name),
            method_id: ids::calculate(&name),
            qualified_name: format!("{service_name}.{name}"),
            service_name,
            name,
            kind,
            request,
            response,
        }
    }

    /// 覆盖由名称派生的标识。
    pub fn with_ids(mut self, service_id: u32, method_id: u32) -> Self {
        self.service_id = service_id;
        self.method_id = method_id;
        self
    }

    pub fn service_id(&self) -> u32 {
        self.service_id
    }

    pub fn method_id(&self) -> u32 {
        self.method_id
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn kind(&self) -> CallKind {
        self.kind
    }

    pub fn request_codec(&self) -> &Arc<dyn DynMessageCodec> {
        &self.request
    }

    pub fn response_codec(&self) -> &Arc<dyn DynMessageCodec> {
        &self.response
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name)
    }
}
