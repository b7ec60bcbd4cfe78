//! # codec 模块说明
//!
//! ## 角色定位（Why）
//! - 请求与响应载荷的编解码由外部 schema 驱动的编解码器承担，分发器只依赖本模块定义的接缝；
//! - 方法注册表需要在同一张表中存放类型各异的方法，因此需要“泛型契约 + 对象安全契约”两层抽象。
//!
//! ## 结构（How）
//! - [`MessageCodec`]：泛型层，面向编解码器实现者，关联类型给出具体消息类型；
//! - [`DynMessageCodec`]：对象层，以 `dyn Any` 擦除消息类型，供注册表与分发器持有；
//! - [`TypedMessageCodec`]：泛型 → 对象的适配器，编码时做类型下转型，失败返回
//!   [`EncodeError::TypeMismatch`]；
//! - [`CodecCatalog`]：消息类型名 → 编解码器，供 schema 装载时按名称绑定。
//!
//! ## 风险提示（Trade-offs）
//! - 对象层每次解码都会产生一次 `Box` 分配，换取注册表的同质存储；
//! - 类型不匹配只能在运行期发现，调用方应优先使用 [`MethodStub`](crate::stub::MethodStub) 的泛型入口。

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

/// 类型擦除后的消息对象。
pub type Message = Box<dyn Any + Send>;

/// 载荷编码失败。
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum EncodeError {
    /// 传入的消息类型与编解码器声明的类型不一致。
    #[error("expected message of type `{expected}`")]
    TypeMismatch { expected: &'static str },
    /// 消息内容无法编码，例如字段越界。
    #[error("message cannot be encoded: {0}")]
    Invalid(String),
}

/// 载荷解码失败。
///
/// 在调用状态机中被容忍：调用仍以报文携带的状态完成，响应值为空。
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("failed to decode `{message_type}`: {detail}")]
pub struct DecodeError {
    pub message_type: String,
    pub detail: String,
}

impl DecodeError {
    /// 以消息类型名与原因构造解码错误。
    pub fn new(message_type: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            detail: detail.into(),
        }
    }
}

/// 泛型消息编解码契约。
///
/// # 教案式说明
/// - **意图 (Why)**：让编解码器实现者以强类型编写 `encode`/`decode`，无需关心类型擦除；
/// - **契约 (What)**：
///   - `type_name` 返回 schema 中的全限定消息名（如 `pw.test1.SomeMessage`），用于目录绑定与日志；
///   - `decode` 必须拒绝无法解释的字节，而不是返回部分填充的消息；
///   - 实现需 `Send + Sync + 'static`，以便在 `Arc` 中跨线程共享。
pub trait MessageCodec: Send + Sync + 'static {
    /// 编解码的消息类型。
    type Message: Send + 'static;

    /// schema 中的全限定消息名。
    fn type_name(&self) -> &str;

    /// 编码消息。
    fn encode(&self, message: &Self::Message) -> Result<Bytes, EncodeError>;

    /// 解码消息。
    fn decode(&self, bytes: &[u8]) -> Result<Self::Message, DecodeError>;
}

/// 对象安全的消息编解码契约。
pub trait DynMessageCodec: Send + Sync + 'static {
    /// schema 中的全限定消息名。
    fn type_name(&self) -> &str;

    /// 编码类型擦除的消息。
    fn encode_dyn(&self, message: &dyn Any) -> Result<Bytes, EncodeError>;

    /// 解码为类型擦除的消息。
    fn decode_dyn(&self, bytes: &[u8]) -> Result<Message, DecodeError>;
}

impl fmt::Debug for dyn DynMessageCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DynMessageCodec")
            .field(&self.type_name())
            .finish()
    }
}

/// 将 [`MessageCodec`] 适配为 [`DynMessageCodec`]。
#[derive(Clone, Debug, Default)]
pub struct TypedMessageCodec<C> {
    inner: C,
}

impl<C> TypedMessageCodec<C>
where
    C: MessageCodec,
{
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C> DynMessageCodec for TypedMessageCodec<C>
where
    C: MessageCodec,
{
    fn type_name(&self) -> &str {
        self.inner.type_name()
    }

    fn encode_dyn(&self, message: &dyn Any) -> Result<Bytes, EncodeError> {
        match message.downcast_ref::<C::Message>() {
            Some(typed) => self.inner.encode(typed),
            None => Err(EncodeError::TypeMismatch {
                expected: type_name::<C::Message>(),
            }),
        }
    }

    fn decode_dyn(&self, bytes: &[u8]) -> Result<Message, DecodeError> {
        self.inner
            .decode(bytes)
            .map(|message| Box::new(message) as Message)
    }
}

/// 将泛型编解码器擦除为可共享的对象。
pub fn erase<C>(codec: C) -> Arc<dyn DynMessageCodec>
where
    C: MessageCodec,
{
    Arc::new(TypedMessageCodec::new(codec))
}

/// 原样透传字节的编解码器，消息类型为 [`Bytes`]。
///
/// 适用于载荷由上层自行解释、或调试时只关心原始字节的方法。
#[derive(Clone, Debug)]
pub struct RawBytesCodec {
    type_name: String,
}

impl RawBytesCodec {
    /// 以 schema 消息名构造透传编解码器。
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
        }
    }
}

impl Default for RawBytesCodec {
    fn default() -> Self {
        Self::new("bytes")
    }
}

impl MessageCodec for RawBytesCodec {
    type Message = Bytes;

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn encode(&self, message: &Bytes) -> Result<Bytes, EncodeError> {
        Ok(message.clone())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Bytes, DecodeError> {
        Ok(Bytes::copy_from_slice(bytes))
    }
}

/// 消息类型名到编解码器的目录。
///
/// # 教案式说明
/// - **意图 (Why)**：schema 描述只给出消息类型名，装载注册表时需要按名称找到具体编解码器；
/// - **契约 (What)**：同名注册以最后一次为准；查询未命中返回 `None`，由注册表构造报告
///   [`RegistryError::MissingCodec`](crate::registry::RegistryError::MissingCodec)。
#[derive(Clone, Default)]
pub struct CodecCatalog {
    codecs: HashMap<String, Arc<dyn DynMessageCodec>>,
}

impl CodecCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以编解码器自身的 `type_name` 注册。
    pub fn register<C>(&mut self, codec: C) -> &mut Self
    where
        C: MessageCodec,
    {
        let codec = erase(codec);
        self.codecs.insert(codec.type_name().to_owned(), codec);
        self
    }

    /// 以指定名称注册已擦除的编解码器，可用于为多个消息名复用同一实现。
    pub fn register_dyn(
        &mut self,
        type_name: impl Into<String>,
        codec: Arc<dyn DynMessageCodec>,
    ) -> &mut Self {
        self.codecs.insert(type_name.into(), codec);
        self
    }

    /// 按消息类型名查询。
    pub fn get(&self, type_name: &str) -> Option<Arc<dyn DynMessageCodec>> {
        self.codecs.get(type_name).cloned()
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }
}

impl fmt::Debug for CodecCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.codecs.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("CodecCatalog")
            .field("types", &names)
            .finish()
    }
}
