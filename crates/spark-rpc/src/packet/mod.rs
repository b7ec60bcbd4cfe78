//! # packet 模块说明
//!
//! ## 角色定位（Why）
//! - 定义 RPC 报文信封：身份三元组（通道、服务、方法）、报文类型、状态码与不透明载荷；
//! - 提供信封级编解码，供 [`Client`](crate::client::Client) 在发送与路由两侧复用。
//!
//! ## 线上格式（What）
//! 信封与 protobuf 线格式兼容，字段编号固定：
//!
//! | 字段 | 编号 | 线类型 |
//! |---|---|---|
//! | `type` | 1 | varint |
//! | `channel_id` | 2 | varint |
//! | `service_id` | 3 | fixed32 |
//! | `method_id` | 4 | fixed32 |
//! | `payload` | 5 | length-delimited |
//! | `status` | 6 | varint |
//!
//! - 缺省字段取零值：类型缺省为 [`PacketType::Request`]，状态缺省为 [`Status::Ok`]；
//! - 线类型合法的未知字段被跳过，以兼容对端新增字段；
//! - 信封解码失败与载荷解码失败是两类错误：前者在路由入口即丢弃报文，后者由调用状态机容忍。
//!
//! ## 风险提示（Trade-offs）
//! - 解码时载荷通过 `Bytes::copy_from_slice` 复制一次，换取报文对象与入站缓冲区生命周期解耦。

pub mod varint;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::status::Status;

use self::varint::{VarintError, decode_varint, encode_varint, varint_size};

/// 信封头部（不含载荷）在最坏情况下占用的字节数上界。
///
/// 由六个字段键、两个 `fixed32`、三个最长 5 字节的 varint 以及载荷长度前缀组成。
pub const ENVELOPE_OVERHEAD: usize = 32;

const FIELD_TYPE: u64 = 1;
const FIELD_CHANNEL_ID: u64 = 2;
const FIELD_SERVICE_ID: u64 = 3;
const FIELD_METHOD_ID: u64 = 4;
const FIELD_PAYLOAD: u64 = 5;
const FIELD_STATUS: u64 = 6;

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LENGTH_DELIMITED: u8 = 2;
const WIRE_FIXED32: u8 = 5;

/// 报文类型标签。
///
/// # 教案式说明
/// - **意图 (Why)**：区分客户端发往服务端（请求、客户端流分片、取消）与服务端发往客户端
///   （响应、流结束、错误）的报文，驱动调用状态机；
/// - **契约 (What)**：判别值即线上编码值；未知数值在解码阶段被拒绝。
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum PacketType {
    /// 发起一次方法调用。
    #[default]
    Request = 0,
    /// 单次响应或服务端流中的一个元素。
    Response = 1,
    /// 客户端流中的一个分片。
    ClientStreamChunk = 2,
    /// 流式调用的终止报文，携带终态状态码。
    StreamCompletion = 3,
    /// 客户端请求对端放弃流式调用。
    Cancel = 4,
    /// 对端报告调用失败，携带终态状态码。
    Error = 5,
}

impl PacketType {
    /// 由线上编码值还原报文类型。
    pub fn from_wire(value: u64) -> Option<Self> {
        match value {
            0 => Some(PacketType::Request),
            1 => Some(PacketType::Response),
            2 => Some(PacketType::ClientStreamChunk),
            3 => Some(PacketType::StreamCompletion),
            4 => Some(PacketType::Cancel),
            5 => Some(PacketType::Error),
            _ => None,
        }
    }

    /// 是否为客户端发往服务端的报文类型。
    pub fn is_client_to_server(self) -> bool {
        matches!(
            self,
            PacketType::Request | PacketType::ClientStreamChunk | PacketType::Cancel
        )
    }
}

/// 信封解码失败的原因。
///
/// 所有变体都意味着报文本身不可信，路由层直接丢弃并返回 `false`。
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum PacketError {
    /// 字段键或整数值的变长编码损坏。
    #[error("malformed varint at offset {offset}: {source}")]
    Varint {
        offset: usize,
        #[source]
        source: VarintError,
    },
    /// 定长字段或长度前缀声明的数据超出缓冲区。
    #[error("field {field} truncated at offset {offset}")]
    Truncated { field: u64, offset: usize },
    /// 字段编号为 0 或超出合法范围。
    #[error("invalid field number {field} at offset {offset}")]
    InvalidField { field: u64, offset: usize },
    /// 已知字段使用了不匹配的线类型。
    #[error("field {field} encoded with wire type {wire_type}, expected {expected}")]
    WireTypeMismatch {
        field: u64,
        wire_type: u8,
        expected: u8,
    },
    /// 不支持的线类型（例如已废弃的 group）。
    #[error("unsupported wire type {wire_type} for field {field}")]
    UnsupportedWireType { field: u64, wire_type: u8 },
    /// 报文类型数值未登记。
    #[error("unknown packet type {0}")]
    UnknownPacketType(u64),
    /// 状态码数值未登记。
    #[error("unknown status code {0}")]
    UnknownStatus(u64),
    /// 整数字段超出 `u32` 范围。
    #[error("field {field} value {value} does not fit in 32 bits")]
    ValueOutOfRange { field: u64, value: u64 },
}

/// RPC 报文。
///
/// # 教案式说明
/// - **意图 (Why)**：作为线上传输的最小单元，承载身份三元组与不透明载荷；
/// - **契约 (What)**：
///   - 身份三元组只有在通道已绑定、方法已注册时才有意义，否则路由层判定为不可路由；
///   - `status` 仅在终态报文（响应、流结束、错误）上有意义，其余类型保持 [`Status::Ok`]；
///   - `payload` 为已编码的消息字节，由方法描述符中的编解码器解释。
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Packet {
    pub packet_type: PacketType,
    pub channel_id: u32,
    pub service_id: u32,
    pub method_id: u32,
    pub status: Status,
    pub payload: Bytes,
}

impl Packet {
    /// 构造任意类型的报文，状态码缺省为 [`Status::Ok`]。
    pub fn new(
        packet_type: PacketType,
        channel_id: u32,
        service_id: u32,
        method_id: u32,
        payload: Bytes,
    ) -> Self {
        Self {
            packet_type,
            channel_id,
            service_id,
            method_id,
            status: Status::Ok,
            payload,
        }
    }

    /// 设置终态状态码。
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// 报文身份三元组 `(channel_id, service_id, method_id)`。
    pub fn identity(&self) -> (u32, u32, u32) {
        (self.channel_id, self.service_id, self.method_id)
    }

    /// 编码后的字节数。
    pub fn encoded_len(&self) -> usize {
        let mut len = 1 + varint_size(self.packet_type as u64);
        len += 1 + varint_size(u64::from(self.channel_id));
        len += 2 * (1 + 4);
        if !self.payload.is_empty() {
            len += 1 + varint_size(self.payload.len() as u64) + self.payload.len();
        }
        if !self.status.is_ok() {
            len += 1 + varint_size(u64::from(self.status.code()));
        }
        len
    }

    /// 将报文编码为信封字节。
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_to(&mut buf);
        buf.freeze()
    }

    /// 将报文追加编码到任意缓冲区。
    pub fn encode_to(&self, buf: &mut impl BufMut) {
        put_key(FIELD_TYPE, WIRE_VARINT, buf);
        encode_varint(self.packet_type as u64, buf);
        put_key(FIELD_CHANNEL_ID, WIRE_VARINT, buf);
        encode_varint(u64::from(self.channel_id), buf);
        put_key(FIELD_SERVICE_ID, WIRE_FIXED32, buf);
        buf.put_u32_le(self.service_id);
        put_key(FIELD_METHOD_ID, WIRE_FIXED32, buf);
        buf.put_u32_le(self.method_id);
        if !self.payload.is_empty() {
            put_key(FIELD_PAYLOAD, WIRE_LENGTH_DELIMITED, buf);
            encode_varint(self.payload.len() as u64, buf);
            buf.put_slice(&self.payload);
        }
        if !self.status.is_ok() {
            put_key(FIELD_STATUS, WIRE_VARINT, buf);
            encode_varint(u64::from(self.status.code()), buf);
        }
    }

    /// 从信封字节解码报文。
    ///
    /// # 执行逻辑（How）
    /// 1. 循环读取字段键，拆分出字段编号与线类型；
    /// 2. 已知字段校验线类型后写入对应成员，重复出现时以最后一次为准；
    /// 3. 未知字段按线类型跳过；`group` 等不支持的线类型直接报错。
    pub fn decode(bytes: &[u8]) -> Result<Self, PacketError> {
        let mut packet = Packet::default();
        let mut cursor = bytes;

        while !cursor.is_empty() {
            let offset = bytes.len() - cursor.len();
            let key = decode_varint(&mut cursor)
                .map_err(|source| PacketError::Varint { offset, source })?;
            let field = key >> 3;
            let wire_type = (key & 0x07) as u8;
            if field == 0 || field > u64::from(u32::MAX >> 3) {
                return Err(PacketError::InvalidField { field, offset });
            }

            match field {
                FIELD_TYPE => {
                    let value = read_varint_field(bytes, &mut cursor, field, wire_type)?;
                    packet.packet_type =
                        PacketType::from_wire(value).ok_or(PacketError::UnknownPacketType(value))?;
                }
                FIELD_CHANNEL_ID => {
                    let value = read_varint_field(bytes, &mut cursor, field, wire_type)?;
                    packet.channel_id = u32::try_from(value)
                        .map_err(|_| PacketError::ValueOutOfRange { field, value })?;
                }
                FIELD_SERVICE_ID => {
                    expect_wire_type(field, wire_type, WIRE_FIXED32)?;
                    packet.service_id = read_fixed32(bytes, &mut cursor, field)?;
                }
                FIELD_METHOD_ID => {
                    expect_wire_type(field, wire_type, WIRE_FIXED32)?;
                    packet.method_id = read_fixed32(bytes, &mut cursor, field)?;
                }
                FIELD_PAYLOAD => {
                    expect_wire_type(field, wire_type, WIRE_LENGTH_DELIMITED)?;
                    let payload = read_length_delimited(bytes, &mut cursor, field)?;
                    packet.payload = Bytes::copy_from_slice(payload);
                }
                FIELD_STATUS => {
                    let value = read_varint_field(bytes, &mut cursor, field, wire_type)?;
                    packet.status = u32::try_from(value)
                        .ok()
                        .and_then(Status::from_code)
                        .ok_or(PacketError::UnknownStatus(value))?;
                }
                _ => skip_field(bytes, &mut cursor, field, wire_type)?,
            }
        }

        Ok(packet)
    }
}

fn put_key(field: u64, wire_type: u8, buf: &mut impl BufMut) {
    encode_varint((field << 3) | u64::from(wire_type), buf);
}

fn expect_wire_type(field: u64, wire_type: u8, expected: u8) -> Result<(), PacketError> {
    if wire_type == expected {
        Ok(())
    } else {
        Err(PacketError::WireTypeMismatch {
            field,
            wire_type,
            expected,
        })
    }
}

fn read_varint_field(
    bytes: &[u8],
    cursor: &mut &[u8],
    field: u64,
    wire_type: u8,
) -> Result<u64, PacketError> {
    expect_wire_type(field, wire_type, WIRE_VARINT)?;
    let offset = bytes.len() - cursor.len();
    decode_varint(cursor).map_err(|source| PacketError::Varint { offset, source })
}

fn read_fixed32(bytes: &[u8], cursor: &mut &[u8], field: u64) -> Result<u32, PacketError> {
    let raw = take(bytes, cursor, field, 4)?;
    let mut word = [0u8; 4];
    word.copy_from_slice(raw);
    Ok(u32::from_le_bytes(word))
}

fn read_length_delimited<'a>(
    bytes: &[u8],
    cursor: &mut &'a [u8],
    field: u64,
) -> Result<&'a [u8], PacketError> {
    let offset = bytes.len() - cursor.len();
    let len = decode_varint(cursor).map_err(|source| PacketError::Varint { offset, source })?;
    let len = usize::try_from(len).map_err(|_| PacketError::Truncated { field, offset })?;
    take(bytes, cursor, field, len)
}

fn take<'a>(
    bytes: &[u8],
    cursor: &mut &'a [u8],
    field: u64,
    len: usize,
) -> Result<&'a [u8], PacketError> {
    if cursor.len() < len {
        return Err(PacketError::Truncated {
            field,
            offset: bytes.len() - cursor.len(),
        });
    }
    let (head, tail) = cursor.split_at(len);
    *cursor = tail;
    Ok(head)
}

fn skip_field(
    bytes: &[u8],
    cursor: &mut &[u8],
    field: u64,
    wire_type: u8,
) -> Result<(), PacketError> {
    match wire_type {
        WIRE_VARINT => {
            let offset = bytes.len() - cursor.len();
            decode_varint(cursor).map_err(|source| PacketError::Varint { offset, source })?;
        }
        WIRE_FIXED64 => {
            take(bytes, cursor, field, 8)?;
        }
        WIRE_LENGTH_DELIMITED => {
            read_length_delimited(bytes, cursor, field)?;
        }
        WIRE_FIXED32 => {
            take(bytes, cursor, field, 4)?;
        }
        _ => return Err(PacketError::UnsupportedWireType { field, wire_type }),
    }
    Ok(())
}
