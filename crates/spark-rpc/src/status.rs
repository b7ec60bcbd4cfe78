//! # status 模块说明
//!
//! ## 角色定位（Why）
//! - RPC 报文在终态（单次响应、流结束、错误）上携带一个状态码，调用方据此判断调用结果；
//! - 状态码集合与对端框架保持一致（17 个规范码），保证跨语言实现之间的数值 round-trip。
//!
//! ## 契约（What）
//! - [`Status::code`] 与 [`Status::from_code`] 互为逆映射；
//! - 未登记的数值返回 `None`，由报文解码层按协议错误处理，而不是静默折算为 `Unknown`。

use core::fmt;

/// RPC 终态状态码。
///
/// # 教案式说明
/// - **意图 (Why)**：以强类型枚举替代裸 `u32`，避免调用方把任意整数当作合法状态传播；
/// - **契约 (What)**：判别值即线上编码值，`#[repr(u32)]` 保证 `as u32` 转换稳定；
/// - **风险 (Trade-offs)**：若对端新增状态码，本端会把对应报文视为信封解码失败，需要同步升级。
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[repr(u32)]
pub enum Status {
    /// 调用成功完成。
    #[default]
    Ok = 0,
    /// 调用被取消。
    Cancelled = 1,
    /// 未知错误。
    Unknown = 2,
    /// 参数非法。
    InvalidArgument = 3,
    /// 截止时间已过。
    DeadlineExceeded = 4,
    /// 目标不存在。
    NotFound = 5,
    /// 目标已存在。
    AlreadyExists = 6,
    /// 权限不足。
    PermissionDenied = 7,
    /// 资源耗尽。
    ResourceExhausted = 8,
    /// 前置条件不满足。
    FailedPrecondition = 9,
    /// 调用被中止。
    Aborted = 10,
    /// 超出合法范围。
    OutOfRange = 11,
    /// 对端未实现。
    Unimplemented = 12,
    /// 对端内部错误。
    Internal = 13,
    /// 服务暂不可用。
    Unavailable = 14,
    /// 数据丢失。
    DataLoss = 15,
    /// 未认证。
    Unauthenticated = 16,
}

impl Status {
    const ALL: [Status; 17] = [
        Status::Ok,
        Status::Cancelled,
        Status::Unknown,
        Status::InvalidArgument,
        Status::DeadlineExceeded,
        Status::NotFound,
        Status::AlreadyExists,
        Status::PermissionDenied,
        Status::ResourceExhausted,
        Status::FailedPrecondition,
        Status::Aborted,
        Status::OutOfRange,
        Status::Unimplemented,
        Status::Internal,
        Status::Unavailable,
        Status::DataLoss,
        Status::Unauthenticated,
    ];

    /// 线上编码值。
    pub fn code(self) -> u32 {
        self as u32
    }

    /// 由线上编码值还原状态码；未登记的数值返回 `None`。
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// 是否为成功状态。
    pub fn is_ok(self) -> bool {
        matches!(self, Status::Ok)
    }

    /// 规范化的大写名称，用于日志字段。
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Cancelled => "CANCELLED",
            Status::Unknown => "UNKNOWN",
            Status::InvalidArgument => "INVALID_ARGUMENT",
            Status::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Status::NotFound => "NOT_FOUND",
            Status::AlreadyExists => "ALREADY_EXISTS",
            Status::PermissionDenied => "PERMISSION_DENIED",
            Status::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Status::FailedPrecondition => "FAILED_PRECONDITION",
            Status::Aborted => "ABORTED",
            Status::OutOfRange => "OUT_OF_RANGE",
            Status::Unimplemented => "UNIMPLEMENTED",
            Status::Internal => "INTERNAL",
            Status::Unavailable => "UNAVAILABLE",
            Status::DataLoss => "DATA_LOSS",
            Status::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
