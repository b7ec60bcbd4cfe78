//! 客户端配置。
//!
//! 配置以 TOML 文本提供，缺省键回落到 [`ClientConfig::default`]：
//!
//! ```toml
//! max_packet_bytes = 1024
//! report_stale_packets = true
//! ```

use serde::Deserialize;
use thiserror::Error;

use crate::packet::ENVELOPE_OVERHEAD;

/// 缺省的最大报文长度。
pub const DEFAULT_MAX_PACKET_BYTES: usize = 1024;

/// 配置装载失败。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("client configuration is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid client configuration: {0}")]
    Invalid(String),
}

/// 分发器的运行参数。
///
/// # 教案式说明
/// - **意图 (Why)**：把报文长度上限等部署相关的参数从代码中剥离，便于不同链路（串口、共享内存、
///   网络）按自身 MTU 调整；
/// - **契约 (What)**：
///   - `max_packet_bytes`：出站报文超过该长度时调用入口返回
///     [`RpcError::PacketTooLarge`](crate::error::RpcError::PacketTooLarge)，入站报文超过该长度时按信封
///     解码失败丢弃；不得小于信封头部上界 [`ENVELOPE_OVERHEAD`]；
///   - `report_stale_packets`：是否为“身份合法但无待决调用”的报文输出 `debug` 事件。
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub max_packet_bytes: usize,
    pub report_stale_packets: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_packet_bytes: DEFAULT_MAX_PACKET_BYTES,
            report_stale_packets: true,
        }
    }
}

impl ClientConfig {
    /// 从 TOML 文本解析并校验配置。
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 校验取值范围。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_packet_bytes < ENVELOPE_OVERHEAD {
            return Err(ConfigError::Invalid(format!(
                "max_packet_bytes must be at least {ENVELOPE_OVERHEAD}, got {}",
                self.max_packet_bytes
            )));
        }
        Ok(())
    }

    pub fn with_max_packet_bytes(mut self, max_packet_bytes: usize) -> Self {
        self.max_packet_bytes = max_packet_bytes;
        self
    }
}
