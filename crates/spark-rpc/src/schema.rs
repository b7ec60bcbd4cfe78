//! # schema 模块说明
//!
//! ## 角色定位（Why）
//! - 方法注册表由外部 schema 描述一次性构建；本模块给出该描述的强类型形态，
//!   并负责从 TOML 文本解析；
//! - 描述只包含名称、调用类型与消息类型名，具体编解码器在装载时经
//!   [`CodecCatalog`](crate::codec::CodecCatalog) 绑定。
//!
//! ## 文本格式（What）
//! ```toml
//! [[services]]
//! name = "pw.test1.PublicService"
//!
//! [[services.methods]]
//! name = "SomeUnary"
//! kind = "unary"
//! request = "pw.test1.SomeMessage"
//! response = "pw.test1.AnotherMessage"
//! ```
//! - `id` 字段可选，缺省时由名称哈希派生；
//! - 未知键一律拒绝，避免拼写错误被静默忽略。

use serde::Deserialize;
use thiserror::Error;

use crate::method::CallKind;

/// schema 装载失败。
#[derive(Debug, Error)]
pub enum SchemaError {
    /// 文本不是合法的 TOML，或结构与描述不符。
    #[error("schema description is not valid: {0}")]
    Parse(#[from] toml::de::Error),
    /// 服务或方法名为空。
    #[error("empty {what} name in service `{service}`")]
    EmptyName { what: &'static str, service: String },
}

/// 完整的 schema 描述。
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SchemaDescription {
    #[serde(default)]
    pub services: Vec<ServiceSchema>,
}

/// 单个服务的描述。
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServiceSchema {
    /// 全限定服务名，例如 `pw.test1.PublicService`。
    pub name: String,
    /// 显式服务 ID；缺省时由名称哈希派生。
    #[serde(default)]
    pub id: Option<u32>,
    #[serde(default)]
    pub methods: Vec<MethodSchema>,
}

/// 单个方法的描述。
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MethodSchema {
    pub name: String,
    pub kind: CallKind,
    /// 请求消息的全限定类型名。
    pub request: String,
    /// 响应消息的全限定类型名。
    pub response: String,
    /// 显式方法 ID；缺省时由名称哈希派生。
    #[serde(default)]
    pub id: Option<u32>,
}

impl SchemaDescription {
    /// 从 TOML 文本解析并校验 schema 描述。
    pub fn from_toml_str(text: &str) -> Result<Self, SchemaError> {
        let description: SchemaDescription = toml::from_str(text)?;
        description.validate()?;
        Ok(description)
    }

    fn validate(&self) -> Result<(), SchemaError> {
        for service in &self.services {
            if service.name.trim().is_empty() {
                return Err(SchemaError::EmptyName {
                    what: "service",
                    service: service.name.clone(),
                });
            }
            if service.methods.iter().any(|m| m.name.trim().is_empty()) {
                return Err(SchemaError::EmptyName {
                    what: "method",
                    service: service.name.clone(),
                });
            }
        }
        Ok(())
    }
}
