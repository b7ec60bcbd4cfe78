//! # registry 模块说明
//!
//! ## 角色定位（Why）
//! - 将 `(service_id, method_id)` 映射到 [`MethodDescriptor`]，供路由层判定报文身份、
//!   供调用入口取得编解码器；
//! - 同时维护“全限定名 → 描述符”的查找表，替代按点分路径动态访问桩对象的做法。
//!
//! ## 契约（What）
//! - 注册表在构造时一次性装载，之后只读，可在线程间自由共享；
//! - 查找失败只有“未找到”一种结果，调用方据此判定为不可路由；
//! - 构造阶段拒绝重复的标识、重复的名称以及缺失编解码器的消息类型。
//!
//! ## 风险提示（Trade-offs）
//! - 标识由名称哈希派生时存在极小的碰撞概率；碰撞在构造阶段以
//!   [`RegistryError::DuplicateMethod`] 暴露，需要在 schema 中显式指定 `id` 规避。

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::codec::CodecCatalog;
use crate::ids;
use crate::method::MethodDescriptor;
use crate::schema::{SchemaDescription, SchemaError};

/// 注册表构造失败。
#[derive(Debug, Error)]
pub enum RegistryError {
    /// 两个方法解析到相同的 `(service_id, method_id)`。
    #[error(
        "`{duplicate}` collides with `{existing}` on ids ({service_id:#010x}, {method_id:#010x})"
    )]
    DuplicateMethod {
        service_id: u32,
        method_id: u32,
        existing: String,
        duplicate: String,
    },
    /// 两个方法的全限定名相同。
    #[error("method `{0}` is registered twice")]
    DuplicateName(String),
    /// 消息类型在编解码器目录中不存在。
    #[error("no codec registered for message type `{message_type}` used by `{method}`")]
    MissingCodec {
        method: String,
        message_type: String,
    },
    /// schema 描述本身无效。
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// 只读的方法注册表。
#[derive(Clone, Debug, Default)]
pub struct MethodRegistry {
    by_id: HashMap<(u32, u32), Arc<MethodDescriptor>>,
    by_name: HashMap<String, Arc<MethodDescriptor>>,
    services: HashMap<u32, String>,
}

impl MethodRegistry {
    /// 以编程方式逐个登记方法。
    pub fn builder() -> MethodRegistryBuilder {
        MethodRegistryBuilder::default()
    }

    /// 由 schema 描述与编解码器目录装载注册表。
    ///
    /// # 教案式注释
    /// - **意图 (Why)**：schema 只描述名称与消息类型名，本函数负责把二者与具体编解码器绑定；
    /// - **执行 (How)**：逐个方法查询目录中的请求/响应编解码器，按 schema 中的显式 `id`
    ///   或名称哈希确定标识，再交由 [`MethodRegistryBuilder::build`] 做唯一性校验；
    /// - **契约 (What)**：任一消息类型缺失编解码器即整体失败，不会产出半装载的注册表。
    pub fn from_schema(
        schema: &SchemaDescription,
        catalog: &CodecCatalog,
    ) -> Result<Self, RegistryError> {
        let mut builder = Self::builder();
        for service in &schema.services {
            let service_id = service.id.unwrap_or_else(|| ids::calculate(&service.name));
            for method in &service.methods {
                let qualified = format!("{}.{}", service.name, method.name);
                let codec_for = |message_type: &str| {
                    catalog
                        .get(message_type)
                        .ok_or_else(|| RegistryError::MissingCodec {
                            method: qualified.clone(),
                            message_type: message_type.to_owned(),
                        })
                };
                let request = codec_for(&method.request)?;
                let response = codec_for(&method.response)?;
                let method_id = method.id.unwrap_or_else(|| ids::calculate(&method.name));
                builder = builder.method(
                    MethodDescriptor::new(
                        service.name.clone(),
                        method.name.clone(),
                        method.kind,
                        request,
                        response,
                    )
                    .with_ids(service_id, method_id),
                );
            }
        }
        builder.build()
    }

    /// 解析 TOML 形式的 schema 并装载注册表。
    pub fn from_toml_str(text: &str, catalog: &CodecCatalog) -> Result<Self, RegistryError> {
        let schema = SchemaDescription::from_toml_str(text)?;
        Self::from_schema(&schema, catalog)
    }

    /// 按标识查找方法。
    pub fn lookup(&self, service_id: u32, method_id: u32) -> Option<Arc<MethodDescriptor>> {
        self.by_id.get(&(service_id, method_id)).cloned()
    }

    /// 按全限定名查找方法，接受 `pkg.Service.Method` 与 `pkg.Service/Method` 两种写法。
    pub fn lookup_by_name(&self, qualified_name: &str) -> Option<Arc<MethodDescriptor>> {
        if let Some(found) = self.by_name.get(qualified_name) {
            return Some(found.clone());
        }
        let (service, method) = qualified_name.rsplit_once('/')?;
        self.by_name.get(&format!("{service}.{method}")).cloned()
    }

    /// 是否存在给定服务 ID 的任一方法。
    pub fn has_service(&self, service_id: u32) -> bool {
        self.services.contains_key(&service_id)
    }

    /// 服务 ID 对应的全名。
    pub fn service_name(&self, service_id: u32) -> Option<&str> {
        self.services.get(&service_id).map(String::as_str)
    }

    /// 遍历全部方法，顺序不保证。
    pub fn methods(&self) -> impl Iterator<Item = &Arc<MethodDescriptor>> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// [`MethodRegistry`] 的构造器。
#[derive(Debug, Default)]
pub struct MethodRegistryBuilder {
    methods: Vec<MethodDescriptor>,
}

impl MethodRegistryBuilder {
    /// 追加一个方法。
    pub fn method(mut self, descriptor: MethodDescriptor) -> Self {
        self.methods.push(descriptor);
        self
    }

    /// 校验唯一性并产出只读注册表。
    pub fn build(self) -> Result<MethodRegistry, RegistryError> {
        let mut registry = MethodRegistry::default();
        for descriptor in self.methods {
            let key = (descriptor.service_id(), descriptor.method_id());
            if let Some(existing) = registry.by_id.get(&key) {
                return Err(RegistryError::DuplicateMethod {
                    service_id: key.0,
                    method_id: key.1,
                    existing: existing.qualified_name().to_owned(),
                    duplicate: descriptor.qualified_name().to_owned(),
                });
            }
            if registry.by_name.contains_key(descriptor.qualified_name()) {
                return Err(RegistryError::DuplicateName(
                    descriptor.qualified_name().to_owned(),
                ));
            }
            registry
                .services
                .entry(key.0)
                .or_insert_with(|| descriptor.service_name().to_owned());
            let descriptor = Arc::new(descriptor);
            registry
                .by_name
                .insert(descriptor.qualified_name().to_owned(), descriptor.clone());
            registry.by_id.insert(key, descriptor);
        }
        Ok(registry)
    }
}
