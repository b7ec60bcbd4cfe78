//! # PendingCallTable：在途调用仓储
//!
//! ## 核心意图（Why）
//! - 以 `(channel_id, service_id, method_id)` 为键保存在途调用，保证同一键至多一个调用；
//! - 为每次登记分配单调递增的世代号，使旧调用的句柄无法误取消同键的新调用。
//!
//! ## 行为契约（What）
//! - `begin`：键已存在时返回 [`RpcError::AlreadyPending`]，表保持不变；
//! - `remove`：幂等，键不存在时返回 `None`；
//! - `cancel`：仅当世代号匹配时移除，并告知调用方是否需要向对端发送 CANCEL 报文；
//!   取消通知在表锁内进入调用的交付队列，排在此前已裁决的事件之后；
//! - 表本身不加锁，由 [`Client`](crate::client::Client) 以互斥锁包裹，并保证在锁外执行发送与回调。
//!
//! ## 风险提示（Trade-offs）
//! - 未提供超时清理；对端永不应答的调用会一直占据其键，直到被显式取消或客户端释放。

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use crate::call::{Call, Callback, Event};
use crate::error::RpcError;
use crate::method::MethodDescriptor;

/// 在途调用的唯一键。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct CallKey {
    pub channel_id: u32,
    pub service_id: u32,
    pub method_id: u32,
}

impl CallKey {
    pub fn new(channel_id: u32, service_id: u32, method_id: u32) -> Self {
        Self {
            channel_id,
            service_id,
            method_id,
        }
    }

    /// 以通道与方法描述符构造键。
    pub fn for_method(channel_id: u32, method: &MethodDescriptor) -> Self {
        Self::new(channel_id, method.service_id(), method.method_id())
    }
}

/// [`PendingCallTable::cancel`] 的结果。
#[derive(Debug)]
pub enum CancelOutcome {
    /// 键不存在或世代号不匹配，未做任何改动。
    NotPending,
    /// 调用已移除。
    Cancelled {
        /// 流式调用需要向对端发送 CANCEL；单次调用只做本地移除。
        notify_peer: bool,
        call: Call,
    },
}

/// 在途调用表。
#[derive(Debug, Default)]
pub struct PendingCallTable {
    calls: HashMap<CallKey, Call>,
    next_generation: u64,
}

impl PendingCallTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记新调用并返回其世代号。
    ///
    /// # 教案式注释
    /// - **意图 (Why)**：原子地判定“是否已有同键调用”并插入，阻止第二个调用覆盖第一个；
    /// - **契约 (What)**：
    ///   - **前置条件**：`method` 已在注册表中登记，`channel_id` 已绑定；
    ///   - **后置条件**：成功时表中出现 `Active` 状态的新条目；失败时表不变。
    pub fn begin(
        &mut self,
        channel_id: u32,
        method: Arc<MethodDescriptor>,
        sink: Callback,
    ) -> Result<(CallKey, u64), RpcError> {
        let key = CallKey::for_method(channel_id, &method);
        match self.calls.entry(key) {
            Entry::Occupied(_) => Err(RpcError::AlreadyPending {
                channel_id,
                method: method.qualified_name().to_owned(),
            }),
            Entry::Vacant(vacant) => {
                let generation = self.next_generation;
                self.next_generation = self.next_generation.wrapping_add(1);
                vacant.insert(Call::new(channel_id, method, generation, sink));
                Ok((key, generation))
            }
        }
    }

    pub fn lookup(&self, key: &CallKey) -> Option<&Call> {
        self.calls.get(key)
    }

    pub fn lookup_mut(&mut self, key: &CallKey) -> Option<&mut Call> {
        self.calls.get_mut(key)
    }

    /// 键存在且世代号匹配时返回调用。
    pub fn lookup_generation(&self, key: &CallKey, generation: u64) -> Option<&Call> {
        self.calls
            .get(key)
            .filter(|call| call.generation() == generation)
    }

    /// 移除并返回调用；键不存在时返回 `None`。
    pub fn remove(&mut self, key: &CallKey) -> Option<Call> {
        self.calls.remove(key)
    }

    /// 仅当世代号匹配时移除。
    pub fn remove_generation(&mut self, key: &CallKey, generation: u64) -> Option<Call> {
        match self.calls.entry(*key) {
            Entry::Occupied(occupied) if occupied.get().generation() == generation => {
                Some(occupied.remove())
            }
            _ => None,
        }
    }

    /// 取消世代号匹配的调用，并为其排入取消通知。
    pub fn cancel(&mut self, key: &CallKey, generation: u64) -> CancelOutcome {
        match self.remove_generation(key, generation) {
            Some(mut call) => {
                call.mark_cancelled();
                call.outbox().push(Event::Cancelled);
                CancelOutcome::Cancelled {
                    notify_peer: call.kind().is_streaming(),
                    call,
                }
            }
            None => CancelOutcome::NotPending,
        }
    }

    /// 移出全部调用，用于客户端释放时唤醒等待方。
    pub fn drain(&mut self) -> Vec<Call> {
        self.calls
            .drain()
            .map(|(_, mut call)| {
                call.mark_cancelled();
                call.outbox().push(Event::Cancelled);
                call
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
