//! # invoker 模块说明
//!
//! ## 角色定位（Why）
//! - 用户回调运行在分发器的路由路径上；回调 panic 不能让 `route` 中断，也不能污染其他调用；
//! - 本模块以 `catch_unwind` 隔离每次交付，把 panic 转为一条 `error` 级日志事件。
//!
//! ## 契约（What）
//! - 调用方保证进入本模块时不持有待决调用表的锁，回调可以安全地重入客户端；
//! - [`drain`] 按调用的交付队列顺序送出事件，单个事件的回调 panic 不会中断后续事件；
//! - 回调 panic 后对应调用不会重新登记，后续对同一方法的新调用不受影响；
//! - 日志事件携带 `channel_id`、`service_id`、`method_id`、`method` 与 `panic` 字段。
//!
//! ## 风险提示（Trade-offs）
//! - 以 `AssertUnwindSafe` 包裹回调：回调内部状态在 panic 后可能不一致，这由回调自身负责；
//! - `panic = "abort"` 的构建中无法捕获，进程会直接终止。

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use bytes::Bytes;

use crate::call::{Callback, Event, Outbox};
use crate::codec::Message;
use crate::method::MethodDescriptor;
use crate::pending::CallKey;
use crate::status::Status;

/// 一次交付的上下文，用于日志。
#[derive(Clone, Copy, Debug)]
struct Delivery<'a> {
    key: CallKey,
    method: &'a str,
}

/// 若取得排空权，则按序交付调用的全部待交付事件；载荷在此处（锁外）解码。
pub(crate) fn drain(
    outbox: &Outbox,
    sink: &Callback,
    method: &MethodDescriptor,
    key: CallKey,
) {
    if !outbox.claim() {
        return;
    }
    let delivery = Delivery {
        key,
        method: method.qualified_name(),
    };
    while let Some(event) = outbox.next() {
        match event {
            Event::Next { status, payload } => {
                let response = payload.and_then(|bytes| decode_response(method, key, &bytes));
                deliver(sink, delivery, status, response);
            }
            Event::Cancelled => {
                deliver_cancelled(sink, delivery);
            }
        }
    }
}

fn decode_response(
    method: &MethodDescriptor,
    key: CallKey,
    payload: &Bytes,
) -> Option<Message> {
    match method.response_codec().decode_dyn(payload) {
        Ok(message) => Some(message),
        Err(error) => {
            tracing::warn!(
                channel_id = key.channel_id,
                method = method.qualified_name(),
                error = %error,
                "failed to decode RPC response payload; delivering without a response",
            );
            None
        }
    }
}

/// 交付 `on_next` 事件，捕获并记录回调 panic；返回回调是否正常结束。
fn deliver(
    sink: &Callback,
    delivery: Delivery<'_>,
    status: Option<Status>,
    response: Option<Message>,
) -> bool {
    invoke_guarded(delivery, || sink.on_next(status, response))
}

/// 交付取消通知。
fn deliver_cancelled(sink: &Callback, delivery: Delivery<'_>) -> bool {
    invoke_guarded(delivery, || sink.on_cancelled())
}

fn invoke_guarded(delivery: Delivery<'_>, f: impl FnOnce()) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(payload) => {
            tracing::error!(
                channel_id = delivery.key.channel_id,
                service_id = delivery.key.service_id,
                method_id = delivery.key.method_id,
                method = delivery.method,
                panic = %panic_message(payload.as_ref()),
                "RPC callback panicked; the dispatcher continues",
            );
            false
        }
    }
}

/// 将 panic 载荷转换为文本。
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_owned()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "<non-string panic payload>".to_owned()
    }
}
