//! # call 模块说明
//!
//! ## 角色定位（Why）
//! - 每个在途调用对应一个 [`Call`]：记录通道、方法描述符、当前状态与结果接收端；
//! - 状态机只负责“收到某类报文后应当做什么”，不直接触碰用户回调，
//!   裁决产生的事件在锁内进入调用的交付队列 `Outbox`，随后在锁外经
//!   [`invoker`](crate::invoker) 按序交付。
//!
//! ## 状态机约束（What）
//! - 合法跃迁：`Active → Terminal`、`Active → Cancelled`；终态不再跃迁；
//! - 单次调用：RESPONSE 即终止，交付 `(Some(status), response)`；
//! - 流式调用（服务端流、客户端流、双向流）：RESPONSE 交付 `(None, response)` 并保持 `Active`，
//!   STREAM_COMPLETION 交付 `(Some(status), None)` 并终止；
//! - 任意调用类型收到 ERROR 均终止，交付 `(Some(status), None)`；
//! - 客户端发往服务端的报文类型（REQUEST、CLIENT_STREAM_CHUNK、CANCEL）被识别但忽略。

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, ReentrantMutex};

use crate::codec::Message;
use crate::method::{CallKind, MethodDescriptor};
use crate::packet::PacketType;
use crate::status::Status;

/// 调用状态。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CallState {
    /// 已发出请求，等待响应。
    Active,
    /// 已交付终态状态码。
    Terminal,
    /// 未交付状态即被本地移除。
    Cancelled,
}

impl CallState {
    pub fn is_active(self) -> bool {
        matches!(self, CallState::Active)
    }
}

/// 调用结果的接收端。
///
/// # 教案式说明
/// - **意图 (Why)**：统一承载用户回调与阻塞式收集器两种消费方式；
/// - **契约 (What)**：
///   - `on_next(status, response)`：单次调用与流结束时 `status` 为 `Some`，流元素为 `None`；
///     `response` 在载荷解码失败或报文不携带载荷时为 `None`；
///   - `on_cancelled`：调用在交付终态前被本地移除时触发，缺省不做任何事；
///   - 两个方法都在待决调用表的锁之外、经回调隔离层调用，实现中的 panic 不会影响分发器。
pub trait CallSink: Send + Sync + 'static {
    fn on_next(&self, status: Option<Status>, response: Option<Message>);

    fn on_cancelled(&self) {}
}

/// 共享的结果接收端。
pub type Callback = Arc<dyn CallSink>;

/// 将闭包包装为 [`Callback`]。
///
/// 闭包签名为 `FnMut(Option<Status>, Option<Message>)`，同一调用的交付按报文到达顺序串行执行。
pub fn callback<F>(f: F) -> Callback
where
    F: FnMut(Option<Status>, Option<Message>) + Send + 'static,
{
    Arc::new(CallbackSink::new(f))
}

/// 闭包形式的接收端。
///
/// 以可重入锁串行化跨线程交付；若回调在执行期间同步地触发了对同一接收端的再次交付
/// （例如同步传输在 `send` 内回送报文），内层事件进入积压队列，待外层回调返回后按序交付。
pub struct CallbackSink<F> {
    slot: ReentrantMutex<SinkSlot<F>>,
}

struct SinkSlot<F> {
    callback: RefCell<F>,
    backlog: RefCell<VecDeque<(Option<Status>, Option<Message>)>>,
}

impl<F> CallbackSink<F> {
    pub fn new(callback: F) -> Self {
        Self {
            slot: ReentrantMutex::new(SinkSlot {
                callback: RefCell::new(callback),
                backlog: RefCell::new(VecDeque::new()),
            }),
        }
    }
}

impl<F> CallSink for CallbackSink<F>
where
    F: FnMut(Option<Status>, Option<Message>) + Send + 'static,
{
    fn on_next(&self, status: Option<Status>, response: Option<Message>) {
        let slot = self.slot.lock();
        slot.backlog.borrow_mut().push_back((status, response));
        let Ok(mut callback) = slot.callback.try_borrow_mut() else {
            tracing::trace!(status = ?status, "RPC callback re-entered; event deferred");
            return;
        };
        // 回调 panic 时剩余事件留在积压队列，随下一次交付一并送出。
        loop {
            let next = slot.backlog.borrow_mut().pop_front();
            let Some((status, response)) = next else {
                break;
            };
            (*callback)(status, response);
        }
    }
}

impl<F> fmt::Debug for CallbackSink<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CallbackSink")
    }
}

/// 丢弃全部结果的接收端，用于未提供回调的异步调用。
#[derive(Debug, Default)]
pub struct NoopSink;

impl CallSink for NoopSink {
    fn on_next(&self, status: Option<Status>, _response: Option<Message>) {
        tracing::trace!(status = ?status, "RPC result discarded: no callback registered");
    }
}

/// 状态机对一个入站报文的裁决。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Transition {
    /// 交付 `(None, decode(payload))`，调用保持活跃。
    StreamItem,
    /// 交付 `(Some(status), payload?)`，调用进入终态并从表中移除。
    Complete {
        status: Status,
        /// 是否解码报文载荷作为响应值。
        with_payload: bool,
    },
    /// 报文类型对客户端无意义，不改变状态。
    Ignore,
}

/// 等待交付给接收端的事件。
#[derive(Debug)]
pub(crate) enum Event {
    /// `on_next(status, decode(payload))`；`payload` 为 `None` 时不携带响应值。
    Next {
        status: Option<Status>,
        payload: Option<Bytes>,
    },
    /// `on_cancelled()`。
    Cancelled,
}

#[derive(Debug, Default)]
struct OutboxState {
    events: VecDeque<Event>,
    draining: bool,
}

/// 单个调用的有序交付队列。
///
/// # 教案式说明
/// - **意图 (Why)**：状态机在待决调用表的锁内裁决，回调却在锁外执行；多个接收线程同时路由
///   同一调用的报文时，锁外交付可能乱序，终态事件甚至可能先于更早的流元素到达；
/// - **契约 (What)**：
///   - 事件在表锁内入队，入队顺序即状态机的裁决顺序；
///   - 同一时刻至多一个线程持有排空权，按入队顺序交付全部事件；
///   - 未取得排空权的线程直接返回，其事件由当前排空者送出；这同样覆盖回调内同步重入的交付；
/// - **风险 (Trade-offs)**：事件可能在另一个线程上交付，回调不得依赖线程局部状态。
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    state: Mutex<OutboxState>,
}

impl Outbox {
    pub(crate) fn push(&self, event: Event) {
        self.state.lock().events.push_back(event);
    }

    /// 认领排空权；已有排空者时返回 `false`。
    pub(crate) fn claim(&self) -> bool {
        let mut state = self.state.lock();
        if state.draining {
            return false;
        }
        state.draining = true;
        true
    }

    /// 取出下一个事件；队列为空时同时释放排空权。
    pub(crate) fn next(&self) -> Option<Event> {
        let mut state = self.state.lock();
        let event = state.events.pop_front();
        if event.is_none() {
            state.draining = false;
        }
        event
    }
}

/// 一次在途调用。
///
/// 仅由 [`PendingCallTable`](crate::pending::PendingCallTable) 持有；调用方只持有引用其身份与
/// 世代号的 [`CallHandle`](crate::client::CallHandle)。
pub struct Call {
    channel_id: u32,
    method: Arc<MethodDescriptor>,
    state: CallState,
    generation: u64,
    sink: Callback,
    outbox: Arc<Outbox>,
    status: Option<Status>,
}

impl Call {
    pub(crate) fn new(
        channel_id: u32,
        method: Arc<MethodDescriptor>,
        generation: u64,
        sink: Callback,
    ) -> Self {
        Self {
            channel_id,
            method,
            state: CallState::Active,
            generation,
            sink,
            outbox: Arc::default(),
            status: None,
        }
    }

    pub fn channel_id(&self) -> u32 {
        self.channel_id
    }

    pub fn method(&self) -> &Arc<MethodDescriptor> {
        &self.method
    }

    pub fn kind(&self) -> CallKind {
        self.method.kind()
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 已交付的终态状态码。
    pub fn status(&self) -> Option<Status> {
        self.status
    }

    pub(crate) fn sink(&self) -> &Callback {
        &self.sink
    }

    pub(crate) fn outbox(&self) -> &Arc<Outbox> {
        &self.outbox
    }

    /// 依据报文类型推进状态机。
    ///
    /// # 执行逻辑（How）
    /// 1. 非 `Active` 状态一律忽略，终态不可逆；
    /// 2. 按调用类型与报文类型查表得出裁决；
    /// 3. 终止裁决同步记录状态码并切换到 `Terminal`，由调用方负责移除条目。
    pub fn on_packet(&mut self, packet_type: PacketType, status: Status) -> Transition {
        if !self.state.is_active() {
            return Transition::Ignore;
        }
        let transition = match (packet_type, self.kind()) {
            (PacketType::Response, CallKind::Unary) => Transition::Complete {
                status,
                with_payload: true,
            },
            (PacketType::Response, _) => Transition::StreamItem,
            (PacketType::StreamCompletion | PacketType::Error, _) => Transition::Complete {
                status,
                with_payload: false,
            },
            (PacketType::Request | PacketType::ClientStreamChunk | PacketType::Cancel, _) => {
                Transition::Ignore
            }
        };
        if let Transition::Complete { status, .. } = transition {
            self.state = CallState::Terminal;
            self.status = Some(status);
        }
        transition
    }

    /// 标记为已取消；返回调用此前是否处于活跃状态。
    pub(crate) fn mark_cancelled(&mut self) -> bool {
        let was_active = self.state.is_active();
        if was_active {
            self.state = CallState::Cancelled;
        }
        was_active
    }
}

impl fmt::Debug for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("channel_id", &self.channel_id)
            .field("method", &self.method.qualified_name())
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("status", &self.status)
            .finish()
    }
}
