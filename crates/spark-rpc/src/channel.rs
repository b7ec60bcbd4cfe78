//! # channel 模块说明
//!
//! ## 角色定位（Why）
//! - 通道是到对端的逻辑路径，以小整数 ID 标识；分发器只需要“把这段字节发给该通道”的能力，
//!   真实传输由外部协作方实现；
//! - [`ChannelTable`] 在客户端构造时固定，路由层据此判定入站报文的通道是否已知。
//!
//! ## 契约（What）
//! - [`ChannelOutput::send`] 可能阻塞；分发器保证调用它时不持有待决调用表的锁，
//!   因此实现可以在 `send` 内部同步回调 [`Client::route`](crate::client::Client::route)；
//! - 通道 ID 在表内唯一，重复登记在构造阶段报错。

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

/// 通道输出失败。
#[derive(Debug, Error)]
pub enum SendError {
    /// 通道已关闭，无法再发送。
    #[error("channel output is closed")]
    Closed,
    /// 底层 I/O 失败。
    #[error("channel output I/O failure: {0}")]
    Io(#[from] io::Error),
    /// 传输实现以自定义原因拒绝报文。
    #[error("channel output rejected packet: {0}")]
    Rejected(String),
}

/// 通道的出站发送原语。
///
/// # 教案式说明
/// - **意图 (Why)**：把“如何把字节送达对端”完全交给传输协作方，分发器只负责何时发送、发送什么；
/// - **契约 (What)**：`packet` 为完整编码的信封；返回错误时分发器会回滚刚登记的调用；
/// - **实现提示 (How)**：签名为 `Fn(&[u8]) -> Result<(), SendError>` 的闭包自动实现本 trait。
pub trait ChannelOutput: Send + Sync + 'static {
    fn send(&self, packet: Bytes) -> Result<(), SendError>;
}

impl<F> ChannelOutput for F
where
    F: Fn(&[u8]) -> Result<(), SendError> + Send + Sync + 'static,
{
    fn send(&self, packet: Bytes) -> Result<(), SendError> {
        self(&packet)
    }
}

/// 通道 ID 与出站发送原语的绑定。
#[derive(Clone)]
pub struct Channel {
    id: u32,
    output: Arc<dyn ChannelOutput>,
}

impl Channel {
    pub fn new(id: u32, output: impl ChannelOutput) -> Self {
        Self {
            id,
            output: Arc::new(output),
        }
    }

    /// 以已共享的输出构造通道，便于多个通道复用同一传输。
    pub fn from_shared(id: u32, output: Arc<dyn ChannelOutput>) -> Self {
        Self { id, output }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn send(&self, packet: Bytes) -> Result<(), SendError> {
        self.output.send(packet)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel").field("id", &self.id).finish()
    }
}

/// 通道表构造失败。
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("channel {0} is bound more than once")]
pub struct DuplicateChannel(pub u32);

/// 客户端生命周期内固定的通道表。
#[derive(Clone, Debug, Default)]
pub struct ChannelTable {
    channels: HashMap<u32, Channel>,
}

impl ChannelTable {
    /// 由通道集合构造，拒绝重复 ID。
    pub fn new(channels: impl IntoIterator<Item = Channel>) -> Result<Self, DuplicateChannel> {
        let mut table = HashMap::new();
        for channel in channels {
            let id = channel.id();
            if table.insert(id, channel).is_some() {
                return Err(DuplicateChannel(id));
            }
        }
        Ok(Self { channels: table })
    }

    pub fn get(&self, channel_id: u32) -> Option<&Channel> {
        self.channels.get(&channel_id)
    }

    pub fn contains(&self, channel_id: u32) -> bool {
        self.channels.contains_key(&channel_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.channels.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn closures_act_as_outputs() {
        let sent = Arc::new(Mutex::new(Vec::<Vec<u8>>::new()));
        let sink = sent.clone();
        let channel = Channel::new(1, move |packet: &[u8]| -> Result<(), SendError> {
            sink.lock().push(packet.to_vec());
            Ok(())
        });
        channel.send(Bytes::from_static(b"abc")).expect("send");
        assert_eq!(sent.lock().as_slice(), &[b"abc".to_vec()]);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let output = |_: &[u8]| -> Result<(), SendError> { Ok(()) };
        let err =
            ChannelTable::new([Channel::new(1, output), Channel::new(1, output)]).unwrap_err();
        assert_eq!(err, DuplicateChannel(1));
    }

    #[test]
    fn lookup_by_id() {
        let output = |_: &[u8]| -> Result<(), SendError> { Err(SendError::Closed) };
        let table = ChannelTable::new([Channel::new(3, output)]).expect("table");
        assert!(table.contains(3));
        assert!(!table.contains(4));
        assert!(matches!(
            table.get(3).map(|c| c.send(Bytes::new())),
            Some(Err(SendError::Closed))
        ));
    }
}
