//! 报文信封与待决调用表的性质测试。
//!
//! # 教案级导览
//!
//! - **Why**：路由入口直接面对对端字节，任何输入都不得导致 panic；调用表的“至多一个在途调用”
//!   约束需要在任意操作序列下成立，而不仅是手写场景；
//! - **How**：
//!   - `prop_decode_never_panics`：任意字节交给 `Packet::decode` 与 `Client::route`；
//!   - `prop_envelope_preserves_fields`：随机报文编码后解码，所有字段保持不变；
//!   - `prop_at_most_one_call_per_key`：以影子模型（`HashSet` 记录在途键）对照随机的
//!     发起/取消/回包序列，逐步比较客户端的判定；
//! - **What**：影子模型只描述对外可观测的结果（成功或 `AlreadyPending`、取消的布尔值），不触碰内部结构。

mod support;

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use proptest::prelude::*;
use spark_rpc::{CallHandle, Packet, PacketType, RpcError, Status};
use support::{BIDI_STREAMING, CLIENT_STREAMING, Harness, SERVER_STREAMING, SomeMessage, UNARY};

const METHODS: [&str; 4] = [UNARY, SERVER_STREAMING, CLIENT_STREAMING, BIDI_STREAMING];

fn packet_type() -> impl Strategy<Value = PacketType> {
    prop_oneof![
        Just(PacketType::Request),
        Just(PacketType::Response),
        Just(PacketType::ClientStreamChunk),
        Just(PacketType::StreamCompletion),
        Just(PacketType::Cancel),
        Just(PacketType::Error),
    ]
}

fn status() -> impl Strategy<Value = Status> {
    (0_u32..=16).prop_map(|code| Status::from_code(code).unwrap_or_default())
}

prop_compose! {
    fn arbitrary_packet()(
        packet_type in packet_type(),
        channel_id in any::<u32>(),
        service_id in any::<u32>(),
        method_id in any::<u32>(),
        status in status(),
        payload in proptest::collection::vec(any::<u8>(), 0..64),
    ) -> Packet {
        Packet::new(packet_type, channel_id, service_id, method_id, Bytes::from(payload))
            .with_status(status)
    }
}

#[derive(Clone, Debug)]
enum Op {
    Invoke { channel: u32, method: usize },
    Cancel { channel: u32, method: usize },
    Complete { channel: u32, method: usize },
}

fn op() -> impl Strategy<Value = Op> {
    let channel = 1_u32..=2;
    let method = 0..METHODS.len();
    prop_oneof![
        (channel.clone(), method.clone())
            .prop_map(|(channel, method)| Op::Invoke { channel, method }),
        (channel.clone(), method.clone())
            .prop_map(|(channel, method)| Op::Cancel { channel, method }),
        (channel, method).prop_map(|(channel, method)| Op::Complete { channel, method }),
    ]
}

proptest! {
    #[test]
    fn prop_decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..128)) {
        let _ = Packet::decode(&bytes);
        let harness = Harness::new();
        let _ = harness.client.route(&bytes);
    }

    #[test]
    fn prop_envelope_preserves_fields(packet in arbitrary_packet()) {
        let encoded = packet.encode();
        prop_assert_eq!(encoded.len(), packet.encoded_len());
        prop_assert_eq!(Packet::decode(&encoded), Ok(packet));
    }

    #[test]
    fn prop_at_most_one_call_per_key(ops in proptest::collection::vec(op(), 1..64)) {
        let harness = Harness::new();
        let mut model: HashSet<(u32, usize)> = HashSet::new();
        let mut handles: HashMap<(u32, usize), CallHandle> = HashMap::new();

        for op in ops {
            match op {
                Op::Invoke { channel, method } => {
                    let descriptor = harness.method(METHODS[method]);
                    let result = harness.client.invoke(
                        channel,
                        descriptor.service_id(),
                        descriptor.method_id(),
                        &SomeMessage::default(),
                        None,
                    );
                    if model.insert((channel, method)) {
                        let handle = result.map_err(|e| TestCaseError::fail(e.to_string()))?;
                        handles.insert((channel, method), handle);
                    } else {
                        let is_pending = matches!(result, Err(RpcError::AlreadyPending { .. }));
                        prop_assert!(is_pending);
                    }
                }
                Op::Cancel { channel, method } => {
                    let expected = model.remove(&(channel, method));
                    let cancelled = handles
                        .remove(&(channel, method))
                        .is_some_and(|handle| handle.cancel());
                    prop_assert_eq!(cancelled, expected);
                }
                Op::Complete { channel, method } => {
                    let descriptor = harness.method(METHODS[method]);
                    let packet_type = if descriptor.kind().is_streaming() {
                        PacketType::StreamCompletion
                    } else {
                        PacketType::Response
                    };
                    let packet = Packet::new(
                        packet_type,
                        channel,
                        descriptor.service_id(),
                        descriptor.method_id(),
                        Bytes::new(),
                    );
                    prop_assert!(harness.client.route(&packet.encode()));
                    model.remove(&(channel, method));
                    if let Some(handle) = handles.remove(&(channel, method)) {
                        prop_assert!(!handle.is_pending());
                    }
                }
            }
            prop_assert_eq!(harness.client.pending_calls(), model.len());
        }
    }
}
