#![no_main]

use std::collections::HashSet;
use std::sync::Arc;

use arbitrary::Arbitrary;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use spark_rpc::codec::erase;
use spark_rpc::{
    CallHandle, CallKind, Channel, ChannelTable, Client, MethodDescriptor, MethodRegistry,
    Packet, PacketType, RawBytesCodec, RpcError, SendError, Status, callback,
};

/// Fuzz 用例：对同一客户端施加任意顺序的调用、取消与入站报文。
///
/// - **Why**：手写场景难以覆盖“回包、取消、重复调用”交错出现的全部组合；
/// - **How**：方法与通道以下标选择，入站报文既可以是结构化的合法报文，也可以是原始字节；
/// - **What**：任意序列下分发器不 panic，且在途调用数与影子集合一致。
#[derive(Debug, Arbitrary)]
struct DispatcherCase {
    ops: Vec<DispatcherOp>,
}

#[derive(Debug, Arbitrary)]
enum DispatcherOp {
    Invoke { channel: u8, method: u8 },
    Cancel { channel: u8, method: u8 },
    Deliver { channel: u8, method: u8, kind: u8, status: u8, payload: Vec<u8> },
    Raw { bytes: Vec<u8> },
}

const KINDS: [CallKind; 4] = [
    CallKind::Unary,
    CallKind::ServerStreaming,
    CallKind::ClientStreaming,
    CallKind::BidirectionalStreaming,
];

fn client() -> (Client, Vec<Arc<MethodDescriptor>>) {
    let mut builder = MethodRegistry::builder();
    for (index, kind) in KINDS.into_iter().enumerate() {
        builder = builder.method(MethodDescriptor::new(
            "fuzz.Service",
            format!("Method{index}"),
            kind,
            erase(RawBytesCodec::default()),
            erase(RawBytesCodec::default()),
        ));
    }
    let registry = match builder.build() {
        Ok(registry) => registry,
        Err(error) => panic!("fuzz registry must build: {error}"),
    };
    let methods = (0..KINDS.len())
        .filter_map(|index| registry.lookup_by_name(&format!("fuzz.Service.Method{index}")))
        .collect();
    let sink = |_: &[u8]| -> Result<(), SendError> { Ok(()) };
    let channels = match ChannelTable::new([Channel::new(1, sink), Channel::new(2, sink)]) {
        Ok(channels) => channels,
        Err(error) => panic!("fuzz channels must be distinct: {error}"),
    };
    (Client::new(channels, registry), methods)
}

fuzz_target!(|case: DispatcherCase| {
    let (client, methods) = client();
    let mut pending: HashSet<(u32, usize)> = HashSet::new();
    let mut handles: Vec<CallHandle> = Vec::new();

    for op in case.ops {
        match op {
            DispatcherOp::Invoke { channel, method } => {
                let channel = u32::from(channel % 3);
                let index = usize::from(method) % methods.len();
                let descriptor = &methods[index];
                let sink = callback(|_, response| drop(response));
                match client.invoke(
                    channel,
                    descriptor.service_id(),
                    descriptor.method_id(),
                    &Bytes::new(),
                    Some(sink),
                ) {
                    Ok(handle) => {
                        assert!(pending.insert((channel, index)));
                        handles.push(handle);
                    }
                    Err(RpcError::AlreadyPending { .. }) => {
                        assert!(pending.contains(&(channel, index)));
                    }
                    Err(RpcError::UnknownChannel(_)) => assert_eq!(channel, 0),
                    Err(other) => panic!("unexpected invoke error: {other}"),
                }
            }
            DispatcherOp::Cancel { channel, method } => {
                let channel = u32::from(channel % 3);
                let index = usize::from(method) % methods.len();
                let descriptor = &methods[index];
                let cancelled = handles
                    .iter()
                    .filter(|handle| {
                        handle.channel_id() == channel
                            && handle.method_id() == descriptor.method_id()
                    })
                    .fold(false, |acc, handle| handle.cancel() || acc);
                assert_eq!(cancelled, pending.remove(&(channel, index)));
            }
            DispatcherOp::Deliver { channel, method, kind, status, payload } => {
                let channel = u32::from(channel % 3);
                let index = usize::from(method) % methods.len();
                let descriptor = &methods[index];
                let packet_type = PacketType::from_wire(u64::from(kind % 6))
                    .unwrap_or(PacketType::Response);
                let status = Status::from_code(u32::from(status % 17)).unwrap_or_default();
                let packet = Packet::new(
                    packet_type,
                    channel,
                    descriptor.service_id(),
                    descriptor.method_id(),
                    Bytes::from(payload),
                )
                .with_status(status);
                let recognized = client.route(&packet.encode());
                let oversized = packet.encoded_len() > client.config().max_packet_bytes;
                assert_eq!(recognized, channel != 0 && !oversized);
                let terminal = match packet_type {
                    PacketType::Response => !descriptor.kind().is_streaming(),
                    PacketType::StreamCompletion | PacketType::Error => true,
                    _ => false,
                };
                if recognized && terminal {
                    pending.remove(&(channel, index));
                }
            }
            DispatcherOp::Raw { bytes } => {
                let _ = client.route(&bytes);
                // 原始字节可能恰好构成合法的终止报文；以客户端的视角重新同步影子集合。
                pending.retain(|&(channel, index)| {
                    let descriptor = &methods[index];
                    client.is_pending(channel, descriptor.service_id(), descriptor.method_id())
                });
            }
        }
        handles.retain(CallHandle::is_pending);
        assert_eq!(client.pending_calls(), pending.len());
    }
});
