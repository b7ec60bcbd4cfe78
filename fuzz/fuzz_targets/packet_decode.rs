#![no_main]

use libfuzzer_sys::fuzz_target;
use spark_rpc::Packet;

// 任意字节都只能得到 `Ok` 或 `Err`；成功解码的报文重新编码后必须解出同一报文。
fuzz_target!(|data: &[u8]| {
    if let Ok(packet) = Packet::decode(data) {
        let encoded = packet.encode();
        assert_eq!(encoded.len(), packet.encoded_len());
        assert_eq!(Packet::decode(&encoded).as_ref(), Ok(&packet));
    }
});
