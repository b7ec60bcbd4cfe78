//! LEB128 变长整数编解码。
//!
//! 报文信封与消息编解码器共用这一组函数：每字节低 7 位承载数据，最高位表示是否还有后续字节，
//! `u64` 最多占用 10 字节。

use bytes::BufMut;
use thiserror::Error;

/// `u64` 变长编码的最大字节数。
pub const MAX_VARINT_BYTES: usize = 10;

/// 变长整数解码失败的原因。
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum VarintError {
    /// 输入在续位字节处被截断。
    #[error("varint truncated after {consumed} byte(s)")]
    Truncated { consumed: usize },
    /// 编码超过 10 字节或超出 `u64` 表示范围。
    #[error("varint exceeds 64 bits")]
    Overflow,
}

/// 将 `value` 以变长格式追加到 `buf`。
pub fn encode_varint(mut value: u64, buf: &mut impl BufMut) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// 从切片头部解码一个变长整数，成功时将切片前移越过已消费字节。
///
/// # 契约（What）
/// - 失败时 `src` 保持调用前的位置，便于上层给出准确的错误偏移；
/// - 第 10 字节只允许携带最低 1 位有效数据，否则判定为溢出。
pub fn decode_varint(src: &mut &[u8]) -> Result<u64, VarintError> {
    let mut value = 0u64;
    for (index, byte) in src.iter().copied().enumerate() {
        if index == MAX_VARINT_BYTES - 1 && byte > 0x01 {
            return Err(VarintError::Overflow);
        }
        value |= u64::from(byte & 0x7f) << (7 * index);
        if byte & 0x80 == 0 {
            *src = &src[index + 1..];
            return Ok(value);
        }
        if index + 1 == MAX_VARINT_BYTES {
            return Err(VarintError::Overflow);
        }
    }
    Err(VarintError::Truncated {
        consumed: src.len(),
    })
}

/// 计算 `value` 编码后的字节数，不产生分配。
pub fn varint_size(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_matches_encoded_length() {
        for value in [
            0u64,
            1,
            127,
            128,
            16_383,
            16_384,
            u64::from(u32::MAX),
            u64::MAX,
        ] {
            let mut buf = Vec::new();
            encode_varint(value, &mut buf);
            assert_eq!(varint_size(value), buf.len(), "value {value}");
        }
        assert_eq!(varint_size(u64::MAX), MAX_VARINT_BYTES);
    }

    #[test]
    fn decode_advances_past_consumed_bytes() {
        let bytes = [0xac, 0x02, 0xff];
        let mut cursor = &bytes[..];
        assert_eq!(decode_varint(&mut cursor), Ok(300));
        assert_eq!(cursor, &[0xff]);
    }

    #[test]
    fn truncated_input_leaves_cursor_untouched() {
        let bytes = [0x80, 0x80];
        let mut cursor = &bytes[..];
        assert_eq!(
            decode_varint(&mut cursor),
            Err(VarintError::Truncated { consumed: 2 })
        );
        assert_eq!(cursor.len(), 2);
    }

    #[test]
    fn eleven_byte_encoding_overflows() {
        let bytes = [0xff; 11];
        let mut cursor = &bytes[..];
        assert_eq!(decode_varint(&mut cursor), Err(VarintError::Overflow));
    }
}
