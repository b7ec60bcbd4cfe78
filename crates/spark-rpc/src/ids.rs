//! 服务与方法标识的派生规则。
//!
//! 对端以名称的 65599 哈希作为服务 ID 与方法 ID：
//! `H(s) = len(s) + 65599·s[0] + 65599²·s[1] + …`，按 `u32` 回绕。
//! 与字符串字面量宏版本不同，此处对全部字节求值，不做长度截断。

const HASH_CONSTANT: u32 = 65_599;

/// 计算名称对应的 32 位标识。
pub fn calculate(name: &str) -> u32 {
    let mut hash = name.len() as u32;
    let mut coefficient = HASH_CONSTANT;
    for byte in name.bytes() {
        hash = hash.wrapping_add(coefficient.wrapping_mul(u32::from(byte)));
        coefficient = coefficient.wrapping_mul(HASH_CONSTANT);
    }
    hash
}
