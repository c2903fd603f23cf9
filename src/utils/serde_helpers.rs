use alloy_primitives::U256;
use serde::Serializer;

/// Serialize a U256 as a decimal string (JSON numbers can't carry 256 bits).
pub fn as_decimal<S>(value: &U256, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.serialize_str(&value.to_string())
}

/// `0x`-prefixed lowercase hex.
pub fn prefixed_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}
