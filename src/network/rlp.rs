//! Generic RLP item tree, used wherever a payload is decoded leniently
//! (HELLO, DISCONNECT, acks, Status) instead of through a derived struct.

use alloy_primitives::U256;
use alloy_rlp::{BufMut, Encodable, Header};
use bytes::Bytes;

/// Nesting guard for adversarial payloads.
const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RlpItem {
    Bytes(Bytes),
    List(Vec<RlpItem>),
}

impl RlpItem {
    /// Decode the first item in `buf`, advancing past it. Trailing bytes are left alone.
    pub fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        Self::decode_at(buf, 0)
    }

    /// Decode a buffer that must hold exactly one item.
    pub fn decode_exact(data: &[u8]) -> alloy_rlp::Result<Self> {
        let mut buf = data;
        let item = Self::decode(&mut buf)?;
        if !buf.is_empty() {
            return Err(alloy_rlp::Error::Custom("trailing bytes after rlp item"));
        }
        Ok(item)
    }

    fn decode_at(buf: &mut &[u8], depth: usize) -> alloy_rlp::Result<Self> {
        if depth > MAX_DEPTH {
            return Err(alloy_rlp::Error::Custom("rlp nesting too deep"));
        }
        let header = Header::decode(buf)?;
        let (mut payload, rest) = buf.split_at(header.payload_length);
        *buf = rest;
        if !header.list {
            return Ok(RlpItem::Bytes(Bytes::copy_from_slice(payload)));
        }
        let mut items = Vec::new();
        while !payload.is_empty() {
            items.push(Self::decode_at(&mut payload, depth + 1)?);
        }
        Ok(RlpItem::List(items))
    }

    /// Minimal big-endian encoding of an unsigned integer.
    pub fn uint(value: u64) -> Self {
        let be = value.to_be_bytes();
        let skip = be.iter().take_while(|b| **b == 0).count();
        RlpItem::Bytes(Bytes::copy_from_slice(&be[skip..]))
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RlpItem::Bytes(b) => Some(b),
            RlpItem::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[RlpItem]> {
        match self {
            RlpItem::List(items) => Some(items),
            RlpItem::Bytes(_) => None,
        }
    }

    pub fn to_u64(&self) -> Option<u64> {
        self.as_bytes().and_then(bytes_to_u64)
    }

    pub fn to_u256(&self) -> Option<U256> {
        self.as_bytes().and_then(U256::try_from_be_slice)
    }

    fn payload_length(&self) -> usize {
        match self {
            RlpItem::Bytes(b) => b.as_ref().length(),
            RlpItem::List(items) => items.iter().map(Encodable::length).sum(),
        }
    }
}

impl Encodable for RlpItem {
    fn encode(&self, out: &mut dyn BufMut) {
        match self {
            RlpItem::Bytes(b) => b.as_ref().encode(out),
            RlpItem::List(items) => {
                Header { list: true, payload_length: self.payload_length() }.encode(out);
                for item in items {
                    item.encode(out);
                }
            }
        }
    }

    fn length(&self) -> usize {
        match self {
            RlpItem::Bytes(b) => b.as_ref().length(),
            RlpItem::List(_) => {
                let payload_length = self.payload_length();
                alloy_rlp::length_of_length(payload_length) + payload_length
            }
        }
    }
}

/// Lenient big-endian integer: leading zeros tolerated, at most 8 significant bytes.
pub fn bytes_to_u64(bytes: &[u8]) -> Option<u64> {
    let start = bytes.iter().take_while(|b| **b == 0).count();
    let significant = &bytes[start..];
    if significant.len() > 8 {
        return None;
    }
    Some(significant.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

/// Split a decrypted frame into its RLP-encoded message code and the remaining payload.
pub fn split_message_code(frame: &[u8]) -> alloy_rlp::Result<(u64, &[u8])> {
    let mut buf = frame;
    let header = Header::decode(&mut buf)?;
    if header.list {
        return Err(alloy_rlp::Error::UnexpectedList);
    }
    let (code, payload) = buf.split_at(header.payload_length);
    let code = bytes_to_u64(code).ok_or(alloy_rlp::Error::Overflow)?;
    Ok((code, payload))
}
