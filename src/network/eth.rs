//! `eth` subprotocol: only the Status (0x00) message is understood.
//! <https://github.com/ethereum/devp2p/blob/master/caps/eth.md#status-0x00>

use alloy_primitives::U256;
use serde::Serialize;
use thiserror::Error;

use crate::network::rlp::RlpItem;
use crate::utils::serde_helpers::{as_decimal, prefixed_hex};

pub const ETH_PROTOCOL_NAME: &str = "eth";
/// Message codes reserved by eth/66..68.
pub const ETH_MESSAGE_COUNT: u64 = 17;
pub const STATUS: u64 = 0x00;

const STATUS_FIELDS: usize = 6;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EthError {
    #[error("invalid code: {0}")]
    InvalidCode(u64),

    #[error("failed to decode status: {0}")]
    Decode(String),
}

/// EIP-2124 fork identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForkId {
    pub hash: String,
    pub next: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub protocol_version: u64,
    #[serde(serialize_with = "as_decimal")]
    pub network_id: U256,
    #[serde(serialize_with = "as_decimal")]
    pub total_difficulty: U256,
    pub best_hash: String,
    pub genesis_hash: String,
    pub fork_id: ForkId,
}

/// Handler instantiated for a negotiated `eth` capability.
#[derive(Debug, Clone)]
pub struct EthHandler {
    version: u64,
}

impl EthHandler {
    pub fn new(version: u64) -> Self {
        Self { version }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// `code` is relative to the protocol offset; `payload` is already decompressed.
    pub fn handle(&self, code: u64, payload: &[u8]) -> Result<Status, EthError> {
        if code != STATUS {
            return Err(EthError::InvalidCode(code));
        }
        decode_status(payload)
    }
}

pub fn decode_status(payload: &[u8]) -> Result<Status, EthError> {
    let item = RlpItem::decode_exact(payload).map_err(|e| EthError::Decode(e.to_string()))?;
    let fields = item.as_list().ok_or_else(|| decode_err("status is not a list"))?;
    if fields.len() != STATUS_FIELDS {
        return Err(EthError::Decode(format!(
            "expected {STATUS_FIELDS} status fields, got {}",
            fields.len()
        )));
    }
    let fork = fields[5].as_list().ok_or_else(|| decode_err("fork id is not a list"))?;
    if fork.len() != 2 {
        return Err(EthError::Decode(format!("expected 2 fork id fields, got {}", fork.len())));
    }

    let next = fork[1].as_bytes().ok_or_else(|| decode_err("invalid fork next"))?;
    Ok(Status {
        protocol_version: fields[0].to_u64().ok_or_else(|| decode_err("invalid protocol version"))?,
        network_id: fields[1].to_u256().ok_or_else(|| decode_err("invalid network id"))?,
        total_difficulty: fields[2]
            .to_u256()
            .ok_or_else(|| decode_err("invalid total difficulty"))?,
        best_hash: fixed_hex(&fields[3], 32, "best hash")?,
        genesis_hash: fixed_hex(&fields[4], 32, "genesis hash")?,
        fork_id: ForkId {
            hash: fixed_hex(&fork[0], 4, "fork hash")?,
            next: if next.is_empty() { "0x00".to_string() } else { prefixed_hex(next) },
        },
    })
}

fn fixed_hex(item: &RlpItem, len: usize, what: &str) -> Result<String, EthError> {
    match item.as_bytes() {
        Some(bytes) if bytes.len() == len => Ok(prefixed_hex(bytes)),
        Some(bytes) => {
            Err(EthError::Decode(format!("{what} is {} bytes, expected {len}", bytes.len())))
        }
        None => Err(EthError::Decode(format!("{what} is a list"))),
    }
}

fn decode_err(msg: &str) -> EthError {
    EthError::Decode(msg.to_string())
}
