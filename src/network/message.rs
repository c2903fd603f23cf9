use std::fmt;

use alloy_rlp::RlpEncodable;
use bytes::Bytes;
use serde::Serialize;

use crate::crypto::NodeId;
use crate::network::rlp::RlpItem;

/// devp2p base protocol version we advertise.
pub const BASE_PROTOCOL_VERSION: u64 = 5;
/// Message codes reserved by the base protocol; subprotocol offsets start here.
pub const BASE_PROTOCOL_LENGTH: u64 = 16;
/// From this remote HELLO version on, non-HELLO payloads are snappy-compressed.
pub const SNAPPY_PROTOCOL_VERSION: u64 = 5;

pub const HELLO: u64 = 0x00;
pub const DISCONNECT: u64 = 0x01;
pub const PING: u64 = 0x02;
pub const PONG: u64 = 0x03;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    #[default]
    DisconnectRequested,
    NetworkError,
    ProtocolError,
    UselessPeer,
    TooManyPeers,
    AlreadyConnected,
    IncompatibleVersion,
    InvalidIdentity,
    ClientQuitting,
    UnexpectedIdentity,
    SameIdentity,
    Timeout,
    SubprotocolError,
}

impl DisconnectReason {
    pub fn code(self) -> u8 {
        match self {
            DisconnectReason::DisconnectRequested => 0x00,
            DisconnectReason::NetworkError => 0x01,
            DisconnectReason::ProtocolError => 0x02,
            DisconnectReason::UselessPeer => 0x03,
            DisconnectReason::TooManyPeers => 0x04,
            DisconnectReason::AlreadyConnected => 0x05,
            DisconnectReason::IncompatibleVersion => 0x06,
            DisconnectReason::InvalidIdentity => 0x07,
            DisconnectReason::ClientQuitting => 0x08,
            DisconnectReason::UnexpectedIdentity => 0x09,
            DisconnectReason::SameIdentity => 0x0a,
            DisconnectReason::Timeout => 0x0b,
            DisconnectReason::SubprotocolError => 0x10,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        Some(match code {
            0x00 => DisconnectReason::DisconnectRequested,
            0x01 => DisconnectReason::NetworkError,
            0x02 => DisconnectReason::ProtocolError,
            0x03 => DisconnectReason::UselessPeer,
            0x04 => DisconnectReason::TooManyPeers,
            0x05 => DisconnectReason::AlreadyConnected,
            0x06 => DisconnectReason::IncompatibleVersion,
            0x07 => DisconnectReason::InvalidIdentity,
            0x08 => DisconnectReason::ClientQuitting,
            0x09 => DisconnectReason::UnexpectedIdentity,
            0x0a => DisconnectReason::SameIdentity,
            0x0b => DisconnectReason::Timeout,
            0x10 => DisconnectReason::SubprotocolError,
            _ => return None,
        })
    }

    /// DISCONNECT payload: `rlp([reason])`, uncompressed.
    pub fn to_payload(self) -> Bytes {
        alloy_rlp::encode(RlpItem::List(vec![RlpItem::uint(u64::from(self.code()))])).into()
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DisconnectReason::DisconnectRequested => "disconnect requested",
            DisconnectReason::NetworkError => "network error",
            DisconnectReason::ProtocolError => "protocol error",
            DisconnectReason::UselessPeer => "useless peer",
            DisconnectReason::TooManyPeers => "too many peers",
            DisconnectReason::AlreadyConnected => "already connected",
            DisconnectReason::IncompatibleVersion => "incompatible p2p protocol version",
            DisconnectReason::InvalidIdentity => "invalid identity",
            DisconnectReason::ClientQuitting => "client quitting",
            DisconnectReason::UnexpectedIdentity => "unexpected identity",
            DisconnectReason::SameIdentity => "connected to self",
            DisconnectReason::Timeout => "timeout",
            DisconnectReason::SubprotocolError => "subprotocol error",
        };
        f.write_str(s)
    }
}

/// One `(name, version)` entry of a HELLO capability list.
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable)]
pub struct Capability {
    pub name: String,
    pub version: u64,
}

impl Capability {
    pub fn new(name: impl Into<String>, version: u64) -> Self {
        Self { name: name.into(), version }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

/// HELLO payload. Field order is fixed by the wire format.
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable)]
pub struct Hello {
    pub protocol_version: u64,
    pub client_id: String,
    pub capabilities: Vec<Capability>,
    pub listen_port: u64,
    pub node_id: NodeId,
}

impl Hello {
    pub fn encode_payload(&self) -> Bytes {
        alloy_rlp::encode(self).into()
    }

    /// Parse a HELLO payload. Extra trailing list elements are ignored for forward
    /// compatibility; the first five are mandatory.
    pub fn decode_payload(payload: &[u8]) -> Result<Self, String> {
        let item = RlpItem::decode_exact(payload).map_err(|e| format!("hello rlp: {e}"))?;
        let fields = item.as_list().ok_or("hello is not a list")?;
        if fields.len() < 5 {
            return Err(format!("hello has {} fields, expected at least 5", fields.len()));
        }

        let protocol_version = fields[0].to_u64().ok_or("invalid hello protocol version")?;
        let client_id = fields[1]
            .as_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .ok_or("invalid hello client id")?;
        let capabilities = fields[2]
            .as_list()
            .ok_or("hello capabilities is not a list")?
            .iter()
            .map(|cap| {
                let pair =
                    cap.as_list().filter(|p| p.len() >= 2).ok_or("invalid capability entry")?;
                let name = pair[0].as_bytes().ok_or("invalid capability name")?;
                let version = pair[1].to_u64().ok_or("invalid capability version")?;
                Ok(Capability::new(String::from_utf8_lossy(name), version))
            })
            .collect::<Result<Vec<_>, &str>>()?;
        let listen_port = fields[3].to_u64().ok_or("invalid hello listen port")?;
        let node_id = fields[4]
            .as_bytes()
            .filter(|b| b.len() == NodeId::len_bytes())
            .map(NodeId::from_slice)
            .ok_or("invalid hello node id")?;

        Ok(Self { protocol_version, client_id, capabilities, listen_port, node_id })
    }
}
