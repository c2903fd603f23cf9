//! Routes decrypted frames by message code: base protocol below 16, negotiated
//! subprotocols above, with snappy handling per the remote HELLO version.

use bytes::Bytes;
use tracing::{debug, trace};

use crate::crypto::NodeId;
use crate::network::capability::{accept_hello, LocalCapability, SharedProtocol, SubprotocolKind};
use crate::network::eth::{EthError, EthHandler, Status};
use crate::network::message::{
    DisconnectReason, Hello, BASE_PROTOCOL_LENGTH, DISCONNECT, HELLO, PING, PONG,
    SNAPPY_PROTOCOL_VERSION,
};
use crate::network::rlp::{bytes_to_u64, RlpItem};
use crate::utils::{ProbeError, Result};

/// Handler bound to a negotiated protocol.
#[derive(Debug, Clone)]
pub enum Subprotocol {
    Eth(EthHandler),
}

impl Subprotocol {
    fn for_protocol(protocol: &SharedProtocol) -> Self {
        match protocol.kind {
            SubprotocolKind::Eth => Subprotocol::Eth(EthHandler::new(protocol.version)),
        }
    }

    fn handle(
        &self,
        code: u64,
        payload: &[u8],
    ) -> std::result::Result<SubprotocolMessage, EthError> {
        match self {
            Subprotocol::Eth(eth) => {
                trace!(version = eth.version(), code, "eth message");
                eth.handle(code, payload).map(SubprotocolMessage::EthStatus)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubprotocolMessage {
    EthStatus(Status),
}

/// Result of routing one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    Hello { client_id: String },
    Ping,
    Pong,
    /// Base protocol code with no behaviour attached.
    Ignored { code: u64 },
    Subprotocol(SubprotocolMessage),
}

pub struct Dispatcher {
    local: Vec<LocalCapability>,
    expected_remote: Option<NodeId>,
    hello: Option<Hello>,
    protocols: Vec<(SharedProtocol, Subprotocol)>,
}

impl Dispatcher {
    pub fn new(local: Vec<LocalCapability>, expected_remote: Option<NodeId>) -> Self {
        Self { local, expected_remote, hello: None, protocols: Vec::new() }
    }

    pub fn local_capabilities(&self) -> &[LocalCapability] {
        &self.local
    }

    pub fn remote_hello(&self) -> Option<&Hello> {
        self.hello.as_ref()
    }

    pub fn protocols(&self) -> impl Iterator<Item = &SharedProtocol> {
        self.protocols.iter().map(|(p, _)| p)
    }

    /// Non-HELLO payloads are snappy-compressed in both directions once the remote
    /// HELLO advertises version 5 or later.
    pub fn compression_enabled(&self) -> bool {
        self.hello
            .as_ref()
            .is_some_and(|h| h.protocol_version >= SNAPPY_PROTOCOL_VERSION)
    }

    pub fn route(&mut self, code: u64, payload: &[u8]) -> Result<Routed> {
        trace!(code, len = payload.len(), "routing frame");
        match code {
            HELLO => self.on_hello(payload),
            DISCONNECT => Err(ProbeError::PeerDisconnected(self.disconnect_reason(payload))),
            _ if self.hello.is_none() => {
                Err(ProbeError::Protocol(format!("message code {code} before hello")))
            }
            _ if code < BASE_PROTOCOL_LENGTH => {
                self.decompress(payload)?;
                Ok(match code {
                    PING => Routed::Ping,
                    PONG => Routed::Pong,
                    _ => Routed::Ignored { code },
                })
            }
            _ => self.on_subprotocol(code, payload),
        }
    }

    fn on_hello(&mut self, payload: &[u8]) -> Result<Routed> {
        if self.hello.is_some() {
            return Err(ProbeError::Protocol("duplicate hello".into()));
        }
        let hello = Hello::decode_payload(payload).map_err(ProbeError::BodyParse)?;
        let protocols = accept_hello(&hello, self.expected_remote.as_ref(), &self.local)?;
        let shared: Vec<_> = protocols
            .iter()
            .map(|p| format!("{}/{}@{}", p.name, p.version, p.offset))
            .collect();
        debug!(
            client = %hello.client_id,
            version = hello.protocol_version,
            ?shared,
            "hello accepted"
        );
        self.protocols = protocols
            .into_iter()
            .map(|p| {
                let handler = Subprotocol::for_protocol(&p);
                (p, handler)
            })
            .collect();
        let client_id = hello.client_id.clone();
        self.hello = Some(hello);
        Ok(Routed::Hello { client_id })
    }

    fn on_subprotocol(&self, code: u64, payload: &[u8]) -> Result<Routed> {
        let (protocol, handler) = self
            .protocols
            .iter()
            .find(|(p, _)| p.contains(code))
            .ok_or_else(|| {
                ProbeError::Protocol(format!("no shared protocol for message code {code}"))
            })?;
        let payload = self.decompress(payload)?;
        let message = handler.handle(code - protocol.offset, &payload)?;
        Ok(Routed::Subprotocol(message))
    }

    fn decompress(&self, payload: &[u8]) -> Result<Bytes> {
        if !self.compression_enabled() {
            return Ok(Bytes::copy_from_slice(payload));
        }
        snap::raw::Decoder::new()
            .decompress_vec(payload)
            .map(Bytes::from)
            .map_err(|e| ProbeError::BodyParse(format!("snappy: {e}")))
    }

    /// Peers disagree on whether DISCONNECT is compressed, so both readings are tried
    /// (the expected one first) before settling on the default reason.
    fn disconnect_reason(&self, payload: &[u8]) -> DisconnectReason {
        let decompressed = snap::raw::Decoder::new().decompress_vec(payload).ok();
        let raw = Some(payload.to_vec());
        let candidates = if self.compression_enabled() {
            [decompressed, raw]
        } else {
            [raw, decompressed]
        };
        candidates
            .into_iter()
            .flatten()
            .find_map(|bytes| parse_disconnect_reason(&bytes))
            .unwrap_or_default()
    }
}

/// Accepts `rlp([reason])` or a bare `rlp(reason)`. Unknown codes fall back to the default.
fn parse_disconnect_reason(payload: &[u8]) -> Option<DisconnectReason> {
    let item = RlpItem::decode_exact(payload).ok()?;
    let code = match &item {
        RlpItem::Bytes(b) => bytes_to_u64(b)?,
        RlpItem::List(items) => items.first()?.to_u64()?,
    };
    Some(DisconnectReason::from_code(code).unwrap_or_default())
}
