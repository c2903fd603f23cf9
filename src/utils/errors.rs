use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::crypto::{EciesError, NodeId};
use crate::network::eth::EthError;
use crate::network::message::DisconnectReason;

/// Terminal error of a probe. Every failure inside the handshake / frame state machine
/// is fatal to the connection and surfaces exactly once as one of these.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("invalid enode: {0}")]
    InvalidTarget(String),

    #[error("initial socket connect failed: {0}")]
    ConnectFailed(#[source] io::Error),

    #[error("socket error: {0}")]
    Socket(#[from] io::Error),

    #[error("socket closed")]
    SocketClosed,

    #[error("handshake failed: {0}")]
    Handshake(#[from] EciesError),

    #[error("unexpected incoming data: {0}")]
    IncomingDataState(&'static str),

    #[error("invalid header size: {0}")]
    InvalidHeader(#[source] EciesError),

    #[error("failed to send hello message: {0}")]
    SendHello(String),

    #[error("empty body payload: {0}")]
    InvalidBody(#[source] EciesError),

    #[error("failed to parse body payload: {0}")]
    BodyParse(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid identity: expected {expected}, remote declared {received}")]
    InvalidIdentity { expected: NodeId, received: NodeId },

    #[error("useless peer: no shared capabilities")]
    UselessPeer,

    #[error("remote disconnected: {0}")]
    PeerDisconnected(DisconnectReason),

    #[error("{0}")]
    Subprotocol(#[from] EthError),

    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl ProbeError {
    /// Stable tag used in logs and JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            ProbeError::InvalidTarget(_) => "INVALID_ENODE",
            ProbeError::ConnectFailed(_) => "INITIAL_SOCKET_CONNECT_FAILED",
            ProbeError::Socket(_) => "SOCKET_ERROR",
            ProbeError::SocketClosed => "SOCKET_CLOSED",
            ProbeError::Handshake(_) => "HANDSHAKE_FAILED",
            ProbeError::IncomingDataState(_) => "INCOMING_DATA_STATE",
            ProbeError::InvalidHeader(_) => "INVALID_HEADER_SIZE",
            ProbeError::SendHello(_) => "SEND_HELLO_MESSAGE_FAILED",
            ProbeError::InvalidBody(_) => "EMPTY_BODY_MESSAGE",
            ProbeError::BodyParse(_) => "BODY_PARSE_FAILED",
            ProbeError::Protocol(_) => "PROTOCOL_ERROR",
            ProbeError::InvalidIdentity { .. } => "INVALID_IDENTITY",
            ProbeError::UselessPeer => "USELESS_PEER",
            ProbeError::PeerDisconnected(_) => "PEER_DISCONNECTED",
            ProbeError::Subprotocol(EthError::InvalidCode(_)) => "INVALID_MESSAGE_CODE",
            ProbeError::Subprotocol(EthError::Decode(_)) => "DECODE_FAILED",
            ProbeError::Timeout(_) => "TIMEOUT",
            ProbeError::Unknown(_) => "UNKNOWN",
        }
    }

    /// Reason to put in the best-effort DISCONNECT sent while tearing down.
    /// `None` when the remote already left or no session was ever established.
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        match self {
            ProbeError::InvalidTarget(_)
            | ProbeError::ConnectFailed(_)
            | ProbeError::Socket(_)
            | ProbeError::SocketClosed
            | ProbeError::Handshake(_)
            | ProbeError::PeerDisconnected(_) => None,
            ProbeError::InvalidHeader(_)
            | ProbeError::InvalidBody(_)
            | ProbeError::SendHello(_) => Some(DisconnectReason::NetworkError),
            ProbeError::IncomingDataState(_)
            | ProbeError::BodyParse(_)
            | ProbeError::Subprotocol(_)
            | ProbeError::Unknown(_) => Some(DisconnectReason::SubprotocolError),
            ProbeError::Protocol(_) => Some(DisconnectReason::ProtocolError),
            ProbeError::InvalidIdentity { .. } => Some(DisconnectReason::InvalidIdentity),
            ProbeError::UselessPeer => Some(DisconnectReason::UselessPeer),
            ProbeError::Timeout(_) => Some(DisconnectReason::DisconnectRequested),
        }
    }
}

/// Convenience alias
pub type Result<T> = std::result::Result<T, ProbeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ProbeError::SocketClosed.code(), "SOCKET_CLOSED");
        assert_eq!(ProbeError::Timeout(Duration::from_secs(1)).code(), "TIMEOUT");
        assert_eq!(
            ProbeError::PeerDisconnected(DisconnectReason::UselessPeer).code(),
            "PEER_DISCONNECTED"
        );
        let err = ProbeError::Subprotocol(EthError::InvalidCode(3));
        assert_eq!(err.code(), "INVALID_MESSAGE_CODE");
    }

    #[test]
    fn test_disconnect_reason_mapping() {
        let remote = ProbeError::PeerDisconnected(DisconnectReason::TooManyPeers);
        assert_eq!(remote.disconnect_reason(), None);
        let useless = ProbeError::UselessPeer.disconnect_reason();
        assert_eq!(useless, Some(DisconnectReason::UselessPeer));
        assert_eq!(
            ProbeError::InvalidBody(EciesError::TagCheckBodyFailed).disconnect_reason(),
            Some(DisconnectReason::NetworkError)
        );
        assert_eq!(
            ProbeError::Protocol("x".into()).disconnect_reason(),
            Some(DisconnectReason::ProtocolError)
        );
    }

    #[test]
    fn test_display_carries_reason() {
        let err = ProbeError::PeerDisconnected(DisconnectReason::UselessPeer);
        assert_eq!(err.to_string(), "remote disconnected: useless peer");
    }
}
