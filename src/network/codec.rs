use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::network::handshake::{
    padded_len, FrameCipher, Handshake, HEADER_LEN, MAC_LEN, PLAIN_ACK_LEN, PLAIN_ACK_MARKER,
};
use crate::network::rlp::split_message_code;
use crate::utils::ProbeError;

/// What the transport yields to the connection driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// Ack parsed, session secrets derived; HELLO may now be sent.
    Ack,
    /// One decrypted frame. `payload` is still compressed if the session compresses.
    Message { code: u64, payload: Bytes },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Auth,
    /// `payload` is sent as given; compression is the caller's concern.
    Message { code: u64, payload: Bytes },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Auth,
    Ack,
    Header,
    Body { len: usize },
}

/// RLPx initiator transport: `Auth -> Ack -> Header -> Body -> Header ...`.
///
/// Bytes are only consumed once a state's full requirement is buffered, so the
/// output does not depend on how the stream was fragmented.
pub struct RlpxCodec {
    handshake: Handshake,
    cipher: Option<FrameCipher>,
    state: State,
    legacy_auth: bool,
}

impl RlpxCodec {
    pub fn new(handshake: Handshake, legacy_auth: bool) -> Self {
        Self { handshake, cipher: None, state: State::Auth, legacy_auth }
    }

    pub fn is_established(&self) -> bool {
        self.cipher.is_some()
    }

    /// Bytes needed before the ack can be parsed, or `None` if not even the prefix is here.
    fn ack_len(src: &[u8]) -> Option<usize> {
        match src {
            [] => None,
            [PLAIN_ACK_MARKER, ..] => Some(PLAIN_ACK_LEN),
            [_] => None,
            [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo]) as usize + 2),
        }
    }

    fn decode_ack(&mut self, src: &mut BytesMut) -> Result<Option<Incoming>, ProbeError> {
        let Some(required) = Self::ack_len(src) else {
            return Ok(None);
        };
        if src.len() < required {
            src.reserve(required - src.len());
            return Ok(None);
        }
        let ack = src.split_to(required);
        let cipher = if ack[0] == PLAIN_ACK_MARKER {
            self.handshake.parse_ack_plain(&ack)?
        } else {
            self.handshake.parse_ack_eip8(&ack)?
        };
        trace!(len = required, "ack received");
        self.cipher = Some(cipher);
        self.state = State::Header;
        Ok(Some(Incoming::Ack))
    }

    fn cipher(&mut self) -> Result<&mut FrameCipher, ProbeError> {
        self.cipher
            .as_mut()
            .ok_or(ProbeError::IncomingDataState("frame before session was established"))
    }
}

impl Decoder for RlpxCodec {
    type Item = Incoming;
    type Error = ProbeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                State::Auth => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    return Err(ProbeError::IncomingDataState("data received before auth was sent"));
                }
                State::Ack => return self.decode_ack(src),
                State::Header => {
                    if src.len() < HEADER_LEN {
                        return Ok(None);
                    }
                    let mut header = src.split_to(HEADER_LEN);
                    let len = self
                        .cipher()?
                        .decrypt_header(&mut header)
                        .map_err(ProbeError::InvalidHeader)?;
                    self.state = State::Body { len };
                }
                State::Body { len } => {
                    let required = padded_len(len) + MAC_LEN;
                    if src.len() < required {
                        src.reserve(required - src.len());
                        return Ok(None);
                    }
                    let mut body = src.split_to(required);
                    let frame = self
                        .cipher()?
                        .decrypt_body(&mut body, len)
                        .map_err(ProbeError::InvalidBody)?;
                    let (code, payload) =
                        split_message_code(frame).map_err(|e| {
                            ProbeError::BodyParse(format!("message code: {e}"))
                        })?;
                    let payload = Bytes::copy_from_slice(payload);
                    self.state = State::Header;
                    return Ok(Some(Incoming::Message { code, payload }));
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // a partial frame at EOF is reported by the driver as a closed socket
        self.decode(buf)
    }
}

impl Encoder<Outgoing> for RlpxCodec {
    type Error = ProbeError;

    fn encode(&mut self, item: Outgoing, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Outgoing::Auth => {
                let auth = if self.legacy_auth {
                    self.handshake.create_auth_plain()?
                } else {
                    self.handshake.create_auth_eip8()?
                };
                dst.extend_from_slice(&auth);
                self.state = State::Ack;
            }
            Outgoing::Message { code, payload } => {
                let mut frame = alloy_rlp::encode(code);
                frame.extend_from_slice(&payload);
                let cipher = self
                    .cipher
                    .as_mut()
                    .ok_or_else(|| {
                        ProbeError::Protocol("message sent before session was established".into())
                    })?;
                cipher
                    .encrypt_header(frame.len(), dst)
                    .map_err(|e| ProbeError::Protocol(format!("cannot frame message: {e}")))?;
                cipher.encrypt_body(&frame, dst);
            }
        }
        Ok(())
    }
}
