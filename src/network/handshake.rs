//! RLPx encrypted session, initiator side.
//!
//! `Handshake` builds the auth message and parses the ack; parsing the ack yields a
//! `FrameCipher` holding the derived AES/MAC state for the rest of the connection.
//! <https://github.com/ethereum/devp2p/blob/master/rlpx.md#initial-handshake>

use aes::cipher::{generic_array::GenericArray, KeyIvInit, StreamCipher};
use alloy_primitives::{keccak256, B128, B256};
use alloy_rlp::RlpEncodable;
use bytes::{Bytes, BytesMut};
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use secp256k1::{PublicKey, SecretKey, SECP256K1};

use crate::crypto::{
    ecdh_x, ecies, id2pk, pk2id, sign_recoverable, EciesError, FrameMac, NodeId, NodeKey,
    ECIES_OVERHEAD,
};
use crate::network::rlp::RlpItem;

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// auth-vsn / ack-vsn
pub const HANDSHAKE_VERSION: u64 = 4;
/// Legacy (pre EIP-8) auth: sig(65) || keccak(ephemeral id)(32) || id(64) || nonce(32) || 0x00
pub const PLAIN_AUTH_LEN: usize = 194 + ECIES_OVERHEAD;
/// Legacy ack: ephemeral id(64) || nonce(32) || 0x00
pub const PLAIN_ACK_LEN: usize = 97 + ECIES_OVERHEAD;
/// First byte of a legacy ack: the uncompressed ECIES public key marker.
pub const PLAIN_ACK_MARKER: u8 = 0x04;
/// 16 bytes encrypted header + 16 bytes header MAC.
pub const HEADER_LEN: usize = 32;
pub const MAC_LEN: usize = 16;
/// Frame sizes are carried in 24 bits.
pub const MAX_FRAME_SIZE: usize = (1 << 24) - 1;
/// rlp([capability-id = 0, context-id = 0])
const HEADER_DATA: [u8; 3] = [0xc2, 0x80, 0x80];

#[derive(RlpEncodable)]
struct AuthBody<'a> {
    signature: &'a [u8],
    id: NodeId,
    nonce: B256,
    version: u64,
}

pub struct Handshake {
    key: NodeKey,
    remote_public: PublicKey,
    ephemeral: SecretKey,
    nonce: B256,
    auth: Option<Bytes>,
}

impl Handshake {
    pub fn new(key: NodeKey, remote_id: &NodeId) -> Result<Self, EciesError> {
        let remote_public = id2pk(remote_id).map_err(|_| EciesError::InvalidRemoteId)?;
        let mut nonce = B256::ZERO;
        OsRng.fill_bytes(nonce.as_mut_slice());
        Ok(Self {
            key,
            remote_public,
            ephemeral: SecretKey::new(&mut OsRng),
            nonce,
            auth: None,
        })
    }

    fn signature(&self) -> [u8; 65] {
        let static_shared = ecdh_x(&self.remote_public, self.key.secret());
        sign_recoverable(&xor(&static_shared, &self.nonce), &self.ephemeral)
    }

    fn ephemeral_id(&self) -> NodeId {
        pk2id(&PublicKey::from_secret_key(SECP256K1, &self.ephemeral))
    }

    /// EIP-8 auth: `size (u16 be) || ecies(rlp([sig, id, nonce, 4]) || padding)`.
    pub fn create_auth_eip8(&mut self) -> Result<Bytes, EciesError> {
        let signature = self.signature();
        let mut body = alloy_rlp::encode(AuthBody {
            signature: &signature,
            id: self.key.id(),
            nonce: self.nonce,
            version: HANDSHAKE_VERSION,
        });
        body.resize(body.len() + OsRng.gen_range(100..=300), 0);

        let total = body.len() + ECIES_OVERHEAD;
        let size = u16::try_from(total).map_err(|_| EciesError::TooLarge(total))?;
        let prefix = size.to_be_bytes();
        let sealed = ecies::encrypt(&self.remote_public, &body, &prefix)?;

        let mut auth = BytesMut::with_capacity(2 + sealed.len());
        auth.extend_from_slice(&prefix);
        auth.extend_from_slice(&sealed);
        let auth = auth.freeze();
        self.auth = Some(auth.clone());
        Ok(auth)
    }

    /// Legacy fixed-size auth.
    pub fn create_auth_plain(&mut self) -> Result<Bytes, EciesError> {
        let mut body = Vec::with_capacity(194);
        body.extend_from_slice(&self.signature());
        body.extend_from_slice(keccak256(self.ephemeral_id()).as_slice());
        body.extend_from_slice(self.key.id().as_slice());
        body.extend_from_slice(self.nonce.as_slice());
        body.push(0);

        let auth = Bytes::from(ecies::encrypt(&self.remote_public, &body, &[])?);
        self.auth = Some(auth.clone());
        Ok(auth)
    }

    pub fn parse_ack_plain(&mut self, ack: &[u8]) -> Result<FrameCipher, EciesError> {
        if ack.len() != PLAIN_ACK_LEN {
            return Err(EciesError::InvalidAck("unexpected legacy ack length"));
        }
        let body = ecies::decrypt(self.key.secret(), ack, &[])?;
        if body.len() != 97 {
            return Err(EciesError::InvalidAck("unexpected legacy ack body length"));
        }
        self.establish(&body[..64], &body[64..96], ack)
    }

    pub fn parse_ack_eip8(&mut self, ack: &[u8]) -> Result<FrameCipher, EciesError> {
        if ack.len() < 2 + ECIES_OVERHEAD {
            return Err(EciesError::TooShort(ack.len()));
        }
        let (prefix, sealed) = ack.split_at(2);
        let body = ecies::decrypt(self.key.secret(), sealed, prefix)?;

        let item = RlpItem::decode(&mut &body[..])
            .map_err(|_| EciesError::InvalidAck("ack body is not rlp"))?;
        let fields = item.as_list().ok_or(EciesError::InvalidAck("ack body is not a list"))?;
        if fields.len() < 2 {
            return Err(EciesError::InvalidAck("ack body has too few fields"));
        }
        let ephemeral =
            fields[0].as_bytes().ok_or(EciesError::InvalidAck("invalid ephemeral key"))?;
        let nonce = fields[1].as_bytes().ok_or(EciesError::InvalidAck("invalid nonce"))?;
        self.establish(ephemeral, nonce, ack)
    }

    fn establish(
        &mut self,
        remote_ephemeral: &[u8],
        remote_nonce: &[u8],
        ack: &[u8],
    ) -> Result<FrameCipher, EciesError> {
        if remote_ephemeral.len() != 64 {
            return Err(EciesError::InvalidAck("ephemeral key must be 64 bytes"));
        }
        if remote_nonce.len() != 32 {
            return Err(EciesError::InvalidAck("nonce must be 32 bytes"));
        }
        let auth = self.auth.as_ref().ok_or(EciesError::AuthNotSent)?;
        let remote_ephemeral = id2pk(&NodeId::from_slice(remote_ephemeral))?;
        let ephemeral_shared = ecdh_x(&remote_ephemeral, &self.ephemeral);
        Ok(FrameCipher::derive(
            &ephemeral_shared,
            &self.nonce,
            &B256::from_slice(remote_nonce),
            auth,
            ack,
            true,
        ))
    }
}

pub(crate) fn xor(a: &B256, b: &B256) -> B256 {
    let mut out = B256::ZERO;
    for (o, (x, y)) in out.iter_mut().zip(a.iter().zip(b.iter())) {
        *o = x ^ y;
    }
    out
}

/// Per-connection frame crypto: AES-256-CTR streams plus running MACs in each direction.
pub struct FrameCipher {
    ingress_aes: Aes256Ctr,
    egress_aes: Aes256Ctr,
    ingress_mac: FrameMac,
    egress_mac: FrameMac,
}

impl FrameCipher {
    /// Derive session secrets. `local_msg`/`remote_msg` are the complete auth/ack
    /// packets as they went over the wire (EIP-8 size prefix included).
    pub(crate) fn derive(
        ephemeral_shared: &B256,
        local_nonce: &B256,
        remote_nonce: &B256,
        local_msg: &[u8],
        remote_msg: &[u8],
        initiator: bool,
    ) -> Self {
        let (initiator_nonce, recipient_nonce) = if initiator {
            (local_nonce, remote_nonce)
        } else {
            (remote_nonce, local_nonce)
        };
        let h_nonce = keccak256([recipient_nonce.as_slice(), initiator_nonce.as_slice()].concat());
        let shared_secret = keccak256([ephemeral_shared.as_slice(), h_nonce.as_slice()].concat());
        let aes_secret =
            keccak256([ephemeral_shared.as_slice(), shared_secret.as_slice()].concat());
        let mac_secret = keccak256([ephemeral_shared.as_slice(), aes_secret.as_slice()].concat());

        let iv = [0u8; 16];
        let aes = || {
            Aes256Ctr::new(
                GenericArray::from_slice(aes_secret.as_slice()),
                GenericArray::from_slice(&iv),
            )
        };

        let mut ingress_mac = FrameMac::new(&mac_secret);
        ingress_mac.update(xor(&mac_secret, local_nonce).as_slice());
        ingress_mac.update(remote_msg);
        let mut egress_mac = FrameMac::new(&mac_secret);
        egress_mac.update(xor(&mac_secret, remote_nonce).as_slice());
        egress_mac.update(local_msg);

        Self { ingress_aes: aes(), egress_aes: aes(), ingress_mac, egress_mac }
    }

    /// Append a 32-byte header announcing a frame of `len` bytes.
    pub fn encrypt_header(&mut self, len: usize, out: &mut BytesMut) -> Result<(), EciesError> {
        if len > MAX_FRAME_SIZE {
            return Err(EciesError::TooLarge(len));
        }
        let mut header = [0u8; 16];
        header[..3].copy_from_slice(&(len as u32).to_be_bytes()[1..]);
        header[3..6].copy_from_slice(&HEADER_DATA);

        self.egress_aes.apply_keystream(&mut header);
        self.egress_mac.update_header(&header);
        out.extend_from_slice(&header);
        out.extend_from_slice(self.egress_mac.digest().as_slice());
        Ok(())
    }

    /// Verify and decrypt a 32-byte header in place, returning the announced frame size.
    pub fn decrypt_header(&mut self, data: &mut [u8]) -> Result<usize, EciesError> {
        if data.len() != HEADER_LEN {
            return Err(EciesError::TooShort(data.len()));
        }
        let (header, mac) = data.split_at_mut(16);
        self.ingress_mac.update_header(header);
        if self.ingress_mac.digest() != B128::from_slice(mac) {
            return Err(EciesError::TagCheckHeaderFailed);
        }
        self.ingress_aes.apply_keystream(header);
        Ok(u32::from_be_bytes([0, header[0], header[1], header[2]]) as usize)
    }

    /// Append the zero-padded, encrypted frame body followed by its MAC.
    pub fn encrypt_body(&mut self, data: &[u8], out: &mut BytesMut) {
        let start = out.len();
        out.extend_from_slice(data);
        out.resize(start + padded_len(data.len()), 0);

        let body = &mut out[start..];
        self.egress_aes.apply_keystream(body);
        self.egress_mac.update_body(body);
        let tag = self.egress_mac.digest();
        out.extend_from_slice(tag.as_slice());
    }

    /// Verify and decrypt a padded body (`padded_len(len) + MAC_LEN` bytes) in place,
    /// returning the `len` meaningful bytes.
    pub fn decrypt_body<'a>(
        &mut self,
        data: &'a mut [u8],
        len: usize,
    ) -> Result<&'a [u8], EciesError> {
        if data.len() < MAC_LEN || data.len() - MAC_LEN < len {
            return Err(EciesError::TooShort(data.len()));
        }
        let split = data.len() - MAC_LEN;
        let (body, mac) = data.split_at_mut(split);
        self.ingress_mac.update_body(body);
        if self.ingress_mac.digest() != B128::from_slice(mac) {
            return Err(EciesError::TagCheckBodyFailed);
        }
        self.ingress_aes.apply_keystream(body);
        Ok(&body[..len])
    }
}

/// Body length rounded up to the AES block size.
pub fn padded_len(len: usize) -> usize {
    len.next_multiple_of(16)
}
