use alloy_primitives::B512;
use secp256k1::{PublicKey, SecretKey, SECP256K1};

/// 64-byte node identity: the uncompressed secp256k1 public key without the 0x04 prefix.
pub type NodeId = B512;

/// Local static key pair. A fresh one is generated per probe unless configured.
#[derive(Clone)]
pub struct NodeKey {
    secret: SecretKey,
    id: NodeId,
}

impl NodeKey {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let secret = SecretKey::new(&mut secp256k1::rand::thread_rng());
        Self::from_secret(secret)
    }

    /// Construct from raw 32-byte secret
    pub fn from_bytes(secret: &[u8]) -> Result<Self, secp256k1::Error> {
        Ok(Self::from_secret(SecretKey::from_slice(secret)?))
    }

    fn from_secret(secret: SecretKey) -> Self {
        let id = pk2id(&PublicKey::from_secret_key(SECP256K1, &secret));
        Self { secret, id }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }
}

pub fn pk2id(pk: &PublicKey) -> NodeId {
    NodeId::from_slice(&pk.serialize_uncompressed()[1..])
}

pub fn id2pk(id: &NodeId) -> Result<PublicKey, secp256k1::Error> {
    let mut raw = [4u8; 65];
    raw[1..].copy_from_slice(id.as_slice());
    PublicKey::from_slice(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_round_trips_to_public_key() {
        let key = NodeKey::generate();
        let pk = id2pk(&key.id()).unwrap();
        assert_eq!(pk2id(&pk), key.id());
    }

    #[test]
    fn test_from_bytes_is_deterministic() {
        let a = NodeKey::from_bytes(&[7u8; 32]).unwrap();
        let b = NodeKey::from_bytes(&[7u8; 32]).unwrap();
        assert_eq!(a.id(), b.id());
        assert!(NodeKey::from_bytes(&[0u8; 32]).is_err());
    }

    #[test]
    fn test_rejects_off_curve_id() {
        assert!(id2pk(&NodeId::repeat_byte(0xff)).is_err());
    }
}
