//! Crypto module: node keys, recoverable signatures, ECIES and the RLPx frame MAC.
//!
//! - Keys: secp256k1 node identity (64-byte node id)
//! - Sign: recoverable ECDSA used by the auth message
//! - ECIES: auth/ack encryption
//! - MAC: running Keccak frame MAC

pub mod keys;
pub mod sign;
pub mod ecies;
pub mod mac;

pub use keys::{id2pk, pk2id, NodeId, NodeKey};
pub use sign::{recover, sign_recoverable};
pub use ecies::{ecdh_x, EciesError, ECIES_OVERHEAD};
pub use mac::FrameMac;
