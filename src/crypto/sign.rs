use alloy_primitives::B256;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};

/// Recoverable signature over a 32-byte digest, laid out as `r || s || v`.
pub fn sign_recoverable(digest: &B256, secret: &SecretKey) -> [u8; 65] {
    let msg = Message::from_digest(digest.0);
    let (rec_id, sig) = SECP256K1.sign_ecdsa_recoverable(&msg, secret).serialize_compact();
    let mut out = [0u8; 65];
    out[..64].copy_from_slice(&sig);
    out[64] = rec_id.to_i32() as u8;
    out
}

/// Recover the signer's public key from a `r || s || v` signature.
pub fn recover(signature: &[u8], digest: &B256) -> Result<PublicKey, secp256k1::Error> {
    if signature.len() != 65 {
        return Err(secp256k1::Error::InvalidSignature);
    }
    let rec_id = RecoveryId::from_i32(signature[64] as i32)?;
    let sig = RecoverableSignature::from_compact(&signature[..64], rec_id)?;
    SECP256K1.recover_ecdsa(&Message::from_digest(digest.0), &sig)
}
