use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes256;
use alloy_primitives::{B128, B256};
use sha3::{Digest, Keccak256};

/// Running RLPx frame MAC: a Keccak-256 state updated with AES-256-ECB mixed seeds.
pub struct FrameMac {
    cipher: Aes256,
    hasher: Keccak256,
}

impl FrameMac {
    pub fn new(secret: &B256) -> Self {
        Self {
            cipher: Aes256::new(GenericArray::from_slice(secret.as_slice())),
            hasher: Keccak256::new(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Mix in a 16-byte encrypted header.
    pub fn update_header(&mut self, header: &[u8]) {
        let mut seed = self.encrypted_digest();
        for (s, h) in seed.iter_mut().zip(header) {
            *s ^= h;
        }
        self.hasher.update(seed);
    }

    /// Mix in an encrypted (padded) frame body.
    pub fn update_body(&mut self, body: &[u8]) {
        self.hasher.update(body);
        let prev = self.digest();
        let mut seed = self.encrypted_digest();
        for (s, p) in seed.iter_mut().zip(prev.iter()) {
            *s ^= p;
        }
        self.hasher.update(seed);
    }

    /// First 16 bytes of the current Keccak state, without finalizing it.
    pub fn digest(&self) -> B128 {
        B128::from_slice(&self.hasher.clone().finalize()[..16])
    }

    fn encrypted_digest(&self) -> [u8; 16] {
        let mut block = GenericArray::clone_from_slice(self.digest().as_slice());
        self.cipher.encrypt_block(&mut block);
        let mut out = [0u8; 16];
        out.copy_from_slice(&block);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_inputs_same_digest() {
        let secret = B256::repeat_byte(9);
        let mut a = FrameMac::new(&secret);
        let mut b = FrameMac::new(&secret);
        for mac in [&mut a, &mut b] {
            mac.update(b"seed");
            mac.update_header(&[1u8; 16]);
            mac.update_body(&[2u8; 32]);
        }
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn test_header_bit_flip_changes_digest() {
        let secret = B256::repeat_byte(9);
        let mut a = FrameMac::new(&secret);
        let mut b = FrameMac::new(&secret);
        a.update_header(&[0u8; 16]);
        let mut flipped = [0u8; 16];
        flipped[15] = 1;
        b.update_header(&flipped);
        assert_ne!(a.digest(), b.digest());
    }
}
