//! Hashing and key helpers.

use alloy_primitives::{Address, FixedBytes};
use k256::ecdsa::VerifyingKey;
use sha3::{Digest, Keccak256};

pub fn keccak256_bytes(bytes: &[u8]) -> FixedBytes<32> {
    let mut h = Keccak256::new();
    h.update(bytes);
    let out = h.finalize();
    let mut b = [0u8; 32];
    b.copy_from_slice(out.as_slice());
    FixedBytes(b)
}

/// 4-byte function selector for a canonical Solidity signature.
pub fn selector(sig: &str) -> [u8; 4] {
    let h = keccak256_bytes(sig.as_bytes());
    [h[0], h[1], h[2], h[3]]
}

/// Account address for a secp256k1 public key: low 20 bytes of keccak256(x || y).
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256_bytes(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..32])
}
