// src/utils/crypto.rs
//! Hashing utilities for Merkle tree construction.
//!
//! BlockCerts trees are built with SHA-256 (via `ring`), not Keccak, so the
//! anchored root can be recomputed by any standard verifier.

use ethers::utils::hex;
use ring::digest::{digest, SHA256};

/// Computes the SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(digest(&SHA256, data).as_ref());
    out
}

/// SHA-256 digest as lowercase hex, without a `0x` prefix.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Decodes a 32-byte hash from hex, accepting an optional `0x` prefix.
pub fn decode_hash(value: &str) -> Option<[u8; 32]> {
    let bytes = hex::decode(value.trim_start_matches("0x")).ok()?;
    bytes.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_decode_hash() {
        let hex = sha256_hex(b"abc");
        assert_eq!(decode_hash(&hex), Some(sha256(b"abc")));
        assert_eq!(decode_hash(&format!("0x{hex}")), Some(sha256(b"abc")));
        assert_eq!(decode_hash("abcd"), None);
        assert_eq!(decode_hash("zz"), None);
    }
}
