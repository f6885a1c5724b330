// src/blockchain/merkle_tree.rs
//! Merkle tree generation for anchored credentials.
//!
//! Each credential is anchored by its own transaction, so the tree always has
//! exactly one leaf: the root equals the leaf and the Merkle path is empty.
//! Verifiers rely on that empty path, so it must be preserved.

use crate::error::VcError;
use crate::models::chain::Chain;
use crate::models::credential::{
    MerkleProof, PathNode, ProofValue, ASSERTION_METHOD, MERKLE_PROOF_2019,
};
use crate::utils::crypto::{decode_hash, sha256, sha256_hex};
use crate::utils::serialization::encode_proof_value;
use chrono::{SecondsFormat, Utc};
use ethers::utils::hex;

/// Single-leaf Merkle tree over the canonical bytes of one credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTreeGenerator {
    leaf: [u8; 32],
}

impl MerkleTreeGenerator {
    /// Hashes the canonical credential bytes into the tree's only leaf.
    pub fn new(canonical_bytes: &[u8]) -> Self {
        Self {
            leaf: sha256(canonical_bytes),
        }
    }

    /// Leaf hash as lowercase hex.
    pub fn target_hash(&self) -> String {
        hex::encode(self.leaf)
    }

    /// Root hash as lowercase hex. Identical to the leaf.
    pub fn merkle_root(&self) -> String {
        hex::encode(self.leaf)
    }

    /// Raw root bytes, used as the anchoring transaction payload.
    pub fn blockchain_data(&self) -> Vec<u8> {
        self.leaf.to_vec()
    }

    /// Builds the `MerkleProof2019` anchored to `transaction_id` on `chain`.
    pub fn proof(
        &self,
        transaction_id: &str,
        verification_method: &str,
        chain: Chain,
    ) -> Result<MerkleProof, VcError> {
        let value = ProofValue {
            path: Vec::new(),
            merkle_root: self.merkle_root(),
            target_hash: self.target_hash(),
            anchors: vec![chain.blink(transaction_id)],
        };

        Ok(MerkleProof {
            proof_type: MERKLE_PROOF_2019.to_string(),
            created: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            proof_value: encode_proof_value(&value)?,
            proof_purpose: ASSERTION_METHOD.to_string(),
            verification_method: verification_method.to_string(),
        })
    }
}

/// Walks `path` from `target_hash` and returns the derived root as hex.
///
/// A `left` sibling is hashed before the running value, a `right` sibling after.
pub fn derive_root(target_hash: &str, path: &[PathNode]) -> Result<String, VcError> {
    let mut current = decode_hash(target_hash)
        .ok_or_else(|| VcError::Encoding(format!("invalid target hash {}", target_hash)))?;

    for node in path {
        let (sibling, sibling_is_left) = match node {
            PathNode::Left(h) => (h, true),
            PathNode::Right(h) => (h, false),
        };
        let sibling = decode_hash(sibling)
            .ok_or_else(|| VcError::Encoding(format!("invalid path hash {}", sibling)))?;

        let mut concatenated = Vec::with_capacity(64);
        if sibling_is_left {
            concatenated.extend_from_slice(&sibling);
            concatenated.extend_from_slice(&current);
        } else {
            concatenated.extend_from_slice(&current);
            concatenated.extend_from_slice(&sibling);
        }
        current = sha256(&concatenated);
    }

    Ok(hex::encode(current))
}

/// Recomputes the leaf hash of canonical bytes.
pub fn leaf_hash(canonical_bytes: &[u8]) -> String {
    sha256_hex(canonical_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::serialization::decode_proof_value;

    #[test]
    fn test_hashing_is_deterministic() {
        let bytes = br#"{"name":"Alice"}"#;
        let a = MerkleTreeGenerator::new(bytes);
        let b = MerkleTreeGenerator::new(bytes);
        assert_eq!(a, b);
        assert_eq!(a.target_hash(), leaf_hash(bytes));
        assert_eq!(a.merkle_root(), a.target_hash());
        assert_eq!(a.blockchain_data(), sha256(bytes).to_vec());
        assert_ne!(a.target_hash(), MerkleTreeGenerator::new(b"{}").target_hash());
    }

    #[test]
    fn test_proof_carries_single_blink_and_empty_path() {
        let tree = MerkleTreeGenerator::new(br#"{"name":"Alice"}"#);
        let proof = tree
            .proof("0xabc", "did:example:issuer#key-1", Chain::EthereumSepolia)
            .unwrap();

        assert_eq!(proof.proof_type, "MerkleProof2019");
        assert_eq!(proof.proof_purpose, "assertionMethod");
        assert_eq!(proof.verification_method, "did:example:issuer#key-1");
        assert!(chrono::DateTime::parse_from_rfc3339(&proof.created).is_ok());

        let value = decode_proof_value(&proof.proof_value).unwrap();
        assert!(value.path.is_empty());
        assert_eq!(value.anchors, vec!["blink:eth:sepolia:0xabc".to_string()]);
        assert_eq!(value.merkle_root, tree.merkle_root());
        assert_eq!(value.target_hash, tree.target_hash());
    }

    #[test]
    fn test_derive_root_with_empty_path_is_identity() {
        let leaf = leaf_hash(b"credential");
        assert_eq!(derive_root(&leaf, &[]).unwrap(), leaf);
    }

    #[test]
    fn test_derive_root_two_leaf_tree() {
        let left = sha256(b"left");
        let right = sha256(b"right");
        let mut both = left.to_vec();
        both.extend_from_slice(&right);
        let expected = sha256_hex(&both);

        let from_left = derive_root(&hex::encode(left), &[PathNode::Right(hex::encode(right))]);
        let from_right = derive_root(&hex::encode(right), &[PathNode::Left(hex::encode(left))]);
        assert_eq!(from_left.unwrap(), expected);
        assert_eq!(from_right.unwrap(), expected);
    }

    #[test]
    fn test_derive_root_rejects_bad_hex() {
        assert!(derive_root("xyz", &[]).is_err());
        let leaf = leaf_hash(b"a");
        assert!(derive_root(&leaf, &[PathNode::Left("00".into())]).is_err());
    }
}
