// src/models/credential.rs
//! BlockCerts credential data model.
//!
//! A credential is an arbitrary JSON-LD object owned by the caller. Issuance
//! never mutates it; the issuer returns a copy with a `MerkleProof2019` proof
//! attached whose `proofValue` commits to a blockchain anchor.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Proof type emitted by the anchored issuer.
pub const MERKLE_PROOF_2019: &str = "MerkleProof2019";

/// Proof purpose emitted by the anchored issuer.
pub const ASSERTION_METHOD: &str = "assertionMethod";

/// A credential with a Merkle proof attached.
///
/// All credential members are kept verbatim in `credential`; `proof` is the
/// only member added by issuance.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VerifiableCredential {
    #[serde(flatten)]
    pub credential: Map<String, Value>,

    pub proof: MerkleProof,
}

/// Linked-data proof anchoring a credential to a transaction.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProof {
    #[serde(rename = "type")]
    pub proof_type: String,

    /// RFC 3339 creation timestamp
    pub created: String,

    /// Multibase (base58btc) CBOR encoding of [`ProofValue`]
    pub proof_value: String,

    pub proof_purpose: String,

    pub verification_method: String,
}

/// Decoded contents of `proofValue`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProofValue {
    /// Sibling hashes from leaf to root; empty for a single-leaf tree
    pub path: Vec<PathNode>,

    /// Hex encoded root committed on chain
    pub merkle_root: String,

    /// Hex encoded leaf hash of the canonical credential
    pub target_hash: String,

    /// Blink URIs of the anchoring transactions
    pub anchors: Vec<String>,
}

/// One sibling on a Merkle path, keyed by the side it sits on.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PathNode {
    Left(String),
    Right(String),
}
