// src/utils/serialization.rs
//! Proof value codec.
//!
//! `proofValue` is a self-describing binary encoding: the [`ProofValue`] is
//! serialized to CBOR and wrapped in multibase base58btc (leading `z`).

use crate::error::VcError;
use crate::models::credential::ProofValue;

/// Multibase prefix for base58btc.
const BASE58BTC: char = 'z';

/// Encodes a proof value as a multibase string.
pub fn encode_proof_value(value: &ProofValue) -> Result<String, VcError> {
    let cbor = serde_cbor::to_vec(value)
        .map_err(|e| VcError::Encoding(format!("CBOR encoding failed: {}", e)))?;
    Ok(format!("{}{}", BASE58BTC, bs58::encode(cbor).into_string()))
}

/// Decodes a multibase `proofValue` back into a [`ProofValue`].
pub fn decode_proof_value(encoded: &str) -> Result<ProofValue, VcError> {
    let body = encoded
        .strip_prefix(BASE58BTC)
        .ok_or_else(|| VcError::Encoding("proofValue is not multibase base58btc".into()))?;
    let cbor = bs58::decode(body)
        .into_vec()
        .map_err(|e| VcError::Encoding(format!("base58 decoding failed: {}", e)))?;
    serde_cbor::from_slice(&cbor)
        .map_err(|e| VcError::Encoding(format!("CBOR decoding failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::credential::PathNode;

    #[test]
    fn test_multibase_prefix_and_decode() {
        let value = ProofValue {
            path: vec![PathNode::Right("ab".repeat(32))],
            merkle_root: "cd".repeat(32),
            target_hash: "ef".repeat(32),
            anchors: vec!["blink:eth:goerli:0x01".into()],
        };
        let encoded = encode_proof_value(&value).unwrap();
        assert!(encoded.starts_with('z'));
        assert_eq!(decode_proof_value(&encoded).unwrap(), value);
    }

    #[test]
    fn test_rejects_foreign_encodings() {
        assert!(matches!(decode_proof_value("mAAAA"), Err(VcError::Encoding(_))));
        assert!(matches!(decode_proof_value("z0OIl"), Err(VcError::Encoding(_))));
        // valid base58, not CBOR for a ProofValue
        let junk = format!("z{}", bs58::encode(b"not cbor").into_string());
        assert!(matches!(decode_proof_value(&junk), Err(VcError::Encoding(_))));
    }
}
