// src/models/did.rs
//! Decentralized Identifier (DID) data model.
//!
//! Only the parts of a [DID Core](https://www.w3.org/TR/did-core/) document
//! needed to verify a JWT are modelled; unknown members are ignored.

use ethers::types::Address;
use serde::{Deserialize, Serialize};

/// A resolved DID document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    /// The DID the document describes, e.g. `did:web:example.com`
    pub id: String,

    #[serde(default)]
    pub verification_method: Vec<VerificationMethod>,
}

/// Public key material published in a DID document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    /// Absolute (`did:x:y#key-1`) or relative (`#key-1`) key ID
    pub id: String,

    #[serde(rename = "type", default)]
    pub method_type: String,

    #[serde(default)]
    pub controller: Option<String>,

    #[serde(default)]
    pub public_key_jwk: Option<PublicJwk>,

    #[serde(default)]
    pub public_key_base58: Option<String>,

    /// CAIP-10 account, e.g. `eip155:1:0xab16...`
    #[serde(default)]
    pub blockchain_account_id: Option<String>,
}

/// Public JSON Web Key (EC or OKP).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PublicJwk {
    pub kty: String,
    #[serde(default)]
    pub crv: Option<String>,
    pub x: String,
    #[serde(default)]
    pub y: Option<String>,
}

impl VerificationMethod {
    /// True if `kid` names this method, either absolutely or by fragment.
    pub fn matches_kid(&self, did: &str, kid: &str) -> bool {
        absolute_id(did, &self.id) == absolute_id(did, kid)
    }

    /// Ethereum account bound to this method on the chain with `chain_id`.
    pub fn eip155_account(&self, chain_id: u64) -> Option<Address> {
        let account = self.blockchain_account_id.as_deref()?;
        let mut parts = account.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("eip155"), Some(reference), Some(address))
                if reference.parse::<u64>().ok() == Some(chain_id) =>
            {
                address.parse().ok()
            }
            _ => None,
        }
    }
}

fn absolute_id(did: &str, id: &str) -> String {
    if id.starts_with('#') {
        format!("{did}{id}")
    } else {
        id.to_string()
    }
}

/// Checks the `did:<method>:<method-specific-id>` shape.
///
/// The method-specific ID is limited to DID Core `idchar`s, `:` and `%`
/// escapes, so a well-formed DID is always a single URL path segment.
pub fn is_well_formed_did(did: &str) -> bool {
    let mut parts = did.splitn(3, ':');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some("did"), Some(method), Some(id))
            if !method.is_empty()
                && method.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
                && !id.is_empty()
                && !id.ends_with(':')
                && id
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':' | '%'))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_did_shape() {
        assert!(is_well_formed_did("did:web:example.com"));
        assert!(is_well_formed_did("did:ion:EiA:abc"));
        assert!(!is_well_formed_did("did:web"));
        assert!(!is_well_formed_did("did::abc"));
        assert!(!is_well_formed_did("urn:uuid:1234"));
        assert!(!is_well_formed_did("did:Web:example.com"));
        assert!(is_well_formed_did("did:web:example.com%3A8443"));
    }

    #[test]
    fn test_did_cannot_escape_path_segment() {
        for did in [
            "did:web:example.com/../admin",
            "did:web:example.com?service=x",
            "did:web:example.com#key-1",
            "did:web:example com",
            "did:web:example.com:",
        ] {
            assert!(!is_well_formed_did(did), "{did}");
        }
    }

    #[test]
    fn test_eip155_account() {
        let vm: VerificationMethod = serde_json::from_value(json!({
            "id": "did:web:example.com#eth",
            "type": "EcdsaSecp256k1RecoveryMethod2020",
            "blockchainAccountId": "eip155:11155111:0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        }))
        .unwrap();

        let expected: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap();
        assert_eq!(vm.eip155_account(11_155_111), Some(expected));
        assert_eq!(vm.eip155_account(1), None);
    }

    #[test]
    fn test_relative_kid_matches() {
        let doc: DidDocument = serde_json::from_value(json!({
            "@context": "https://www.w3.org/ns/did/v1",
            "id": "did:web:example.com",
            "verificationMethod": [{
                "id": "#key-1",
                "type": "JsonWebKey2020",
                "controller": "did:web:example.com",
                "publicKeyJwk": { "kty": "EC", "crv": "P-256", "x": "AA", "y": "BB" }
            }]
        }))
        .unwrap();

        let vm = &doc.verification_method[0];
        assert!(vm.matches_kid(&doc.id, "did:web:example.com#key-1"));
        assert!(vm.matches_kid(&doc.id, "#key-1"));
        assert!(!vm.matches_kid(&doc.id, "#key-2"));
    }
}
