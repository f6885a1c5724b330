// src/services/credential_issuer.rs
//! BlockCerts credential issuer.
//!
//! Issuance is a short pipeline:
//! canonicalize → Merkle tree → anchor root on chain → attach proof.
//! Any stage failure short-circuits and is returned as a [`VcError`] value.
//! The caller's credential is never mutated; a new signed copy is returned.

use crate::blockchain::anchor_service::{Anchoring, SigningAccount};
use crate::blockchain::merkle_tree::MerkleTreeGenerator;
use crate::error::VcError;
use crate::models::chain::Chain;
use crate::models::credential::VerifiableCredential;
use crate::utils::canonicalize::Canonicalizer;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Issuance contract shared by every BlockCerts issuing strategy.
#[async_trait]
pub trait BlockCertIssuer: Send + Sync {
    async fn issue(
        &self,
        credential: &Value,
        account: &SigningAccount,
        verification_method: &str,
        chain: Chain,
    ) -> Result<VerifiableCredential, VcError>;
}

/// Issues credentials by anchoring one transaction per credential.
pub struct AnchoredIssuer {
    canonicalizer: Arc<dyn Canonicalizer>,
    anchoring: Arc<dyn Anchoring>,
}

impl AnchoredIssuer {
    pub fn new(canonicalizer: Arc<dyn Canonicalizer>, anchoring: Arc<dyn Anchoring>) -> Self {
        Self {
            canonicalizer,
            anchoring,
        }
    }
}

#[async_trait]
impl BlockCertIssuer for AnchoredIssuer {
    async fn issue(
        &self,
        credential: &Value,
        account: &SigningAccount,
        verification_method: &str,
        chain: Chain,
    ) -> Result<VerifiableCredential, VcError> {
        let claims = match credential {
            Value::Object(map) if !map.contains_key("proof") => map.clone(),
            Value::Object(_) => {
                return Err(VcError::InvalidRequest(
                    "credential already carries a proof".into(),
                ))
            }
            _ => {
                return Err(VcError::InvalidRequest(
                    "credential must be a JSON object".into(),
                ))
            }
        };

        let canonical = self.canonicalizer.canonicalize(credential)?;
        let tree = MerkleTreeGenerator::new(&canonical);
        log::debug!("credential target hash {}", tree.target_hash());

        let receipt = self
            .anchoring
            .anchor(account, chain, &tree.blockchain_data())
            .await?;
        if !receipt.known_to_node {
            log::warn!(
                "issuing proof for {} before the node reported the transaction",
                receipt.transaction_id
            );
        }

        let proof = tree.proof(&receipt.transaction_id, verification_method, chain)?;
        log::info!("issued credential anchored at {}", chain.blink(&receipt.transaction_id));
        Ok(VerifiableCredential {
            credential: claims,
            proof,
        })
    }
}
