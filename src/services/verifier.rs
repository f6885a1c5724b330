// src/services/verifier.rs
//! BlockCerts credential verification.
//!
//! Replays the verification steps of a `MerkleProof2019` credential and
//! reports a named diagnostic per step. Verification never fails with an
//! error: a bad credential yields `status: failure` and the first failing
//! step explains why. Steps after the first failure are reported `skipped`.
//!
//! The issuer identity check binds the claimed issuer to the account that
//! sent the anchoring transaction. Accounts come from the verifier's trusted
//! issuer table or, failing that, from `blockchainAccountId` entries in the
//! issuer's DID document. An issuer with no known account never verifies.

use crate::blockchain::ethereum_client::{ChainRpc, TransactionRecord};
use crate::blockchain::merkle_tree::{derive_root, leaf_hash};
use crate::models::chain::Chain;
use crate::models::credential::{
    ProofValue, VerifiableCredential, ASSERTION_METHOD, MERKLE_PROOF_2019,
};
use crate::models::verification::{Status, VerificationStep, VerifyResult};
use crate::services::did_resolver::DidResolver;
use crate::utils::canonicalize::Canonicalizer;
use crate::utils::crypto::decode_hash;
use crate::utils::serialization::decode_proof_value;
use ethers::types::{Address, H256};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Verification steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    ParseProof,
    CheckProofType,
    ComputeLocalHash,
    CompareHashes,
    CheckMerkleRoot,
    CheckReceipt,
    CheckIssuerIdentity,
}

impl Step {
    pub const ALL: [Step; 7] = [
        Step::ParseProof,
        Step::CheckProofType,
        Step::ComputeLocalHash,
        Step::CompareHashes,
        Step::CheckMerkleRoot,
        Step::CheckReceipt,
        Step::CheckIssuerIdentity,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Step::ParseProof => "parseProof",
            Step::CheckProofType => "checkProofType",
            Step::ComputeLocalHash => "computeLocalHash",
            Step::CompareHashes => "compareHashes",
            Step::CheckMerkleRoot => "checkMerkleRoot",
            Step::CheckReceipt => "checkReceipt",
            Step::CheckIssuerIdentity => "checkIssuerIdentity",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Step::ParseProof => "Parsing proof",
            Step::CheckProofType => "Checking proof type and purpose",
            Step::ComputeLocalHash => "Computing local hash",
            Step::CompareHashes => "Comparing hashes",
            Step::CheckMerkleRoot => "Checking Merkle root",
            Step::CheckReceipt => "Checking anchor transaction",
            Step::CheckIssuerIdentity => "Checking issuer identity",
        }
    }
}

#[derive(Default)]
struct Report {
    steps: Vec<VerificationStep>,
}

impl Report {
    fn push(&mut self, step: Step, status: Status, error_message: Option<String>) {
        self.steps.push(VerificationStep {
            code: step.code().to_string(),
            label: step.label().to_string(),
            status,
            error_message,
        });
    }

    /// Records a step outcome; returns the value on success.
    fn record<T>(&mut self, step: Step, outcome: Result<T, String>) -> Option<T> {
        match outcome {
            Ok(value) => {
                self.push(step, Status::Success, None);
                Some(value)
            }
            Err(message) => {
                log::debug!("verification step {} failed: {}", step.code(), message);
                self.push(step, Status::Failure, Some(message));
                None
            }
        }
    }

    fn finish(mut self) -> VerifyResult {
        for step in Step::ALL.iter().skip(self.steps.len()) {
            self.push(*step, Status::Skipped, None);
        }
        VerifyResult::from_steps(self.steps)
    }
}

/// Verifies BlockCerts credentials against the chains it has RPC access to.
pub struct BlockCertVerifier {
    canonicalizer: Arc<dyn Canonicalizer>,
    chains: HashMap<Chain, Arc<dyn ChainRpc>>,
    trusted_issuers: HashMap<String, HashSet<Address>>,
    resolver: Option<Arc<dyn DidResolver>>,
    rpc_timeout: Duration,
}

impl BlockCertVerifier {
    pub fn new(canonicalizer: Arc<dyn Canonicalizer>) -> Self {
        Self {
            canonicalizer,
            chains: HashMap::new(),
            trusted_issuers: HashMap::new(),
            resolver: None,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    /// Registers the RPC provider used to look up anchors on `chain`.
    pub fn with_chain(mut self, chain: Chain, rpc: Arc<dyn ChainRpc>) -> Self {
        self.chains.insert(chain, rpc);
        self
    }

    /// Trusts `account` to anchor credentials issued by `issuer` on any chain.
    pub fn with_trusted_issuer(mut self, issuer: impl Into<String>, account: Address) -> Self {
        self.trusted_issuers
            .entry(issuer.into())
            .or_default()
            .insert(account);
        self
    }

    /// Looks up anchoring accounts of issuers missing from the trusted table.
    pub fn with_resolver(mut self, resolver: Arc<dyn DidResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Deadline for each anchor lookup.
    pub fn with_rpc_timeout(mut self, rpc_timeout: Duration) -> Self {
        self.rpc_timeout = rpc_timeout;
        self
    }

    /// Verifies a signed credential document.
    pub async fn verify(&self, document: &Value) -> VerifyResult {
        let mut report = Report::default();

        let Some((vc, value)) = report.record(Step::ParseProof, parse(document)) else {
            return report.finish();
        };
        if report
            .record(Step::CheckProofType, check_proof_type(&vc))
            .is_none()
        {
            return report.finish();
        }

        let unsigned = Value::Object(vc.credential.clone());
        let local_hash = self
            .canonicalizer
            .canonicalize(&unsigned)
            .map(|bytes| leaf_hash(&bytes))
            .map_err(|e| e.to_string());
        let Some(local_hash) = report.record(Step::ComputeLocalHash, local_hash) else {
            return report.finish();
        };

        if report
            .record(Step::CompareHashes, compare_hashes(&local_hash, &value))
            .is_none()
        {
            return report.finish();
        }
        if report
            .record(Step::CheckMerkleRoot, check_merkle_root(&value))
            .is_none()
        {
            return report.finish();
        }
        let receipt = self.check_receipt(&value).await;
        let Some(anchors) = report.record(Step::CheckReceipt, receipt) else {
            return report.finish();
        };

        let identity = self.check_issuer(&vc, &anchors).await;
        report.record(Step::CheckIssuerIdentity, identity);

        let result = report.finish();
        log::info!("credential verification finished: {:?}", result.status);
        result
    }

    async fn check_receipt(&self, value: &ProofValue) -> Result<Vec<(Chain, TransactionRecord)>, String> {
        if value.anchors.is_empty() {
            return Err("proof carries no anchors".into());
        }
        let root = decode_hash(&value.merkle_root)
            .ok_or_else(|| format!("invalid Merkle root {}", value.merkle_root))?;

        let mut records = Vec::with_capacity(value.anchors.len());
        for anchor in &value.anchors {
            let (chain, transaction_id) = Chain::parse_blink(anchor).map_err(|e| e.to_string())?;
            let rpc = self
                .chains
                .get(&chain)
                .ok_or_else(|| format!("no RPC provider configured for {}", chain))?;
            let hash: H256 = transaction_id
                .parse()
                .map_err(|_| format!("invalid transaction id {}", transaction_id))?;

            let tx = tokio::time::timeout(self.rpc_timeout, rpc.transaction(hash))
                .await
                .map_err(|_| format!("timed out looking up transaction {} on {}", transaction_id, chain))?
                .map_err(|e| e.to_string())?
                .ok_or_else(|| format!("transaction {} not found on {}", transaction_id, chain))?;

            if tx.input.as_ref() != root.as_slice() {
                return Err(format!(
                    "transaction {} does not carry Merkle root {}",
                    transaction_id, value.merkle_root
                ));
            }
            if tx.block_number.is_none() {
                log::warn!("anchor {} is not yet mined", anchor);
            }
            records.push((chain, tx));
        }
        Ok(records)
    }

    /// The issuer must control the verification method and have sent every anchor.
    async fn check_issuer(
        &self,
        vc: &VerifiableCredential,
        anchors: &[(Chain, TransactionRecord)],
    ) -> Result<(), String> {
        let method = &vc.proof.verification_method;
        let controller = method.split('#').next().unwrap_or(method);
        let issuer = match issuer_id(vc) {
            Some(issuer) if issuer != controller => {
                return Err(format!(
                    "verification method {} is not controlled by issuer {}",
                    method, issuer
                ))
            }
            Some(issuer) => issuer,
            None => controller.to_string(),
        };

        for (chain, tx) in anchors {
            let accounts = self.issuer_accounts(&issuer, *chain).await?;
            if !accounts.contains(&tx.from) {
                return Err(format!(
                    "anchor {:?} was sent by 0x{:x}, which is not an account of {}",
                    tx.hash, tx.from, issuer
                ));
            }
        }
        Ok(())
    }

    async fn issuer_accounts(&self, issuer: &str, chain: Chain) -> Result<HashSet<Address>, String> {
        if let Some(accounts) = self.trusted_issuers.get(issuer) {
            return Ok(accounts.clone());
        }
        let resolver = self
            .resolver
            .as_ref()
            .ok_or_else(|| format!("issuer {} is not trusted", issuer))?;
        let document = resolver.resolve(issuer).await.map_err(|e| e.to_string())?;
        let accounts: HashSet<Address> = document
            .verification_method
            .iter()
            .filter_map(|vm| vm.eip155_account(chain.chain_id()))
            .collect();
        if accounts.is_empty() {
            return Err(format!("{} publishes no account on {}", issuer, chain));
        }
        Ok(accounts)
    }
}

fn parse(document: &Value) -> Result<(VerifiableCredential, ProofValue), String> {
    if !document.is_object() {
        return Err("credential must be a JSON object".into());
    }
    let vc: VerifiableCredential = serde_json::from_value(document.clone())
        .map_err(|e| format!("malformed credential proof: {}", e))?;
    let value = decode_proof_value(&vc.proof.proof_value).map_err(|e| e.to_string())?;
    Ok((vc, value))
}

fn check_proof_type(vc: &VerifiableCredential) -> Result<(), String> {
    if vc.proof.proof_type != MERKLE_PROOF_2019 {
        return Err(format!("unsupported proof type {}", vc.proof.proof_type));
    }
    if vc.proof.proof_purpose != ASSERTION_METHOD {
        return Err(format!("unsupported proof purpose {}", vc.proof.proof_purpose));
    }
    Ok(())
}

fn compare_hashes(local_hash: &str, value: &ProofValue) -> Result<(), String> {
    if !local_hash.eq_ignore_ascii_case(&value.target_hash) {
        return Err(format!(
            "hash mismatch: computed {} but proof targets {}",
            local_hash, value.target_hash
        ));
    }
    Ok(())
}

fn check_merkle_root(value: &ProofValue) -> Result<(), String> {
    let derived = derive_root(&value.target_hash, &value.path).map_err(|e| e.to_string())?;
    if !derived.eq_ignore_ascii_case(&value.merkle_root) {
        return Err(format!(
            "Merkle path derives {} but proof claims {}",
            derived, value.merkle_root
        ));
    }
    Ok(())
}

fn issuer_id(vc: &VerifiableCredential) -> Option<String> {
    match vc.credential.get("issuer")? {
        Value::String(id) => Some(id.clone()),
        Value::Object(profile) => profile.get("id")?.as_str().map(str::to_string),
        _ => None,
    }
}
