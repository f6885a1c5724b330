// src/error.rs
//! Error taxonomy for credential issuance and verification.
//!
//! Every failure a service can hit is returned as a [`VcError`] value. The HTTP
//! layer maps each variant to a stable `error` code plus a human readable
//! `error_description`. Verification outcomes are *not* errors; see
//! [`crate::models::verification::VerifyResult`].

use ethers::types::{Address, U256};
use thiserror::Error;

/// Raised when a chain name or anchor link is not in the chain registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown chain: {0}")]
pub struct UnknownChain(pub String);

/// One failed broadcast attempt, kept so the terminal error carries full history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    /// 1-based attempt number
    pub attempt: usize,
    /// Error reported by the RPC node for this attempt
    pub reason: String,
}

/// Errors surfaced by the issuance and verification services.
#[derive(Error, Debug)]
pub enum VcError {
    /// A required request field is missing or malformed.
    #[error("{0}")]
    InvalidRequest(String),

    /// The canonicalizer rejected the document.
    #[error("canonicalization failed: {0}")]
    CanonicalizationFailed(String),

    /// The signing account cannot cover the anchoring transaction.
    #[error("insufficient balance: account 0x{address:x} holds {balance} wei, at least {required} wei required")]
    InsufficientBalance {
        address: Address,
        balance: U256,
        required: U256,
    },

    /// Chain identifier not present in the chain registry.
    #[error(transparent)]
    UnknownChain(#[from] UnknownChain),

    /// Every bounded broadcast attempt failed.
    #[error("broadcast failed after {} attempts: {}", .attempts.len(), summarize(.attempts))]
    BroadcastFailed { attempts: Vec<AttemptFailure> },

    /// The issuer DID could not be resolved to a DID document.
    #[error("could not resolve {did}: {reason}")]
    DidResolutionFailed { did: String, reason: String },

    /// The JWT is malformed, its signature does not verify, or its claims are invalid.
    #[error("invalid jwt: {0}")]
    JwtInvalid(String),

    /// Non-broadcast RPC failure (balance, nonce or lookup query).
    #[error("rpc error: {0}")]
    Rpc(String),

    /// Transaction or token signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// A network stage did not complete in time.
    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// Proof value could not be encoded or decoded.
    #[error("encoding error: {0}")]
    Encoding(String),
}

fn summarize(attempts: &[AttemptFailure]) -> String {
    attempts
        .iter()
        .map(|a| format!("#{}: {}", a.attempt, a.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

impl VcError {
    /// Stable snake_case identifier used as the `error` field of HTTP responses.
    pub fn code(&self) -> &'static str {
        match self {
            VcError::InvalidRequest(_) => "invalid_request",
            VcError::CanonicalizationFailed(_) => "canonicalization_failed",
            VcError::InsufficientBalance { .. } => "insufficient_balance",
            VcError::UnknownChain(_) => "unknown_chain",
            VcError::BroadcastFailed { .. } => "broadcast_failed",
            VcError::DidResolutionFailed { .. } => "did_resolution_failed",
            VcError::JwtInvalid(_) => "invalid_jwt",
            VcError::Rpc(_) => "rpc_error",
            VcError::Signing(_) => "signing_failed",
            VcError::Timeout(_) => "timeout",
            VcError::Encoding(_) => "encoding_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_failed_lists_every_attempt() {
        let err = VcError::BroadcastFailed {
            attempts: vec![
                AttemptFailure { attempt: 1, reason: "nonce too low".into() },
                AttemptFailure { attempt: 2, reason: "connection reset".into() },
            ],
        };
        let message = err.to_string();
        assert!(message.starts_with("broadcast failed after 2 attempts"));
        assert!(message.contains("#1: nonce too low"));
        assert!(message.contains("#2: connection reset"));
        assert_eq!(err.code(), "broadcast_failed");
    }

    #[test]
    fn test_unknown_chain_is_transparent() {
        let err: VcError = UnknownChain("dogecoin".into()).into();
        assert_eq!(err.to_string(), "unknown chain: dogecoin");
        assert_eq!(err.code(), "unknown_chain");
    }
}
