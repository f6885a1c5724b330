// src/utils/config.rs
//! Service configuration.
//!
//! Loaded once at start-up from the process environment (after `.env` has
//! been applied by `dotenv`) and then passed by value into every service
//! constructor. Nothing mutates it afterwards.

use crate::models::chain::Chain;
use config::{Config, ConfigError, Environment};
use ethers::types::Address;
use serde::Deserialize;
use std::time::Duration;

/// Burn address used as the recipient of anchoring transactions.
pub const DEFAULT_ANCHOR_ADDRESS: &str = "0xdeaDDeADDEaDdeaDdEAddEADDEAdDeadDEADDEaD";

const DEFAULT_GAS_LIMIT: u64 = 25_000;
const DEFAULT_GAS_PRICE_WEI: u64 = 20_000_000_000;

/// Raw settings as read from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSettings {
    pub issuing_address: String,
    pub private_key: String,
    pub verification_method: String,
    pub chain: String,
    pub rpc_url: String,
    pub bind_addr: String,
    pub anchor_address: String,
    pub universal_resolver_url: String,
    pub did_jwt_issuer: Option<String>,
    pub did_jwt_private_key_pem: Option<String>,
    pub did_jwt_algorithm: String,
    /// `did:a=0x...,did:b=0x...`
    pub trusted_issuers: Option<String>,
    pub gas_limit: u64,
    pub gas_price_wei: u64,
    pub min_balance_wei: Option<u64>,
    pub max_broadcast_attempts: usize,
    pub rpc_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

/// Validated settings.
#[derive(Clone)]
pub struct Settings {
    pub issuing_address: String,
    pub private_key: String,
    pub verification_method: String,
    pub chain: Chain,
    pub rpc_url: String,
    pub bind_addr: String,
    pub anchor_address: String,
    pub universal_resolver_url: String,
    pub did_jwt_issuer: Option<String>,
    pub did_jwt_private_key_pem: Option<String>,
    pub did_jwt_algorithm: String,
    /// Issuer DID → anchoring account pairs trusted by the verifier
    pub trusted_issuers: Vec<(String, Address)>,
    pub gas_limit: u64,
    pub gas_price_wei: u64,
    pub min_balance_wei: u64,
    pub max_broadcast_attempts: usize,
    pub rpc_timeout: Duration,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("issuing_address", &self.issuing_address)
            .field("verification_method", &self.verification_method)
            .field("chain", &self.chain)
            .field("rpc_url", &self.rpc_url)
            .field("bind_addr", &self.bind_addr)
            .field("did_jwt_issuer", &self.did_jwt_issuer)
            .field("trusted_issuers", &self.trusted_issuers)
            .field("gas_limit", &self.gas_limit)
            .field("gas_price_wei", &self.gas_price_wei)
            .field("min_balance_wei", &self.min_balance_wei)
            .finish_non_exhaustive()
    }
}

impl Settings {
    /// Reads settings from the process environment.
    ///
    /// # Errors
    /// Fails if a required variable is missing, a number does not parse, or
    /// `CHAIN` is not a registered chain.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_source(Environment::default().try_parsing(true))
    }

    /// Reads settings from any `config` source; used by tests with a fixed map.
    pub fn from_source<S>(source: S) -> anyhow::Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let raw: RawSettings = builder()?.add_source(source).build()?.try_deserialize()?;
        Self::validate(raw)
    }

    fn validate(raw: RawSettings) -> anyhow::Result<Self> {
        let chain: Chain = raw.chain.parse()?;
        let min_balance_wei = raw
            .min_balance_wei
            .unwrap_or(raw.gas_limit.saturating_mul(raw.gas_price_wei));
        if raw.max_broadcast_attempts == 0 {
            anyhow::bail!("MAX_BROADCAST_ATTEMPTS must be at least 1");
        }
        let trusted_issuers = raw
            .trusted_issuers
            .as_deref()
            .map(parse_trusted_issuers)
            .transpose()?
            .unwrap_or_default();
        Ok(Settings {
            issuing_address: raw.issuing_address,
            private_key: raw.private_key,
            verification_method: raw.verification_method,
            chain,
            rpc_url: raw.rpc_url,
            bind_addr: raw.bind_addr,
            anchor_address: raw.anchor_address,
            universal_resolver_url: raw.universal_resolver_url,
            did_jwt_issuer: raw.did_jwt_issuer,
            did_jwt_private_key_pem: raw.did_jwt_private_key_pem,
            did_jwt_algorithm: raw.did_jwt_algorithm,
            trusted_issuers,
            gas_limit: raw.gas_limit,
            gas_price_wei: raw.gas_price_wei,
            min_balance_wei,
            max_broadcast_attempts: raw.max_broadcast_attempts,
            rpc_timeout: Duration::from_secs(raw.rpc_timeout_secs),
            request_timeout: Duration::from_secs(raw.request_timeout_secs),
        })
    }
}

fn parse_trusted_issuers(list: &str) -> anyhow::Result<Vec<(String, Address)>> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (did, address) = entry
                .rsplit_once('=')
                .ok_or_else(|| anyhow::anyhow!("TRUSTED_ISSUERS entry {} is not did=address", entry))?;
            let address: Address = address
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("TRUSTED_ISSUERS address {}: {}", address, e))?;
            Ok((did.trim().to_string(), address))
        })
        .collect()
}

fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    Config::builder()
        .set_default("bind_addr", "127.0.0.1:3000")?
        .set_default("anchor_address", DEFAULT_ANCHOR_ADDRESS)?
        .set_default("universal_resolver_url", "https://dev.uniresolver.io")?
        .set_default("did_jwt_algorithm", "ES256")?
        .set_default("gas_limit", DEFAULT_GAS_LIMIT)?
        .set_default("gas_price_wei", DEFAULT_GAS_PRICE_WEI)?
        .set_default("max_broadcast_attempts", 10_u64)?
        .set_default("rpc_timeout_secs", 30_u64)?
        .set_default("request_timeout_secs", 120_u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::default().try_parsing(true).source(Some(map))
    }

    const REQUIRED: [(&str, &str); 5] = [
        ("ISSUING_ADDRESS", "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"),
        ("PRIVATE_KEY", "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"),
        ("VERIFICATION_METHOD", "did:example:issuer#key-1"),
        ("CHAIN", "ethereum_sepolia"),
        ("RPC_URL", "http://localhost:8545"),
    ];

    #[test]
    fn test_defaults_applied() {
        let settings = Settings::from_source(env(&REQUIRED)).unwrap();
        assert_eq!(settings.chain, Chain::EthereumSepolia);
        assert_eq!(settings.gas_limit, 25_000);
        assert_eq!(settings.min_balance_wei, 25_000 * 20_000_000_000);
        assert_eq!(settings.max_broadcast_attempts, 10);
        assert_eq!(settings.anchor_address, DEFAULT_ANCHOR_ADDRESS);
        assert_eq!(settings.rpc_timeout, Duration::from_secs(30));
        assert!(!format!("{:?}", settings).contains("ac0974bec"));
    }

    #[test]
    fn test_unknown_chain_fails_load() {
        let mut pairs = REQUIRED.to_vec();
        pairs[3] = ("CHAIN", "ethereum_holesky");
        let err = Settings::from_source(env(&pairs)).unwrap_err();
        assert!(err.to_string().contains("unknown chain"));
    }

    #[test]
    fn test_missing_required_key_fails_load() {
        assert!(Settings::from_source(env(&REQUIRED[1..])).is_err());
    }

    #[test]
    fn test_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("GAS_LIMIT", "30000"));
        pairs.push(("MIN_BALANCE_WEI", "1"));
        pairs.push(("MAX_BROADCAST_ATTEMPTS", "3"));
        let settings = Settings::from_source(env(&pairs)).unwrap();
        assert_eq!(settings.gas_limit, 30_000);
        assert_eq!(settings.min_balance_wei, 1);
        assert_eq!(settings.max_broadcast_attempts, 3);
    }

    #[test]
    fn test_trusted_issuers() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push((
            "TRUSTED_ISSUERS",
            "did:web:a.example=0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266, did:web:b.example=0x70997970C51812dc3A010C7d01b50e0d17dc79C8",
        ));
        let settings = Settings::from_source(env(&pairs)).unwrap();
        assert_eq!(settings.trusted_issuers.len(), 2);
        assert_eq!(settings.trusted_issuers[1].0, "did:web:b.example");

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("TRUSTED_ISSUERS", "did:web:a.example=not-an-address"));
        assert!(Settings::from_source(env(&pairs)).is_err());

        assert!(Settings::from_source(env(&REQUIRED)).unwrap().trusted_issuers.is_empty());
    }
}
