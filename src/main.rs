// src/main.rs

//! # Blockchain-anchored credential service - Main Entry Point
//!
//! Initializes all core components from the environment and starts the API server.
//!
//! ## Architecture Overview
//! 1. **Blockchain Layer**: `EthereumRpcClient` and `AnchorService` for anchoring Merkle roots
//! 2. **Services Layer**: BlockCerts issuance/verification, DID-JWT and the HTTP API
//! 3. **Resolution Layer**: `UniversalResolver` for DID documents
//!
//! ## Environment Variables Required
//! - `ISSUING_ADDRESS`: Ethereum account that pays for anchoring transactions
//! - `PRIVATE_KEY`: Private key of `ISSUING_ADDRESS`
//! - `VERIFICATION_METHOD`: Verification method written into issued proofs
//! - `CHAIN`: `ethereum_mainnet`, `ethereum_ropsten`, `ethereum_goerli` or `ethereum_sepolia`
//! - `RPC_URL`: JSON-RPC endpoint of that chain
//!
//! Optional variables and their defaults are listed on [`Settings`]. Issuers
//! other than this service are only verified when listed in `TRUSTED_ISSUERS`
//! or when their DID document publishes a `blockchainAccountId`.

use anyhow::Context;
use blockcert_anchor::blockchain::anchor_service::{AnchorService, AnchorSettings, SigningAccount};
use blockcert_anchor::blockchain::ethereum_client::EthereumRpcClient;
use blockcert_anchor::services::api_server::{ApiServer, IssuingIdentity};
use blockcert_anchor::services::credential_issuer::AnchoredIssuer;
use blockcert_anchor::services::did_jwt::{parse_algorithm, DidJwtVcService, IssuerKey};
use blockcert_anchor::services::did_resolver::UniversalResolver;
use blockcert_anchor::services::verifier::BlockCertVerifier;
use blockcert_anchor::utils::canonicalize::JcsCanonicalizer;
use blockcert_anchor::utils::config::Settings;
use dotenv::dotenv;
use ethers::types::{Address, U256};
use std::net::SocketAddr;
use std::sync::Arc;

/// Main application entry point
///
/// # Initialization Sequence
/// 1. Load environment configuration
/// 2. Connect to the Ethereum RPC endpoint
/// 3. Initialize service components
/// 4. Start API server
///
/// # Errors
/// - If required environment variables are missing or `CHAIN` is unknown
/// - If the RPC URL, anchor address or DID-JWT key is invalid
/// - If the bind address cannot be used
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();
    env_logger::init();

    let settings = Settings::from_env().context("invalid configuration")?;
    log::info!("loaded {:?}", settings);

    let rpc = Arc::new(EthereumRpcClient::new(&settings.rpc_url)?);
    match rpc.chain_id().await {
        Ok(id) if id != settings.chain.chain_id() => log::warn!(
            "RPC endpoint reports chain id {} but {} expects {}",
            id,
            settings.chain,
            settings.chain.chain_id()
        ),
        Ok(_) => {}
        Err(e) => log::warn!("could not query chain id: {}", e),
    }

    let anchor_address: Address = settings
        .anchor_address
        .parse()
        .context("ANCHOR_ADDRESS is not an Ethereum address")?;
    let anchoring = AnchorService::new(
        rpc.clone(),
        AnchorSettings {
            anchor_address,
            gas_limit: U256::from(settings.gas_limit),
            gas_price: U256::from(settings.gas_price_wei),
            min_balance: U256::from(settings.min_balance_wei),
            max_broadcast_attempts: settings.max_broadcast_attempts,
            rpc_timeout: settings.rpc_timeout,
        },
    );

    let account = SigningAccount::parse(&settings.issuing_address, settings.private_key.clone())?;
    let resolver = Arc::new(UniversalResolver::new(
        &settings.universal_resolver_url,
        settings.rpc_timeout,
    )?);

    let canonicalizer = Arc::new(JcsCanonicalizer);
    let issuer = AnchoredIssuer::new(canonicalizer.clone(), Arc::new(anchoring));
    // Our own credentials verify against the issuing account.
    let own_did = settings
        .verification_method
        .split('#')
        .next()
        .unwrap_or(&settings.verification_method);
    let mut verifier = BlockCertVerifier::new(canonicalizer)
        .with_chain(settings.chain, rpc)
        .with_rpc_timeout(settings.rpc_timeout)
        .with_resolver(resolver.clone())
        .with_trusted_issuer(own_did, account.address);
    for (did, address) in &settings.trusted_issuers {
        verifier = verifier.with_trusted_issuer(did.clone(), *address);
    }

    let mut did_jwt = DidJwtVcService::new(resolver);
    if let (Some(did), Some(pem)) = (&settings.did_jwt_issuer, &settings.did_jwt_private_key_pem) {
        let algorithm = parse_algorithm(&settings.did_jwt_algorithm)?;
        // .env files usually carry PEM blocks on one line
        let pem = pem.replace("\\n", "\n");
        let key = IssuerKey::from_pem(algorithm, pem.as_bytes())?;
        did_jwt = did_jwt.with_issuer(did.clone(), key);
        log::info!("DID-JWT issuance enabled for {}", did);
    } else {
        log::warn!("DID_JWT_ISSUER or DID_JWT_PRIVATE_KEY_PEM unset; DID-JWT issuance disabled");
    }

    let identity = IssuingIdentity {
        account,
        verification_method: settings.verification_method.clone(),
        chain: settings.chain,
    };

    let api_server = ApiServer::new(
        Arc::new(issuer),
        verifier,
        did_jwt,
        identity,
        settings.request_timeout,
    );

    let addr: SocketAddr = settings
        .bind_addr
        .parse()
        .context("BIND_ADDR is not a socket address")?;
    log::info!("Available endpoints:");
    log::info!("- POST /v1/verifiable-credentials/block-cert");
    log::info!("- POST /v1/verifiable-credentials/block-cert/verify");
    log::info!("- POST /v1/verifiable-credentials/did-jwt");
    log::info!("- POST /v1/verifiable-credentials/did-jwt/verify");

    api_server.run(addr).await?;
    Ok(())
}
