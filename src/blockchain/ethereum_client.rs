// src/blockchain/ethereum_client.rs
//! Ethereum JSON-RPC client.
//!
//! The anchoring and verification services only need four node operations:
//! balance, transaction count, raw broadcast and transaction lookup. They are
//! expressed by the [`ChainRpc`] trait so the services can run against any
//! node (or an in-memory ledger in tests).

use crate::error::VcError;
use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, Bytes, H256, U256};
use std::sync::Arc;

/// A transaction as seen by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub hash: H256,
    pub from: Address,
    /// Calldata; for anchoring transactions this is the Merkle root
    pub input: Bytes,
    /// `None` while the transaction is still pending
    pub block_number: Option<u64>,
}

/// Balance/nonce/broadcast/lookup provider for one chain.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Balance of `address` in wei.
    async fn balance(&self, address: Address) -> Result<U256, VcError>;

    /// Number of transactions sent from `address`, used as the next nonce.
    async fn transaction_count(&self, address: Address) -> Result<U256, VcError>;

    /// Broadcasts an RLP-encoded signed transaction and returns its hash.
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, VcError>;

    /// Looks a transaction up by hash; `None` if the node does not know it.
    async fn transaction(&self, hash: H256) -> Result<Option<TransactionRecord>, VcError>;
}

/// [`ChainRpc`] backed by an ethers HTTP provider.
#[derive(Clone)]
pub struct EthereumRpcClient {
    /// Ethereum RPC provider
    provider: Arc<Provider<Http>>,
}

impl EthereumRpcClient {
    /// Creates a client for `rpc_url`. No request is made until first use.
    ///
    /// # Errors
    /// Returns error if the URL cannot be parsed.
    pub fn new(rpc_url: &str) -> Result<Self, VcError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| VcError::Rpc(format!("invalid RPC URL {}: {}", rpc_url, e)))?;
        Ok(Self {
            provider: Arc::new(provider),
        })
    }

    /// Chain ID reported by the node.
    pub async fn chain_id(&self) -> Result<u64, VcError> {
        self.provider
            .get_chainid()
            .await
            .map(|id| id.as_u64())
            .map_err(|e| VcError::Rpc(e.to_string()))
    }
}

#[async_trait]
impl ChainRpc for EthereumRpcClient {
    async fn balance(&self, address: Address) -> Result<U256, VcError> {
        self.provider
            .get_balance(address, None)
            .await
            .map_err(|e| VcError::Rpc(format!("eth_getBalance failed: {}", e)))
    }

    async fn transaction_count(&self, address: Address) -> Result<U256, VcError> {
        self.provider
            .get_transaction_count(address, None)
            .await
            .map_err(|e| VcError::Rpc(format!("eth_getTransactionCount failed: {}", e)))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, VcError> {
        self.provider
            .send_raw_transaction(raw)
            .await
            .map(|pending| pending.tx_hash())
            .map_err(|e| VcError::Rpc(format!("eth_sendRawTransaction failed: {}", e)))
    }

    async fn transaction(&self, hash: H256) -> Result<Option<TransactionRecord>, VcError> {
        let tx = self
            .provider
            .get_transaction(hash)
            .await
            .map_err(|e| VcError::Rpc(format!("eth_getTransactionByHash failed: {}", e)))?;

        Ok(tx.map(|tx| TransactionRecord {
            hash: tx.hash,
            from: tx.from,
            input: tx.input,
            block_number: tx.block_number.map(|n| n.as_u64()),
        }))
    }
}
