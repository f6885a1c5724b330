// src/blockchain/anchor_service.rs
//! Anchoring service.
//!
//! Commits a Merkle root to chain by sending a zero-value transaction whose
//! calldata is the root. The pipeline is:
//!
//! 1. balance check (abort with `InsufficientBalance` before any signing)
//! 2. fresh nonce from the account's transaction count
//! 3. build and sign a legacy EIP-155 transaction
//! 4. bounded, immediate broadcast retry
//! 5. liveness lookup of the broadcast hash
//!
//! Steps 1-5 run while holding a per-account lock, so two issuances against
//! the same signing account can never read the same nonce.
//!
//! The liveness lookup only shows the node knows the transaction. It says
//! nothing about inclusion or finality.

use crate::blockchain::ethereum_client::ChainRpc;
use crate::blockchain::retry::retry_bounded;
use crate::error::VcError;
use crate::models::chain::Chain;
use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, H256, U256};
use ethers::utils::keccak256;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Account that signs and pays for anchoring transactions.
#[derive(Clone)]
pub struct SigningAccount {
    pub address: Address,
    private_key: String,
}

impl SigningAccount {
    /// Creates an account from its address and hex encoded private key.
    pub fn new(address: Address, private_key: impl Into<String>) -> Self {
        Self {
            address,
            private_key: private_key.into(),
        }
    }

    /// Parses the address from a hex string.
    pub fn parse(address: &str, private_key: impl Into<String>) -> Result<Self, VcError> {
        let address = address
            .parse::<Address>()
            .map_err(|e| VcError::InvalidRequest(format!("invalid signing address: {}", e)))?;
        Ok(Self::new(address, private_key))
    }

    fn wallet(&self, chain: Chain) -> Result<LocalWallet, VcError> {
        let wallet = self
            .private_key
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| VcError::Signing(format!("invalid private key: {}", e)))?;
        if wallet.address() != self.address {
            return Err(VcError::Signing(format!(
                "private key does not control account 0x{:x}",
                self.address
            )));
        }
        Ok(wallet.with_chain_id(chain.chain_id()))
    }
}

impl std::fmt::Debug for SigningAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningAccount")
            .field("address", &self.address)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Result of a successful broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorReceipt {
    pub chain: Chain,
    /// `0x` prefixed transaction hash
    pub transaction_id: String,
    /// Whether the node returned the transaction on lookup after broadcast
    pub known_to_node: bool,
}

/// Anything that can commit a payload to a chain.
#[async_trait]
pub trait Anchoring: Send + Sync {
    async fn anchor(
        &self,
        account: &SigningAccount,
        chain: Chain,
        payload: &[u8],
    ) -> Result<AnchorReceipt, VcError>;
}

/// Transaction parameters that stay fixed for the life of the service.
#[derive(Debug, Clone)]
pub struct AnchorSettings {
    /// Recipient of anchoring transactions (a burn address)
    pub anchor_address: Address,
    pub gas_limit: U256,
    pub gas_price: U256,
    /// Balance below which no transaction is attempted
    pub min_balance: U256,
    pub max_broadcast_attempts: usize,
    /// Deadline applied to every individual RPC call
    pub rpc_timeout: Duration,
}

impl Default for AnchorSettings {
    fn default() -> Self {
        let gas_limit = U256::from(25_000u64);
        let gas_price = U256::from(20_000_000_000u64);
        Self {
            anchor_address: crate::utils::config::DEFAULT_ANCHOR_ADDRESS
                .parse()
                .unwrap_or_default(),
            gas_limit,
            gas_price,
            min_balance: gas_limit * gas_price,
            max_broadcast_attempts: 10,
            rpc_timeout: Duration::from_secs(30),
        }
    }
}

/// Anchors payloads on an EVM chain through a [`ChainRpc`].
pub struct AnchorService {
    rpc: Arc<dyn ChainRpc>,
    settings: AnchorSettings,
    account_locks: Mutex<HashMap<Address, Arc<tokio::sync::Mutex<()>>>>,
}

impl AnchorService {
    pub fn new(rpc: Arc<dyn ChainRpc>, settings: AnchorSettings) -> Self {
        Self {
            rpc,
            settings,
            account_locks: Mutex::new(HashMap::new()),
        }
    }

    fn account_lock(&self, address: Address) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .account_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(address).or_default().clone()
    }

    async fn timed<T>(
        &self,
        stage: &str,
        call: impl Future<Output = Result<T, VcError>>,
    ) -> Result<T, VcError> {
        tokio::time::timeout(self.settings.rpc_timeout, call)
            .await
            .map_err(|_| VcError::Timeout(stage.to_string()))?
    }

    async fn ensure_balance(&self, address: Address) -> Result<(), VcError> {
        let balance = self.timed("balance query", self.rpc.balance(address)).await?;
        if balance < self.settings.min_balance {
            return Err(VcError::InsufficientBalance {
                address,
                balance,
                required: self.settings.min_balance,
            });
        }
        log::debug!("account 0x{:x} balance {} wei", address, balance);
        Ok(())
    }

    async fn build_signed(
        &self,
        account: &SigningAccount,
        chain: Chain,
        payload: &[u8],
    ) -> Result<Bytes, VcError> {
        let wallet = account.wallet(chain)?;
        let nonce = self
            .timed("nonce query", self.rpc.transaction_count(account.address))
            .await?;
        log::debug!("account 0x{:x} using nonce {}", account.address, nonce);

        let tx: TypedTransaction = TransactionRequest::new()
            .from(account.address)
            .to(self.settings.anchor_address)
            .value(U256::zero())
            .data(Bytes::from(payload.to_vec()))
            .gas(self.settings.gas_limit)
            .gas_price(self.settings.gas_price)
            .chain_id(chain.chain_id())
            .nonce(nonce)
            .into();

        let signature = wallet
            .sign_transaction(&tx)
            .await
            .map_err(|e| VcError::Signing(e.to_string()))?;
        Ok(tx.rlp_signed(&signature))
    }

    /// Broadcasts `raw`, retrying immediately on failure.
    ///
    /// A failed attempt is forgiven if the node already holds the transaction
    /// (`keccak256(raw)`), which happens when an earlier attempt was accepted
    /// but its response was lost.
    async fn broadcast(&self, raw: Bytes) -> Result<H256, VcError> {
        let expected = H256::from(keccak256(raw.as_ref()));
        retry_bounded(self.settings.max_broadcast_attempts, |_| {
            let raw = raw.clone();
            async move {
                let error = match self.timed("broadcast", self.rpc.send_raw_transaction(raw)).await {
                    Ok(hash) => return Ok(hash),
                    Err(e) => e,
                };
                match self.timed("transaction lookup", self.rpc.transaction(expected)).await {
                    Ok(Some(_)) => {
                        log::warn!("broadcast failed ({}) but node holds {:?}", error, expected);
                        Ok(expected)
                    }
                    _ => Err(error),
                }
            }
        })
        .await
        .map_err(|attempts| VcError::BroadcastFailed { attempts })
    }

    async fn is_known(&self, hash: H256) -> bool {
        match self.timed("transaction lookup", self.rpc.transaction(hash)).await {
            Ok(Some(_)) => true,
            Ok(None) => {
                log::warn!("transaction {:?} not yet known to node after broadcast", hash);
                false
            }
            Err(e) => {
                log::warn!("lookup of transaction {:?} failed: {}", hash, e);
                false
            }
        }
    }
}

#[async_trait]
impl Anchoring for AnchorService {
    async fn anchor(
        &self,
        account: &SigningAccount,
        chain: Chain,
        payload: &[u8],
    ) -> Result<AnchorReceipt, VcError> {
        let lock = self.account_lock(account.address);
        let _guard = lock.lock().await;

        self.ensure_balance(account.address).await?;
        let raw = self.build_signed(account, chain, payload).await?;
        let hash = self.broadcast(raw).await?;
        let known_to_node = self.is_known(hash).await;

        let transaction_id = format!("{:?}", hash);
        log::info!("anchored {} bytes on {} in {}", payload.len(), chain, transaction_id);
        Ok(AnchorReceipt {
            chain,
            transaction_id,
            known_to_node,
        })
    }
}
