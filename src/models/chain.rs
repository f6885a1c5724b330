// src/models/chain.rs
//! Chain registry.
//!
//! Static mapping between chain names, numeric EIP-155 chain IDs and the
//! BlockCerts "blink" URI prefixes used in anchor links. Every lookup is an
//! exhaustive `match` with no fallback arm, so adding a variant forces every
//! mapping to be filled in.

use crate::error::UnknownChain;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported anchoring chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Chain {
    EthereumMainnet,
    EthereumRopsten,
    EthereumGoerli,
    EthereumSepolia,
}

impl Chain {
    /// Every chain in the registry.
    pub const ALL: [Chain; 4] = [
        Chain::EthereumMainnet,
        Chain::EthereumRopsten,
        Chain::EthereumGoerli,
        Chain::EthereumSepolia,
    ];

    /// Registry name, e.g. `ethereum_sepolia`.
    pub fn name(self) -> &'static str {
        match self {
            Chain::EthereumMainnet => "ethereum_mainnet",
            Chain::EthereumRopsten => "ethereum_ropsten",
            Chain::EthereumGoerli => "ethereum_goerli",
            Chain::EthereumSepolia => "ethereum_sepolia",
        }
    }

    /// EIP-155 chain ID used when signing transactions.
    pub fn chain_id(self) -> u64 {
        match self {
            Chain::EthereumMainnet => 1,
            Chain::EthereumRopsten => 3,
            Chain::EthereumGoerli => 5,
            Chain::EthereumSepolia => 11_155_111,
        }
    }

    /// Blink URI prefix, e.g. `eth:sepolia`.
    pub fn prefix(self) -> &'static str {
        match self {
            Chain::EthereumMainnet => "eth:mainnet",
            Chain::EthereumRopsten => "eth:ropsten",
            Chain::EthereumGoerli => "eth:goerli",
            Chain::EthereumSepolia => "eth:sepolia",
        }
    }

    /// Builds the anchor link `blink:<prefix>:<transaction_id>`.
    pub fn blink(self, transaction_id: &str) -> String {
        format!("blink:{}:{}", self.prefix(), transaction_id)
    }

    /// Splits an anchor link back into its chain and transaction ID.
    ///
    /// # Errors
    /// `UnknownChain` if the link is malformed or its prefix is not registered.
    pub fn parse_blink(link: &str) -> Result<(Chain, String), UnknownChain> {
        let rest = link
            .strip_prefix("blink:")
            .ok_or_else(|| UnknownChain(link.to_string()))?;
        for chain in Chain::ALL {
            if let Some(tx) = rest
                .strip_prefix(chain.prefix())
                .and_then(|r| r.strip_prefix(':'))
            {
                if !tx.is_empty() {
                    return Ok((chain, tx.to_string()));
                }
            }
        }
        Err(UnknownChain(link.to_string()))
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Chain {
    type Err = UnknownChain;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Chain::ALL
            .into_iter()
            .find(|chain| chain.name() == s)
            .ok_or_else(|| UnknownChain(s.to_string()))
    }
}

impl TryFrom<String> for Chain {
    type Error = UnknownChain;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Chain> for String {
    fn from(chain: Chain) -> Self {
        chain.name().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_chain_has_distinct_id_and_prefix() {
        let ids: HashSet<u64> = Chain::ALL.iter().map(|c| c.chain_id()).collect();
        let prefixes: HashSet<&str> = Chain::ALL.iter().map(|c| c.prefix()).collect();
        assert_eq!(ids.len(), Chain::ALL.len());
        assert_eq!(prefixes.len(), Chain::ALL.len());
    }

    #[test]
    fn test_blink_uses_registered_prefix() {
        for chain in Chain::ALL {
            let link = chain.blink("0xabc");
            assert_eq!(link, format!("blink:{}:0xabc", chain.prefix()));
            assert_eq!(Chain::parse_blink(&link).unwrap(), (chain, "0xabc".to_string()));
        }
        assert_eq!(Chain::EthereumSepolia.blink("0xabc"), "blink:eth:sepolia:0xabc");
    }

    #[test]
    fn test_names_round_trip() {
        for chain in Chain::ALL {
            assert_eq!(chain.name().parse::<Chain>().unwrap(), chain);
        }
        assert_eq!(Chain::EthereumGoerli.chain_id(), 5);
        assert_eq!(Chain::EthereumSepolia.chain_id(), 11_155_111);
    }

    #[test]
    fn test_unknown_names_fail_closed() {
        for name in ["", "bitcoin_mainnet", "ETHEREUM_MAINNET", "ethereum"] {
            assert_eq!(name.parse::<Chain>(), Err(UnknownChain(name.to_string())));
        }
        let parsed: Result<Chain, _> = serde_json::from_str("\"ethereum_holesky\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_parse_blink_rejects_foreign_links() {
        assert!(Chain::parse_blink("blink:btc:mainnet:abcd").is_err());
        assert!(Chain::parse_blink("eth:sepolia:0xabc").is_err());
        assert!(Chain::parse_blink("blink:eth:sepolia:").is_err());
    }
}
