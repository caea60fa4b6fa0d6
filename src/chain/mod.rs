//! Chain module - outbound signing and broadcast per destination chain
//!
//! This module provides:
//! - The `ChainSigner` capability the relay monitor drives
//! - A registry of signers indexed by chain ID
//! - An ethers-based EVM signer

pub mod evm;

pub use evm::EvmSigner;

use crate::cctx::CoinType;
use crate::config::Settings;
use crate::error::{CrosschainError, CrosschainResult};

use async_trait::async_trait;
use dashmap::DashMap;
use ethers::types::U256;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Everything a signer needs to build one outbound transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub chain_id: i64,
    pub recipient: String,
    pub coin_type: CoinType,
    pub amount: U256,
    pub gas_limit: u64,
    pub gas_price: U256,
    pub nonce: u64,
    pub message: Vec<u8>,
    /// CCTX index, identifies the transfer on the destination side
    pub transfer_id: [u8; 32],
}

/// A signed transaction, ready to broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedOutbound {
    pub chain_id: i64,
    pub nonce: u64,
    pub hash: String,
    pub raw: Vec<u8>,
}

/// Signs and broadcasts outbound transactions on one chain
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainSigner: Send + Sync {
    fn chain_id(&self) -> i64;

    async fn sign(&self, request: &OutboundRequest) -> CrosschainResult<SignedOutbound>;

    /// Returns the transaction hash reported by the chain
    async fn broadcast(&self, signed: &SignedOutbound) -> CrosschainResult<String>;
}

/// Signers indexed by chain ID
#[derive(Default)]
pub struct SignerRegistry {
    signers: DashMap<i64, Arc<dyn ChainSigner>>,
}

impl SignerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build EVM signers for every enabled chain with RPC endpoints
    pub fn from_settings(settings: &Settings) -> CrosschainResult<Self> {
        let registry = Self::new();
        let chains: Vec<_> = settings
            .enabled_chains()
            .into_iter()
            .filter(|(_, c)| !c.rpc_urls.is_empty())
            .collect();
        if chains.is_empty() {
            warn!("No chain has RPC endpoints, outbound signing disabled");
            return Ok(registry);
        }

        let wallet = EvmSigner::load_wallet(&settings.wallet.private_key_env)?;
        let timeout = Duration::from_secs(settings.monitor.broadcast_timeout_secs);
        for (name, chain_config) in chains {
            info!(
                "Initializing signer for chain {} (ID: {})",
                name, chain_config.chain_id
            );
            let signer = EvmSigner::new(chain_config, wallet.clone(), timeout)?;
            registry.register(Arc::new(signer));
        }
        Ok(registry)
    }

    pub fn register(&self, signer: Arc<dyn ChainSigner>) {
        self.signers.insert(signer.chain_id(), signer);
    }

    /// Get signer for a specific chain
    pub fn get(&self, chain_id: i64) -> CrosschainResult<Arc<dyn ChainSigner>> {
        self.signers
            .get(&chain_id)
            .map(|s| s.clone())
            .ok_or(CrosschainError::ChainNotFound { chain_id })
    }

    pub fn chain_ids(&self) -> Vec<i64> {
        self.signers.iter().map(|e| *e.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let registry = SignerRegistry::new();
        let mut signer = MockChainSigner::new();
        signer.expect_chain_id().return_const(97i64);
        registry.register(Arc::new(signer));

        assert!(registry.get(97).is_ok());
        assert_eq!(registry.chain_ids(), vec![97]);
        assert!(matches!(
            registry.get(5),
            Err(CrosschainError::ChainNotFound { chain_id: 5 })
        ));
    }
}
