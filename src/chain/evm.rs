//! EVM outbound signer with multi-RPC failover

use super::{ChainSigner, OutboundRequest, SignedOutbound};
use crate::cctx::CoinType;
use crate::config::ChainConfig;
use crate::error::{CrosschainError, CrosschainResult};

use async_trait::async_trait;
use ethers::abi::{self, Token};
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::utils::keccak256;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const ON_RECEIVE_SIGNATURE: &str = "onReceive(bytes32,address,uint256,bytes)";

pub struct EvmSigner {
    chain_id: i64,
    gateway: Option<Address>,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    current_provider: AtomicUsize,
    wallet: LocalWallet,
    send_timeout: Duration,
}

impl EvmSigner {
    pub fn new(
        config: &ChainConfig,
        wallet: LocalWallet,
        send_timeout: Duration,
    ) -> CrosschainResult<Self> {
        let mut http_providers = Vec::new();
        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    http_providers.push(provider.interval(Duration::from_millis(100)));
                    debug!("Added HTTP provider for chain {}: {}", config.chain_id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }
        if http_providers.is_empty() {
            return Err(CrosschainError::Signer {
                chain_id: config.chain_id,
                message: "No valid RPC providers".to_string(),
            });
        }

        let gateway = if config.gateway_address.is_empty() {
            None
        } else {
            Some(config.gateway_address.parse::<Address>().map_err(|e| {
                CrosschainError::Config(format!("Invalid gateway address: {}", e))
            })?)
        };

        info!(
            "EVM signer for chain {} initialized with wallet {:?}",
            config.chain_id,
            wallet.address()
        );
        Ok(Self {
            chain_id: config.chain_id,
            gateway,
            http_providers,
            current_provider: AtomicUsize::new(0),
            wallet,
            send_timeout,
        })
    }

    /// Load the signing key from the named environment variable
    pub fn load_wallet(env_name: &str) -> CrosschainResult<LocalWallet> {
        let key = std::env::var(env_name).map_err(|_| {
            CrosschainError::Config(format!("No wallet configured. Set {}", env_name))
        })?;
        key.trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| CrosschainError::Config(format!("Invalid private key: {}", e)))
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.chain_id, next);
    }

    fn signer_error(&self, message: impl Into<String>) -> CrosschainError {
        CrosschainError::Signer {
            chain_id: self.chain_id,
            message: message.into(),
        }
    }

    /// `onReceive(transferId, recipient, amount, message)` calldata
    pub fn encode_on_receive(request: &OutboundRequest, recipient: Address) -> Bytes {
        let selector = ethers::utils::id(ON_RECEIVE_SIGNATURE);
        let mut data = selector.to_vec();
        data.extend(abi::encode(&[
            Token::FixedBytes(request.transfer_id.to_vec()),
            Token::Address(recipient),
            Token::Uint(request.amount),
            Token::Bytes(request.message.clone()),
        ]));
        Bytes::from(data)
    }

    /// Gas coin transfers without a payload go straight to the recipient;
    /// everything else is a gateway call
    fn build_tx(&self, request: &OutboundRequest) -> CrosschainResult<TypedTransaction> {
        let recipient: Address = request
            .recipient
            .parse()
            .map_err(|e| self.signer_error(format!("Invalid recipient address: {}", e)))?;

        let tx = TransactionRequest::new()
            .nonce(request.nonce)
            .gas(request.gas_limit)
            .gas_price(request.gas_price)
            .chain_id(self.chain_id as u64);

        let tx = match (request.coin_type, request.message.is_empty()) {
            (CoinType::Gas, true) => tx.to(recipient).value(request.amount),
            (coin_type, _) => {
                let gateway = self
                    .gateway
                    .ok_or_else(|| self.signer_error("No gateway address configured"))?;
                let value = if coin_type == CoinType::Gas {
                    request.amount
                } else {
                    U256::zero()
                };
                tx.to(gateway)
                    .value(value)
                    .data(Self::encode_on_receive(request, recipient))
            }
        };

        Ok(TypedTransaction::Legacy(tx))
    }
}

#[async_trait]
impl ChainSigner for EvmSigner {
    fn chain_id(&self) -> i64 {
        self.chain_id
    }

    async fn sign(&self, request: &OutboundRequest) -> CrosschainResult<SignedOutbound> {
        let tx = self.build_tx(request)?;
        let wallet = self.wallet.clone().with_chain_id(self.chain_id as u64);
        let signature = wallet
            .sign_transaction(&tx)
            .await
            .map_err(|e| self.signer_error(e.to_string()))?;

        let raw = tx.rlp_signed(&signature).to_vec();
        let hash = format!("0x{}", hex::encode(keccak256(&raw)));
        debug!(
            "Signed outbound nonce {} on chain {}: {}",
            request.nonce, self.chain_id, hash
        );
        Ok(SignedOutbound {
            chain_id: self.chain_id,
            nonce: request.nonce,
            hash,
            raw,
        })
    }

    async fn broadcast(&self, signed: &SignedOutbound) -> CrosschainResult<String> {
        let mut last_error = None;

        for attempt in 1..=self.http_providers.len() {
            let raw = Bytes::from(signed.raw.clone());
            let result = timeout(self.send_timeout, self.http().send_raw_transaction(raw)).await;

            match result {
                Ok(Ok(pending_tx)) => {
                    let tx_hash = format!("{:?}", pending_tx.tx_hash());
                    info!(
                        "Transaction sent on chain {}: {} (attempt {})",
                        self.chain_id, tx_hash, attempt
                    );
                    return Ok(tx_hash);
                }
                Ok(Err(e)) => {
                    let error_msg = e.to_string();
                    // another broadcaster or an earlier cycle got there first
                    if error_msg.contains("already known") || error_msg.contains("nonce too low") {
                        debug!(
                            "Outbound nonce {} on chain {} already submitted: {}",
                            signed.nonce, self.chain_id, error_msg
                        );
                        return Ok(signed.hash.clone());
                    }
                    warn!("Broadcast failed on chain {}: {}", self.chain_id, error_msg);
                    last_error = Some(self.signer_error(error_msg));
                }
                Err(_) => {
                    warn!("Transaction send timeout on chain {} (attempt {})", self.chain_id, attempt);
                    last_error = Some(self.signer_error("send transaction timed out"));
                }
            }
            self.failover();
        }

        Err(last_error.unwrap_or_else(|| self.signer_error("no provider available")))
    }
}
