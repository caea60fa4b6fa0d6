//! Capabilities the keeper consumes from its host
//!
//! - `Authority`: who may submit which message
//! - `FungibleKeeper`: foreign coin registry and in-protocol deposits

use crate::cctx::CoinType;
use crate::error::{CrosschainError, CrosschainResult};

use ethers::types::{Address, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Mutex;
use tracing::debug;

/// Message kinds that require authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    VoteInbound { chain_id: i64 },
    VoteOutbound { chain_id: i64 },
    RemoveCctx,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::VoteInbound { chain_id } => write!(f, "vote inbound on chain {}", chain_id),
            Action::VoteOutbound { chain_id } => write!(f, "vote outbound on chain {}", chain_id),
            Action::RemoveCctx => f.write_str("remove cctx"),
        }
    }
}

pub trait Authority: Send + Sync {
    fn is_authorized(&self, actor: &str, action: &Action) -> bool;
}

/// Observers may vote on the chains they observe; admins run the rest
#[derive(Debug, Clone, Default)]
pub struct ObserverAuthority {
    observers: BTreeSet<String>,
    admins: BTreeSet<String>,
    /// Empty means every chain
    chains: BTreeSet<i64>,
}

impl ObserverAuthority {
    pub fn new(
        observers: impl IntoIterator<Item = String>,
        admins: impl IntoIterator<Item = String>,
        chains: impl IntoIterator<Item = i64>,
    ) -> Self {
        Self {
            observers: observers.into_iter().collect(),
            admins: admins.into_iter().collect(),
            chains: chains.into_iter().collect(),
        }
    }

    fn observes(&self, chain_id: i64) -> bool {
        self.chains.is_empty() || self.chains.contains(&chain_id)
    }
}

impl Authority for ObserverAuthority {
    fn is_authorized(&self, actor: &str, action: &Action) -> bool {
        match action {
            Action::VoteInbound { chain_id } | Action::VoteOutbound { chain_id } => {
                self.observers.contains(actor) && self.observes(*chain_id)
            }
            Action::RemoveCctx => self.admins.contains(actor),
        }
    }
}

/// Minted representation of a foreign chain asset on the protocol chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignCoin {
    pub zrc20_contract: String,
    pub foreign_chain_id: i64,
    pub coin_type: CoinType,
    /// Asset address on the foreign chain; empty for gas coins
    #[serde(default)]
    pub asset: String,
    pub symbol: String,
}

/// Contract call carried by an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub contract: Address,
    pub data: Vec<u8>,
}

impl ContractCall {
    /// Decode a hex message laid out as `[20-byte contract][calldata]`.
    /// An empty message is a plain transfer.
    pub fn parse(message: &str) -> CrosschainResult<Option<Self>> {
        if message.is_empty() {
            return Ok(None);
        }
        let bytes = hex::decode(message.trim_start_matches("0x"))
            .map_err(|e| CrosschainError::Validation(format!("invalid message hex: {}", e)))?;
        if bytes.len() < 20 {
            return Err(CrosschainError::Validation("invalid message length".to_string()));
        }
        Ok(Some(Self {
            contract: Address::from_slice(&bytes[..20]),
            data: bytes[20..].to_vec(),
        }))
    }
}

/// Result of an in-protocol deposit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositReceipt {
    pub tx_hash: String,
    pub gas_used: u64,
    pub failed: bool,
    pub vm_error: String,
}

pub trait FungibleKeeper: Send + Sync {
    fn foreign_coins(&self) -> Vec<ForeignCoin>;

    /// Mint `amount` of a ZRC20 to `recipient`, then invoke `call` if any
    fn deposit_and_call(
        &self,
        zrc20_contract: &str,
        recipient: &str,
        amount: U256,
        call: Option<&ContractCall>,
    ) -> CrosschainResult<DepositReceipt>;

    /// Mint the protocol native coin to `recipient`, then invoke `call` if any
    fn mint_native(
        &self,
        recipient: &str,
        amount: U256,
        call: Option<&ContractCall>,
    ) -> CrosschainResult<DepositReceipt>;
}

const NATIVE_DENOM: &str = "native";

/// Fungible module kept in memory: a fixed coin registry and a balance book
#[derive(Debug, Default)]
pub struct InMemoryFungible {
    coins: Vec<ForeignCoin>,
    balances: Mutex<BTreeMap<(String, String), U256>>,
    deposits: Mutex<u64>,
}

impl InMemoryFungible {
    pub fn new(coins: Vec<ForeignCoin>) -> Self {
        Self {
            coins,
            balances: Mutex::new(BTreeMap::new()),
            deposits: Mutex::new(0),
        }
    }

    pub fn balance_of(&self, denom: &str, account: &str) -> U256 {
        self.balances
            .lock()
            .ok()
            .and_then(|b| b.get(&(denom.to_string(), account.to_lowercase())).copied())
            .unwrap_or_default()
    }

    fn credit(
        &self,
        denom: &str,
        recipient: &str,
        amount: U256,
        call: Option<&ContractCall>,
    ) -> CrosschainResult<DepositReceipt> {
        let mut balances = self
            .balances
            .lock()
            .map_err(|_| CrosschainError::Internal("balance book poisoned".to_string()))?;
        let mut deposits = self
            .deposits
            .lock()
            .map_err(|_| CrosschainError::Internal("deposit counter poisoned".to_string()))?;

        // the call target receives the funds when a call is attached
        let account = match call {
            Some(c) => format!("{:?}", c.contract),
            None => recipient.to_lowercase(),
        };
        let balance = balances.entry((denom.to_string(), account.clone())).or_default();
        *balance = balance.checked_add(amount).ok_or_else(|| {
            CrosschainError::SettlementExecution(format!("balance overflow for {}", account))
        })?;

        *deposits += 1;
        let mut preimage = Vec::new();
        preimage.extend_from_slice(denom.as_bytes());
        preimage.extend_from_slice(account.as_bytes());
        preimage.extend_from_slice(&deposits.to_be_bytes());
        let tx_hash = format!("0x{}", hex::encode(keccak256(&preimage)));

        debug!("Deposited {} {} to {} ({})", amount, denom, account, tx_hash);
        Ok(DepositReceipt {
            tx_hash,
            gas_used: if call.is_some() { 150_000 } else { 21_000 },
            failed: false,
            vm_error: String::new(),
        })
    }
}

impl FungibleKeeper for InMemoryFungible {
    fn foreign_coins(&self) -> Vec<ForeignCoin> {
        self.coins.clone()
    }

    fn deposit_and_call(
        &self,
        zrc20_contract: &str,
        recipient: &str,
        amount: U256,
        call: Option<&ContractCall>,
    ) -> CrosschainResult<DepositReceipt> {
        if !self.coins.iter().any(|c| c.zrc20_contract == zrc20_contract) {
            return Err(CrosschainError::SettlementExecution(format!(
                "unknown zrc20 contract {}",
                zrc20_contract
            )));
        }
        self.credit(zrc20_contract, recipient, amount, call)
    }

    fn mint_native(
        &self,
        recipient: &str,
        amount: U256,
        call: Option<&ContractCall>,
    ) -> CrosschainResult<DepositReceipt> {
        self.credit(NATIVE_DENOM, recipient, amount, call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observer_authority() {
        let auth = ObserverAuthority::new(
            vec!["obs".to_string()],
            vec!["admin".to_string()],
            vec![5, 97],
        );
        assert!(auth.is_authorized("obs", &Action::VoteInbound { chain_id: 5 }));
        assert!(!auth.is_authorized("obs", &Action::VoteInbound { chain_id: 1 }));
        assert!(!auth.is_authorized("obs", &Action::RemoveCctx));
        assert!(auth.is_authorized("admin", &Action::RemoveCctx));
        assert!(!auth.is_authorized("admin", &Action::VoteOutbound { chain_id: 97 }));
    }

    #[test]
    fn test_parse_contract_call() {
        assert_eq!(ContractCall::parse("").unwrap(), None);

        let message = format!("{}{}", "11".repeat(20), "deadbeef");
        let call = ContractCall::parse(&message).unwrap().unwrap();
        assert_eq!(call.contract, Address::repeat_byte(0x11));
        assert_eq!(call.data, vec![0xde, 0xad, 0xbe, 0xef]);

        assert!(ContractCall::parse("abcd").is_err());
        assert!(ContractCall::parse("zz").is_err());
    }

    #[test]
    fn test_in_memory_deposit() {
        let fungible = InMemoryFungible::new(vec![ForeignCoin {
            zrc20_contract: "0xzrc20eth".to_string(),
            foreign_chain_id: 5,
            coin_type: CoinType::Gas,
            asset: String::new(),
            symbol: "gETH".to_string(),
        }]);

        let receipt = fungible
            .deposit_and_call("0xzrc20eth", "0xABC", U256::from(42), None)
            .unwrap();
        assert!(!receipt.failed);
        assert!(receipt.tx_hash.starts_with("0x"));
        assert_eq!(fungible.balance_of("0xzrc20eth", "0xabc"), U256::from(42));

        assert!(matches!(
            fungible.deposit_and_call("0xunknown", "0xabc", U256::from(1), None),
            Err(CrosschainError::SettlementExecution(_))
        ));
    }
}
