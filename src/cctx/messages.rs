//! Observer vote messages and their ballot digests

use super::types::{CallOptions, CoinType, ProtocolContractVersion, RevertOptions};
use crate::ballot::VoteType;
use crate::error::{CrosschainError, CrosschainResult};

use ethers::types::U256;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// Vote on a deposit observed on an external chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgVoteInbound {
    pub creator: String,
    pub sender: String,
    pub sender_chain_id: i64,
    pub tx_origin: String,
    pub receiver: String,
    pub receiver_chain_id: i64,
    /// Decimal integer
    pub amount: String,
    /// Hex encoded payload, `[20-byte contract][calldata]` when non-empty
    #[serde(default)]
    pub message: String,
    pub inbound_hash: String,
    pub inbound_block_height: u64,
    #[serde(default)]
    pub call_options: CallOptions,
    pub coin_type: CoinType,
    #[serde(default)]
    pub asset: String,
    #[serde(default)]
    pub event_index: u64,
    #[serde(default)]
    pub protocol_contract_version: ProtocolContractVersion,
    #[serde(default)]
    pub revert_options: RevertOptions,
}

impl MsgVoteInbound {
    /// Ballot index for this observation; identical for every honest observer
    pub fn digest(&self) -> String {
        let mut d = DigestBuilder::new("inbound");
        d.str(&self.sender)
            .int(self.sender_chain_id)
            .str(&self.tx_origin)
            .str(&self.receiver)
            .int(self.receiver_chain_id)
            .str(&self.amount)
            .str(&self.message)
            .str(&self.inbound_hash)
            .uint(self.inbound_block_height)
            .uint(self.call_options.gas_limit)
            .str(self.coin_type.as_str())
            .str(&self.asset)
            .uint(self.event_index);
        d.finish()
    }

    pub fn validate_basic(&self) -> CrosschainResult<()> {
        if self.creator.is_empty() {
            return Err(CrosschainError::Validation("creator cannot be empty".to_string()));
        }
        if self.inbound_hash.is_empty() {
            return Err(CrosschainError::Validation(
                "inbound hash cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Whether the observed outbound transaction executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiveStatus {
    Success,
    Failed,
}

/// Vote on the result of an outbound leg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgVoteOutbound {
    pub creator: String,
    /// Index of the CCTX the leg belongs to
    pub cctx_hash: String,
    pub outbound_chain_id: i64,
    pub outbound_nonce: u64,
    pub status: ReceiveStatus,
    pub observed_outbound_hash: String,
    pub observed_outbound_block_height: u64,
    pub observed_outbound_gas_used: u64,
    /// Decimal integer
    #[serde(default)]
    pub observed_outbound_effective_gas_price: String,
    pub observed_outbound_effective_gas_limit: u64,
    /// Decimal integer
    #[serde(default)]
    pub value_received: String,
    pub coin_type: CoinType,
}

impl MsgVoteOutbound {
    /// Ballot index for this observation.
    ///
    /// The reported status is left out so that success and failure reports
    /// for the same leg are tallied against each other in one ballot.
    pub fn digest(&self) -> String {
        let mut d = DigestBuilder::new("outbound");
        d.str(&self.cctx_hash)
            .int(self.outbound_chain_id)
            .uint(self.outbound_nonce)
            .str(&self.observed_outbound_hash)
            .uint(self.observed_outbound_block_height)
            .uint(self.observed_outbound_gas_used)
            .str(&self.observed_outbound_effective_gas_price)
            .uint(self.observed_outbound_effective_gas_limit)
            .str(&self.value_received)
            .str(self.coin_type.as_str());
        d.finish()
    }

    pub fn vote_type(&self) -> VoteType {
        match self.status {
            ReceiveStatus::Success => VoteType::Yes,
            ReceiveStatus::Failed => VoteType::No,
        }
    }

    pub fn value_received(&self) -> CrosschainResult<U256> {
        parse_optional_uint("value received", &self.value_received)
    }

    pub fn effective_gas_price(&self) -> CrosschainResult<U256> {
        parse_optional_uint(
            "effective gas price",
            &self.observed_outbound_effective_gas_price,
        )
    }

    pub fn validate_basic(&self) -> CrosschainResult<()> {
        if self.creator.is_empty() {
            return Err(CrosschainError::Validation("creator cannot be empty".to_string()));
        }
        if self.cctx_hash.is_empty() {
            return Err(CrosschainError::Validation("cctx hash cannot be empty".to_string()));
        }
        self.value_received()?;
        self.effective_gas_price()?;
        Ok(())
    }
}

/// Parse a non-negative decimal integer
pub fn parse_uint(field: &str, value: &str) -> CrosschainResult<U256> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CrosschainError::Validation(format!(
            "invalid {}: {:?}",
            field, value
        )));
    }
    U256::from_dec_str(value)
        .map_err(|e| CrosschainError::Validation(format!("invalid {}: {}", field, e)))
}

fn parse_optional_uint(field: &str, value: &str) -> CrosschainResult<U256> {
    if value.is_empty() {
        Ok(U256::zero())
    } else {
        parse_uint(field, value)
    }
}

/// Keccak-256 over length-prefixed fields, so that no two distinct field
/// sequences share an encoding
struct DigestBuilder {
    hasher: Keccak256,
}

impl DigestBuilder {
    fn new(domain: &str) -> Self {
        let mut builder = Self {
            hasher: Keccak256::new(),
        };
        builder.str(domain);
        builder
    }

    fn str(&mut self, value: &str) -> &mut Self {
        self.hasher.update((value.len() as u64).to_be_bytes());
        self.hasher.update(value.as_bytes());
        self
    }

    fn uint(&mut self, value: u64) -> &mut Self {
        self.hasher.update(value.to_be_bytes());
        self
    }

    fn int(&mut self, value: i64) -> &mut Self {
        self.hasher.update(value.to_be_bytes());
        self
    }

    fn finish(self) -> String {
        format!("0x{}", hex::encode(self.hasher.finalize()))
    }
}
