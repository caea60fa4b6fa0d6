//! The cross-chain transaction record

use super::messages::{parse_uint, MsgVoteInbound, MsgVoteOutbound};
use super::status::{CctxStatus, Status};
use crate::ballot::BallotStatus;
use crate::error::{CrosschainError, CrosschainResult};

use ethers::types::U256;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoinType {
    /// Protocol native coin
    Zeta,
    /// Gas coin of the sender chain
    Gas,
    Erc20,
}

impl CoinType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoinType::Zeta => "zeta",
            CoinType::Gas => "gas",
            CoinType::Erc20 => "erc20",
        }
    }
}

/// Version of the gateway contracts the inbound was emitted by.
///
/// Records stored before the field existed deserialize as `V1`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolContractVersion {
    #[default]
    V1,
    V2,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallOptions {
    pub gas_limit: u64,
    #[serde(default)]
    pub is_arbitrary_call: bool,
}

/// What to do when the primary outbound leg fails
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevertOptions {
    /// Empty means the original sender
    #[serde(default)]
    pub revert_address: String,
    #[serde(default)]
    pub revert_gas_limit: u64,
    #[serde(default)]
    pub revert_disabled: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxFinalizationStatus {
    #[default]
    NotFinalized,
    Finalized,
    Executed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundParams {
    pub sender: String,
    pub sender_chain_id: i64,
    pub tx_origin: String,
    pub coin_type: CoinType,
    pub asset: String,
    #[serde(with = "decimal")]
    pub amount: U256,
    pub observed_hash: String,
    pub observed_external_height: u64,
    pub event_index: u64,
    pub ballot_index: String,
    /// Protocol height at which the inbound ballot finalized
    pub finalized_height: u64,
}

/// One outbound attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundParams {
    pub receiver: String,
    pub receiver_chain_id: i64,
    pub coin_type: CoinType,
    #[serde(with = "decimal")]
    pub amount: U256,
    pub nonce: u64,
    pub call_options: CallOptions,
    /// Decimal integer, empty until assigned
    pub gas_price: String,
    pub ballot_index: String,
    /// Observed hash once mined
    pub hash: String,
    pub observed_external_height: u64,
    pub gas_used: u64,
    #[serde(with = "decimal")]
    pub effective_gas_price: U256,
    pub effective_gas_limit: u64,
    pub tx_finalization_status: TxFinalizationStatus,
    /// Position of the elected broadcaster in `CrossChainTx::signers`
    pub broadcaster: u64,
}

impl OutboundParams {
    fn new(receiver: String, receiver_chain_id: i64, coin_type: CoinType, gas_limit: u64) -> Self {
        Self {
            receiver,
            receiver_chain_id,
            coin_type,
            amount: U256::zero(),
            nonce: 0,
            call_options: CallOptions {
                gas_limit,
                is_arbitrary_call: false,
            },
            gas_price: String::new(),
            ballot_index: String::new(),
            hash: String::new(),
            observed_external_height: 0,
            gas_used: 0,
            effective_gas_price: U256::zero(),
            effective_gas_limit: 0,
            tx_finalization_status: TxFinalizationStatus::NotFinalized,
            broadcaster: 0,
        }
    }
}

/// Authoritative record of one cross-chain transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainTx {
    pub creator: String,
    pub index: String,
    #[serde(default)]
    pub relayed_message: String,
    pub status: Status,
    pub inbound_params: InboundParams,
    /// Append-only; the last entry is the current leg
    pub outbound_params: Vec<OutboundParams>,
    #[serde(default)]
    pub revert_options: RevertOptions,
    #[serde(default)]
    pub protocol_contract_version: ProtocolContractVersion,
    /// Observer set the current leg's broadcaster was elected from
    #[serde(default)]
    pub signers: Vec<String>,
}

impl CrossChainTx {
    /// Build a `PendingInbound` record from a validated inbound vote.
    ///
    /// The outbound amount and nonce stay zero until the inbound finalizes.
    pub fn new(msg: &MsgVoteInbound, index: &str, timestamp: i64) -> CrosschainResult<Self> {
        if index.is_empty() {
            return Err(CrosschainError::Validation("index cannot be empty".to_string()));
        }
        if msg.sender.is_empty() {
            return Err(CrosschainError::Validation("sender cannot be empty".to_string()));
        }
        if msg.receiver.is_empty() {
            return Err(CrosschainError::Validation("receiver cannot be empty".to_string()));
        }
        if msg.sender_chain_id == 0 {
            return Err(CrosschainError::Validation(
                "sender chain id cannot be empty".to_string(),
            ));
        }
        if msg.receiver_chain_id == 0 {
            return Err(CrosschainError::Validation(
                "receiver chain id cannot be empty".to_string(),
            ));
        }
        let amount = parse_uint("amount", &msg.amount)?;

        let inbound_params = InboundParams {
            sender: msg.sender.clone(),
            sender_chain_id: msg.sender_chain_id,
            tx_origin: msg.tx_origin.clone(),
            coin_type: msg.coin_type,
            asset: msg.asset.clone(),
            amount,
            observed_hash: msg.inbound_hash.clone(),
            observed_external_height: msg.inbound_block_height,
            event_index: msg.event_index,
            ballot_index: index.to_string(),
            finalized_height: 0,
        };

        let mut outbound = OutboundParams::new(
            msg.receiver.clone(),
            msg.receiver_chain_id,
            msg.coin_type,
            msg.call_options.gas_limit,
        );
        outbound.call_options.is_arbitrary_call = msg.call_options.is_arbitrary_call;

        Ok(Self {
            creator: msg.creator.clone(),
            index: index.to_string(),
            relayed_message: msg.message.clone(),
            status: Status::new(timestamp),
            inbound_params,
            outbound_params: vec![outbound],
            revert_options: msg.revert_options.clone(),
            protocol_contract_version: msg.protocol_contract_version,
            signers: Vec::new(),
        })
    }

    pub fn current_status(&self) -> CctxStatus {
        self.status.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.status.is_terminal()
    }

    pub fn current_outbound(&self) -> CrosschainResult<&OutboundParams> {
        self.outbound_params
            .last()
            .ok_or_else(|| CrosschainError::Internal(format!("cctx {} has no outbound", self.index)))
    }

    pub fn current_outbound_mut(&mut self) -> CrosschainResult<&mut OutboundParams> {
        let index = self.index.clone();
        self.outbound_params
            .last_mut()
            .ok_or_else(|| CrosschainError::Internal(format!("cctx {} has no outbound", index)))
    }

    /// Zero-based number of the current leg
    pub fn current_leg(&self) -> usize {
        self.outbound_params.len().saturating_sub(1)
    }

    /// Record an observed outbound result on the current leg.
    ///
    /// On a successful outcome the reported value must match the leg's
    /// amount exactly; on mismatch nothing is recorded.
    pub fn add_outbound(
        &mut self,
        msg: &MsgVoteOutbound,
        outcome: BallotStatus,
    ) -> CrosschainResult<()> {
        let value_received = msg.value_received()?;
        let effective_gas_price = msg.effective_gas_price()?;

        let current = self.current_outbound_mut()?;
        if outcome == BallotStatus::FinalizedSuccess && value_received != current.amount {
            return Err(CrosschainError::AmountMismatch {
                expected: current.amount.to_string(),
                received: value_received.to_string(),
            });
        }

        current.hash = msg.observed_outbound_hash.clone();
        current.observed_external_height = msg.observed_outbound_block_height;
        current.gas_used = msg.observed_outbound_gas_used;
        current.effective_gas_price = effective_gas_price;
        current.effective_gas_limit = msg.observed_outbound_effective_gas_limit;
        current.tx_finalization_status = TxFinalizationStatus::Executed;
        Ok(())
    }

    /// Where a revert leg pays out: the revert address if set, otherwise the
    /// original sender, always on the sender chain
    pub fn revert_destination(&self) -> (String, i64) {
        let receiver = if self.revert_options.revert_address.is_empty() {
            self.inbound_params.sender.clone()
        } else {
            self.revert_options.revert_address.clone()
        };
        (receiver, self.inbound_params.sender_chain_id)
    }

    /// Append a revert leg carrying the current leg's amount back to the
    /// sender side. Nonce, gas price and broadcaster are assigned afterwards.
    pub fn add_revert_outbound(&mut self) -> CrosschainResult<()> {
        if self.revert_options.revert_disabled {
            return Err(CrosschainError::Validation(format!(
                "revert disabled for cctx {}",
                self.index
            )));
        }
        let current = self.current_outbound()?;
        let amount = current.amount;
        let gas_limit = if self.revert_options.revert_gas_limit > 0 {
            self.revert_options.revert_gas_limit
        } else {
            current.call_options.gas_limit
        };

        let (receiver, chain_id) = self.revert_destination();
        if receiver.is_empty() {
            return Err(CrosschainError::Validation(
                "revert receiver cannot be empty".to_string(),
            ));
        }

        let mut leg = OutboundParams::new(receiver, chain_id, self.inbound_params.coin_type, gas_limit);
        leg.amount = amount;
        self.outbound_params.push(leg);
        Ok(())
    }

    /// Stable identifier used in log lines
    pub fn log_identifier(&self) -> String {
        let (chain, nonce) = self
            .outbound_params
            .last()
            .map(|o| (o.receiver_chain_id, o.nonce))
            .unwrap_or_default();
        format!(
            "{}-{}-{}-{}",
            self.inbound_params.sender, self.inbound_params.sender_chain_id, chain, nonce
        )
    }
}

/// U256 as a decimal string on the wire
mod decimal {
    use ethers::types::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let s = String::deserialize(deserializer)?;
        U256::from_dec_str(&s).map_err(serde::de::Error::custom)
    }
}
