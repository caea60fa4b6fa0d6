//! Protocol events
//!
//! Emitted by state transitions into the executing block's context; the node
//! logs them and feeds them to metrics.

use crate::ballot::{BallotStatus, Observation};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrosschainEvent {
    /// A ballot left `Pending`
    BallotFinalized {
        ballot: String,
        observation: Observation,
        status: BallotStatus,
    },

    /// Inbound finalized and an outbound leg was assigned
    InboundFinalized {
        index: String,
        sender_chain_id: i64,
        receiver_chain_id: i64,
        amount: String,
        nonce: u64,
    },

    /// Inbound settled directly on the protocol chain
    InboundSettled { index: String, hash: String },

    /// Outbound leg confirmed mined
    OutboundMined {
        index: String,
        chain_id: i64,
        hash: String,
    },

    /// Primary leg failed, revert leg queued
    RevertQueued {
        index: String,
        chain_id: i64,
        nonce: u64,
    },

    /// Revert leg confirmed mined
    Reverted { index: String, chain_id: i64 },

    /// CCTX aborted
    Aborted { index: String, reason: String },

    /// CCTX removed administratively
    CctxRemoved { index: String },
}

impl CrosschainEvent {
    /// Get event name
    pub fn name(&self) -> &'static str {
        match self {
            CrosschainEvent::BallotFinalized { .. } => "BallotFinalized",
            CrosschainEvent::InboundFinalized { .. } => "InboundFinalized",
            CrosschainEvent::InboundSettled { .. } => "InboundSettled",
            CrosschainEvent::OutboundMined { .. } => "OutboundMined",
            CrosschainEvent::RevertQueued { .. } => "RevertQueued",
            CrosschainEvent::Reverted { .. } => "Reverted",
            CrosschainEvent::Aborted { .. } => "Aborted",
            CrosschainEvent::CctxRemoved { .. } => "CctxRemoved",
        }
    }

    /// Chain the event concerns, if any
    pub fn chain_id(&self) -> Option<i64> {
        match self {
            CrosschainEvent::BallotFinalized { observation, .. } => Some(observation.chain_id()),
            CrosschainEvent::InboundFinalized {
                receiver_chain_id, ..
            } => Some(*receiver_chain_id),
            CrosschainEvent::OutboundMined { chain_id, .. }
            | CrosschainEvent::RevertQueued { chain_id, .. }
            | CrosschainEvent::Reverted { chain_id, .. } => Some(*chain_id),
            CrosschainEvent::InboundSettled { .. }
            | CrosschainEvent::Aborted { .. }
            | CrosschainEvent::CctxRemoved { .. } => None,
        }
    }
}
