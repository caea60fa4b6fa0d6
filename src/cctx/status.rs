//! CCTX lifecycle status and the legal transitions between states

use crate::error::{CrosschainError, CrosschainResult};

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CctxStatus {
    PendingInbound,
    PendingOutbound,
    PendingRevert,
    OutboundMined,
    Reverted,
    Aborted,
}

impl CctxStatus {
    pub const ALL: [CctxStatus; 6] = [
        CctxStatus::PendingInbound,
        CctxStatus::PendingOutbound,
        CctxStatus::PendingRevert,
        CctxStatus::OutboundMined,
        CctxStatus::Reverted,
        CctxStatus::Aborted,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CctxStatus::OutboundMined | CctxStatus::Reverted | CctxStatus::Aborted
        )
    }

    /// Whether an outbound leg is waiting to be signed and confirmed
    pub fn is_pending_outbound(&self) -> bool {
        matches!(self, CctxStatus::PendingOutbound | CctxStatus::PendingRevert)
    }

    pub fn can_transition_to(&self, to: CctxStatus) -> bool {
        use CctxStatus::*;
        match (self, to) {
            (from, _) if from.is_terminal() => false,
            (_, Aborted) => true,
            (PendingInbound, PendingOutbound) | (PendingInbound, OutboundMined) => true,
            (PendingOutbound, OutboundMined) | (PendingOutbound, PendingRevert) => true,
            (PendingRevert, Reverted) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CctxStatus::PendingInbound => "pending_inbound",
            CctxStatus::PendingOutbound => "pending_outbound",
            CctxStatus::PendingRevert => "pending_revert",
            CctxStatus::OutboundMined => "outbound_mined",
            CctxStatus::Reverted => "reverted",
            CctxStatus::Aborted => "aborted",
        }
    }
}

impl fmt::Display for CctxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status plus the human readable reason for the last change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub status: CctxStatus,
    pub status_message: String,
    pub last_update_timestamp: i64,
}

impl Status {
    pub fn new(timestamp: i64) -> Self {
        Self {
            status: CctxStatus::PendingInbound,
            status_message: String::new(),
            last_update_timestamp: timestamp,
        }
    }

    /// Move to `to`, or fail without touching the status
    pub fn change_status(
        &mut self,
        to: CctxStatus,
        message: impl Into<String>,
        timestamp: i64,
    ) -> CrosschainResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(CrosschainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.status_message = message.into();
        self.last_update_timestamp = timestamp;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_are_final() {
        for from in [CctxStatus::OutboundMined, CctxStatus::Reverted, CctxStatus::Aborted] {
            for to in CctxStatus::ALL {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_abort_reachable_from_non_terminal() {
        for from in CctxStatus::ALL.iter().filter(|s| !s.is_terminal()) {
            assert!(from.can_transition_to(CctxStatus::Aborted));
        }
    }

    #[test]
    fn test_revert_only_from_pending_outbound() {
        assert!(CctxStatus::PendingOutbound.can_transition_to(CctxStatus::PendingRevert));
        assert!(!CctxStatus::PendingInbound.can_transition_to(CctxStatus::PendingRevert));
        assert!(!CctxStatus::PendingRevert.can_transition_to(CctxStatus::OutboundMined));
        assert!(!CctxStatus::PendingOutbound.can_transition_to(CctxStatus::Reverted));
    }

    #[test]
    fn test_change_status_leaves_state_on_error() {
        let mut status = Status::new(1);
        status
            .change_status(CctxStatus::Aborted, "cannot get gas coin", 2)
            .unwrap();
        let err = status
            .change_status(CctxStatus::PendingOutbound, "retry", 3)
            .unwrap_err();
        assert!(matches!(err, CrosschainError::InvalidStateTransition { .. }));
        assert_eq!(status.status, CctxStatus::Aborted);
        assert_eq!(status.status_message, "cannot get gas coin");
        assert_eq!(status.last_update_timestamp, 2);
    }
}
