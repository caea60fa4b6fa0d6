//! Error types for the cross-chain relay core

use thiserror::Error;

/// Main error type for ballot, CCTX and relay operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CrosschainError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{actor} is not authorized to {action}")]
    Unauthorized { actor: String, action: String },

    #[error("Voter {voter} already voted on ballot {ballot}")]
    DuplicateVote { ballot: String, voter: String },

    #[error("Voter {voter} is not eligible to vote on ballot {ballot}")]
    VoterNotEligible { ballot: String, voter: String },

    #[error("Ballot {0} is already finalized")]
    BallotAlreadyFinalized(String),

    #[error("Value received {received} does not match outbound amount {expected}")]
    AmountMismatch { expected: String, received: String },

    #[error("Asset resolution failed: {0}")]
    AssetResolution(String),

    #[error("Settlement execution failed: {0}")]
    SettlementExecution(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Nonce error for chain {chain_id}: {message}")]
    Nonce { chain_id: i64, message: String },

    #[error("Chain {chain_id} not found")]
    ChainNotFound { chain_id: i64 },

    #[error("Signer error for chain {chain_id}: {message}")]
    Signer { chain_id: i64, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CrosschainError {
    /// Shorthand for a missing cross-chain transaction
    pub fn cctx_not_found(index: impl Into<String>) -> Self {
        CrosschainError::NotFound {
            kind: "CCTX",
            id: index.into(),
        }
    }

    /// Check if error is retryable by the relay monitor
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CrosschainError::Signer { .. }
                | CrosschainError::ChainNotFound { .. }
                | CrosschainError::Internal(_)
        )
    }

    /// Errors that divert an already finalized inbound to `Aborted`
    pub fn is_settlement_failure(&self) -> bool {
        matches!(
            self,
            CrosschainError::AssetResolution(_)
                | CrosschainError::SettlementExecution(_)
                | CrosschainError::Nonce { .. }
                | CrosschainError::ChainNotFound { .. }
                | CrosschainError::Validation(_)
        )
    }
}

/// Result type for relay core operations
pub type CrosschainResult<T> = Result<T, CrosschainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_mismatch_message() {
        let err = CrosschainError::AmountMismatch {
            expected: "42".to_string(),
            received: "7".to_string(),
        };
        assert!(err.to_string().contains("7"));
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(CrosschainError::Signer {
            chain_id: 5,
            message: "rpc down".to_string()
        }
        .is_retryable());
        assert!(!CrosschainError::BallotAlreadyFinalized("0x01".to_string()).is_retryable());
        assert!(!CrosschainError::cctx_not_found("0x01").is_retryable());
    }
}
