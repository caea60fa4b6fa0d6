//! What a ballot is about, and how many votes it takes to decide it

use crate::error::{CrosschainError, CrosschainResult};

use serde::{Deserialize, Serialize};
use std::fmt;

/// The observed event a ballot tallies votes for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observation {
    /// A deposit seen on an external chain
    Inbound { sender_chain_id: i64 },
    /// The result of an outbound leg on its destination chain
    Outbound { receiver_chain_id: i64, nonce: u64 },
}

impl Observation {
    /// Chain the observation was made on
    pub fn chain_id(&self) -> i64 {
        match self {
            Observation::Inbound { sender_chain_id } => *sender_chain_id,
            Observation::Outbound {
                receiver_chain_id, ..
            } => *receiver_chain_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Observation::Inbound { .. } => "inbound",
            Observation::Outbound { .. } => "outbound",
        }
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observation::Inbound { sender_chain_id } => {
                write!(f, "inbound from chain {}", sender_chain_id)
            }
            Observation::Outbound {
                receiver_chain_id,
                nonce,
            } => write!(f, "outbound to chain {} nonce {}", receiver_chain_id, nonce),
        }
    }
}

/// Fraction of eligible voters one side needs to finalize a ballot.
///
/// Kept as an integer ratio so every replica evaluates it identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threshold {
    pub numerator: u64,
    pub denominator: u64,
}

impl Threshold {
    pub fn new(numerator: u64, denominator: u64) -> CrosschainResult<Self> {
        let threshold = Self {
            numerator,
            denominator,
        };
        threshold.validate()?;
        Ok(threshold)
    }

    pub fn validate(&self) -> CrosschainResult<()> {
        if self.denominator == 0 || self.numerator == 0 || self.numerator > self.denominator {
            return Err(CrosschainError::Validation(format!(
                "invalid ballot threshold {}/{}",
                self.numerator, self.denominator
            )));
        }
        Ok(())
    }

    /// `count / voters >= numerator / denominator`
    pub fn is_reached(&self, count: usize, voters: usize) -> bool {
        if voters == 0 {
            return false;
        }
        (count as u128) * (self.denominator as u128)
            >= (self.numerator as u128) * (voters as u128)
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self {
            numerator: 2,
            denominator: 3,
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_of_three() {
        let t = Threshold::default();
        assert!(!t.is_reached(1, 3));
        assert!(t.is_reached(2, 3));
        assert!(t.is_reached(3, 3));
    }

    #[test]
    fn test_majority_of_four() {
        let t = Threshold::new(1, 2).unwrap();
        assert!(!t.is_reached(1, 4));
        assert!(t.is_reached(2, 4));
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        assert!(Threshold::new(0, 3).is_err());
        assert!(Threshold::new(4, 3).is_err());
        assert!(Threshold::new(1, 0).is_err());
    }

    #[test]
    fn test_no_voters_never_reaches() {
        assert!(!Threshold::new(1, 1).unwrap().is_reached(0, 0));
    }
}
