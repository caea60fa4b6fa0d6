//! Ballot engine
//!
//! A ballot collects at most one vote per eligible observer for a single
//! observed event and finalizes once either side reaches the threshold. If
//! every observer has voted and neither side got there, the ballot fails
//! closed.

mod observation;

pub use observation::{Observation, Threshold};

use crate::error::{CrosschainError, CrosschainResult};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Value of a single vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteType {
    /// The observer saw the event succeed
    Yes,
    /// The observer saw the event fail
    No,
}

/// A cast vote. Never modified once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub voter: String,
    pub ballot_index: String,
    pub value: VoteType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BallotStatus {
    Pending,
    FinalizedSuccess,
    FinalizedFailure,
}

impl fmt::Display for BallotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BallotStatus::Pending => "pending",
            BallotStatus::FinalizedSuccess => "finalized_success",
            BallotStatus::FinalizedFailure => "finalized_failure",
        };
        f.write_str(s)
    }
}

/// Running vote counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub yes: usize,
    pub no: usize,
}

/// Voting round over one observed event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    /// Digest of the observed event
    pub index: String,
    pub observation: Observation,
    /// Eligible voters, frozen at creation
    pub voter_list: Vec<String>,
    pub votes: BTreeMap<String, Vote>,
    pub threshold: Threshold,
    pub status: BallotStatus,
    pub created_height: u64,
    pub finalized_height: Option<u64>,
}

impl Ballot {
    /// Create a pending ballot seeded with the current eligible voter set
    pub fn new(
        index: impl Into<String>,
        voter_list: Vec<String>,
        observation: Observation,
        threshold: Threshold,
        created_height: u64,
    ) -> Self {
        Self {
            index: index.into(),
            observation,
            voter_list,
            votes: BTreeMap::new(),
            threshold,
            status: BallotStatus::Pending,
            created_height,
            finalized_height: None,
        }
    }

    /// Record a vote.
    ///
    /// Rejects votes on finalized ballots, from voters outside the frozen
    /// voter list, and second votes from the same voter. The ballot is
    /// returned unchanged in all of those cases (it is consumed and dropped
    /// by the caller, who still holds the stored copy).
    pub fn add_vote(mut self, voter: &str, value: VoteType) -> CrosschainResult<Self> {
        if self.status != BallotStatus::Pending {
            return Err(CrosschainError::BallotAlreadyFinalized(self.index));
        }
        if !self.voter_list.iter().any(|v| v == voter) {
            return Err(CrosschainError::VoterNotEligible {
                ballot: self.index,
                voter: voter.to_string(),
            });
        }
        if self.votes.contains_key(voter) {
            return Err(CrosschainError::DuplicateVote {
                ballot: self.index,
                voter: voter.to_string(),
            });
        }

        debug!(ballot = %self.index, voter, ?value, "vote added");
        self.votes.insert(
            voter.to_string(),
            Vote {
                voter: voter.to_string(),
                ballot_index: self.index.clone(),
                value,
            },
        );
        Ok(self)
    }

    pub fn tally(&self) -> Tally {
        self.votes.values().fold(Tally::default(), |mut t, v| {
            match v.value {
                VoteType::Yes => t.yes += 1,
                VoteType::No => t.no += 1,
            }
            t
        })
    }

    /// Finalize the ballot if the tally allows it.
    ///
    /// Returns `true` only for the call that moves the ballot out of
    /// `Pending`, so callers act on a decision exactly once.
    pub fn check_finalization(mut self, height: u64) -> (Self, bool) {
        if self.status != BallotStatus::Pending {
            return (self, false);
        }

        let tally = self.tally();
        let voters = self.voter_list.len();

        let status = if self.threshold.is_reached(tally.yes, voters) {
            BallotStatus::FinalizedSuccess
        } else if self.threshold.is_reached(tally.no, voters) {
            BallotStatus::FinalizedFailure
        } else if tally.yes + tally.no >= voters {
            // everyone voted, nobody reached threshold
            BallotStatus::FinalizedFailure
        } else {
            return (self, false);
        };

        self.status = status;
        self.finalized_height = Some(height);
        debug!(
            ballot = %self.index,
            %status,
            yes = tally.yes,
            no = tally.no,
            voters,
            "ballot finalized"
        );
        (self, true)
    }

    pub fn is_finalized(&self) -> bool {
        self.status != BallotStatus::Pending
    }

    /// `Some(true)` for a successful finalization, `None` while pending
    pub fn outcome(&self) -> Option<bool> {
        match self.status {
            BallotStatus::Pending => None,
            BallotStatus::FinalizedSuccess => Some(true),
            BallotStatus::FinalizedFailure => Some(false),
        }
    }
}
