//! Per-destination-chain nonce allocation for outbound legs
//!
//! Handles:
//! - Strictly increasing nonce assignment per chain
//! - Tracking which CCTX holds each pending nonce
//! - Confirmation when the leg's outbound ballot finalizes

use crate::error::{CrosschainError, CrosschainResult};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Nonce state of one destination chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainNonces {
    pub chain_id: i64,
    /// Next nonce to assign
    pub next: u64,
    /// Pending legs: nonce -> cctx index
    pub pending: BTreeMap<u64, String>,
    /// Highest nonce whose leg finalized
    pub confirmed: Option<u64>,
}

impl ChainNonces {
    pub fn new(chain_id: i64, start: u64) -> Self {
        Self {
            chain_id,
            next: start,
            pending: BTreeMap::new(),
            confirmed: None,
        }
    }

    /// Assign the next nonce to a CCTX leg
    pub fn allocate(&mut self, cctx_index: &str) -> CrosschainResult<u64> {
        let nonce = self.next;
        self.next = self.next.checked_add(1).ok_or(CrosschainError::Nonce {
            chain_id: self.chain_id,
            message: "nonce space exhausted".to_string(),
        })?;
        self.pending.insert(nonce, cctx_index.to_string());

        debug!("Allocated nonce {} on chain {} to {}", nonce, self.chain_id, cctx_index);
        Ok(nonce)
    }

    /// The leg holding `nonce` finalized (mined or failed)
    pub fn confirm(&mut self, nonce: u64) -> CrosschainResult<()> {
        if self.pending.remove(&nonce).is_none() {
            return Err(CrosschainError::Nonce {
                chain_id: self.chain_id,
                message: format!("nonce {} is not pending", nonce),
            });
        }
        if self.confirmed.map_or(true, |c| nonce > c) {
            self.confirmed = Some(nonce);
        }
        Ok(())
    }

    /// Lowest and highest pending nonce
    pub fn pending_range(&self) -> Option<(u64, u64)> {
        let low = self.pending.keys().next()?;
        let high = self.pending.keys().next_back()?;
        Some((*low, *high))
    }

    pub fn cctx_for_nonce(&self, nonce: u64) -> Option<&str> {
        self.pending.get(&nonce).map(String::as_str)
    }

    /// Align with the nonce the chain reports as next; never moves backwards
    pub fn sync(&mut self, on_chain_next: u64) {
        if on_chain_next > self.next {
            warn!(
                "Nonce gap detected on chain {}: expected {}, got {}",
                self.chain_id, self.next, on_chain_next
            );
            self.next = on_chain_next;
        }
    }
}
