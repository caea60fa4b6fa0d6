//! In-memory replicated store
//!
//! Every collection is a `BTreeMap` so iteration order is identical on all
//! replicas.

use crate::ballot::{Ballot, Observation, Threshold};
use crate::cctx::{CctxStatus, CrossChainTx};
use crate::error::{CrosschainError, CrosschainResult};
use crate::outbound::ChainNonces;

use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Bound;
use tracing::debug;

/// Last external height an inbound was observed at, per sender chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastBlockHeight {
    pub chain_id: i64,
    pub last_inbound_height: u64,
}

/// Replicated bridge state
#[derive(Debug, Clone, Default)]
pub struct CrosschainStore {
    cctxs: BTreeMap<String, CrossChainTx>,
    ballots: BTreeMap<String, Ballot>,
    chain_nonces: BTreeMap<i64, ChainNonces>,
    gas_prices: BTreeMap<i64, U256>,
    last_block_heights: BTreeMap<i64, LastBlockHeight>,
    inbound_hash_to_cctx: BTreeMap<String, String>,
}

impl CrosschainStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a destination chain available for outbound legs
    pub fn register_chain(&mut self, chain_id: i64, gas_price: U256, start_nonce: u64) {
        self.chain_nonces
            .entry(chain_id)
            .or_insert_with(|| ChainNonces::new(chain_id, start_nonce));
        self.gas_prices.insert(chain_id, gas_price);
        debug!("Registered chain {} (gas price {}, start nonce {})", chain_id, gas_price, start_nonce);
    }

    pub fn is_chain_supported(&self, chain_id: i64) -> bool {
        self.chain_nonces.contains_key(&chain_id)
    }

    // ---- cctx ----

    pub fn get_cctx(&self, index: &str) -> Option<&CrossChainTx> {
        self.cctxs.get(index)
    }

    pub fn set_cctx(&mut self, cctx: CrossChainTx) {
        self.inbound_hash_to_cctx.insert(
            cctx.inbound_params.observed_hash.clone(),
            cctx.index.clone(),
        );
        self.cctxs.insert(cctx.index.clone(), cctx);
    }

    /// Remove a CCTX; returns whether it existed
    pub fn remove_cctx(&mut self, index: &str) -> bool {
        match self.cctxs.remove(index) {
            Some(cctx) => {
                if self
                    .inbound_hash_to_cctx
                    .get(&cctx.inbound_params.observed_hash)
                    .is_some_and(|i| i == index)
                {
                    self.inbound_hash_to_cctx
                        .remove(&cctx.inbound_params.observed_hash);
                }
                true
            }
            None => false,
        }
    }

    pub fn cctx_by_inbound_hash(&self, inbound_hash: &str) -> Option<&CrossChainTx> {
        self.inbound_hash_to_cctx
            .get(inbound_hash)
            .and_then(|index| self.cctxs.get(index))
    }

    pub fn cctx_count(&self) -> usize {
        self.cctxs.len()
    }

    /// CCTXs in index order, starting at `from` (inclusive) when given
    pub fn cctxs_from<'a>(
        &'a self,
        from: Option<&str>,
    ) -> Box<dyn Iterator<Item = &'a CrossChainTx> + 'a> {
        match from {
            Some(key) => Box::new(
                self.cctxs
                    .range::<str, _>((Bound::Included(key), Bound::Unbounded))
                    .map(|(_, c)| c),
            ),
            None => Box::new(self.cctxs.values()),
        }
    }

    // ---- ballots ----

    pub fn get_ballot(&self, index: &str) -> Option<&Ballot> {
        self.ballots.get(index)
    }

    /// Existing ballot for `index`, or a fresh one seeded with `voters`.
    ///
    /// A fresh ballot is not stored until `set_ballot` is called.
    pub fn get_or_create_ballot(
        &self,
        index: &str,
        voters: &[String],
        observation: Observation,
        threshold: Threshold,
        height: u64,
    ) -> Ballot {
        match self.ballots.get(index) {
            Some(ballot) => ballot.clone(),
            None => Ballot::new(index, voters.to_vec(), observation, threshold, height),
        }
    }

    pub fn set_ballot(&mut self, ballot: Ballot) {
        self.ballots.insert(ballot.index.clone(), ballot);
    }

    pub fn ballot_count(&self) -> usize {
        self.ballots.len()
    }

    /// Drop ballots finalized strictly before `height`
    pub fn prune_ballots(&mut self, height: u64) -> usize {
        let before = self.ballots.len();
        self.ballots
            .retain(|_, b| b.finalized_height.map_or(true, |h| h >= height));
        before - self.ballots.len()
    }

    // ---- chain params ----

    pub fn gas_price(&self, chain_id: i64) -> Option<U256> {
        self.gas_prices.get(&chain_id).copied()
    }

    pub fn set_gas_price(&mut self, chain_id: i64, price: U256) {
        self.gas_prices.insert(chain_id, price);
    }

    pub fn chain_nonces(&self, chain_id: i64) -> Option<&ChainNonces> {
        self.chain_nonces.get(&chain_id)
    }

    pub fn chain_nonces_mut(&mut self, chain_id: i64) -> CrosschainResult<&mut ChainNonces> {
        self.chain_nonces
            .get_mut(&chain_id)
            .ok_or(CrosschainError::ChainNotFound { chain_id })
    }

    pub fn last_block_height(&self, chain_id: i64) -> Option<&LastBlockHeight> {
        self.last_block_heights.get(&chain_id)
    }

    pub fn set_last_inbound_height(&mut self, chain_id: i64, height: u64) {
        self.last_block_heights
            .entry(chain_id)
            .and_modify(|l| l.last_inbound_height = height)
            .or_insert(LastBlockHeight {
                chain_id,
                last_inbound_height: height,
            });
    }

    /// Count of CCTXs per status
    pub fn get_stats(&self) -> CctxStats {
        let mut stats = CctxStats::default();
        for cctx in self.cctxs.values() {
            *stats.by_status.entry(cctx.current_status()).or_insert(0) += 1;
        }
        stats.total = self.cctxs.len() as u64;
        stats
    }
}

/// CCTX statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CctxStats {
    pub total: u64,
    pub by_status: BTreeMap<CctxStatus, u64>,
}

impl CctxStats {
    pub fn count(&self, status: CctxStatus) -> u64 {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ballot::VoteType;
    use crate::cctx::messages::tests::sample_inbound;

    fn cctx(n: usize) -> CrossChainTx {
        let mut msg = sample_inbound("observer-0");
        msg.inbound_hash = format!("0xhash{}", n);
        CrossChainTx::new(&msg, &format!("{}", n), 0).unwrap()
    }

    #[test]
    fn test_set_get_remove() {
        let mut store = CrosschainStore::new();
        for i in 0..5 {
            store.set_cctx(cctx(i));
        }
        assert_eq!(store.cctx_count(), 5);
        assert_eq!(store.cctx_by_inbound_hash("0xhash2").unwrap().index, "2");

        assert!(store.remove_cctx("0"));
        assert_eq!(store.cctx_count(), 4);
        assert!(store.cctx_by_inbound_hash("0xhash0").is_none());

        // removing again is a no-op
        assert!(!store.remove_cctx("0"));
        assert_eq!(store.cctx_count(), 4);
    }

    #[test]
    fn test_iteration_from_key() {
        let mut store = CrosschainStore::new();
        for i in 0..5 {
            store.set_cctx(cctx(i));
        }
        let indices: Vec<_> = store.cctxs_from(Some("2")).map(|c| c.index.clone()).collect();
        assert_eq!(indices, vec!["2", "3", "4"]);
    }

    #[test]
    fn test_existing_ballot_keeps_voter_set() {
        let mut store = CrosschainStore::new();
        let voters = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let obs = Observation::Inbound { sender_chain_id: 5 };
        let ballot = store.get_or_create_ballot("0x01", &voters, obs, Threshold::default(), 1);
        let ballot = ballot.add_vote("a", VoteType::Yes).unwrap();
        store.set_ballot(ballot);

        let changed = vec!["d".to_string()];
        let again = store.get_or_create_ballot("0x01", &changed, obs, Threshold::default(), 2);
        assert_eq!(again.voter_list, voters);
        assert_eq!(again.votes.len(), 1);
    }

    #[test]
    fn test_prune_only_finalized_before_height() {
        let mut store = CrosschainStore::new();
        let voters = vec!["a".to_string()];
        let obs = Observation::Inbound { sender_chain_id: 5 };

        let (old, _) = Ballot::new("old", voters.clone(), obs, Threshold::default(), 1)
            .add_vote("a", VoteType::Yes)
            .unwrap()
            .check_finalization(3);
        let (recent, _) = Ballot::new("recent", voters.clone(), obs, Threshold::default(), 1)
            .add_vote("a", VoteType::Yes)
            .unwrap()
            .check_finalization(10);
        let open = Ballot::new("open", voters, obs, Threshold::default(), 1);
        store.set_ballot(old);
        store.set_ballot(recent);
        store.set_ballot(open);

        assert_eq!(store.prune_ballots(10), 1);
        assert!(store.get_ballot("old").is_none());
        assert!(store.get_ballot("recent").is_some());
        assert!(store.get_ballot("open").is_some());
    }

    #[test]
    fn test_stats_by_status() {
        let mut store = CrosschainStore::new();
        store.set_cctx(cctx(0));
        let mut aborted = cctx(1);
        aborted
            .status
            .change_status(CctxStatus::Aborted, "test", 1)
            .unwrap();
        store.set_cctx(aborted);

        let stats = store.get_stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.count(CctxStatus::PendingInbound), 1);
        assert_eq!(stats.count(CctxStatus::Aborted), 1);
        assert_eq!(stats.count(CctxStatus::OutboundMined), 0);
    }
}
