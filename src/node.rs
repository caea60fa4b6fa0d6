//! Node: applies messages to the keeper one block at a time
//!
//! Every accepted message runs in its own block. A rejected message leaves
//! the store and the height untouched. Block time is supplied by the caller
//! and must be identical on every replica: broadcaster election reads it.

use crate::ballot::Threshold;
use crate::capability::{InMemoryFungible, ObserverAuthority};
use crate::cctx::{CrossChainTx, MsgVoteInbound, MsgVoteOutbound};
use crate::config::Settings;
use crate::error::{CrosschainError, CrosschainResult};
use crate::keeper::{BlockContext, Keeper, PageRequest, PageResponse};
use crate::metrics;
use crate::monitor::CctxSource;
use crate::state::CctxStats;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

struct Ledger {
    keeper: Keeper,
    /// Height of the last applied block
    height: u64,
}

pub struct Node {
    ledger: RwLock<Ledger>,
    /// Finalized ballots older than this many blocks are pruned; 0 keeps all
    retention: u64,
}

impl Node {
    pub fn new(keeper: Keeper, retention: u64) -> Self {
        Self {
            ledger: RwLock::new(Ledger { keeper, height: 0 }),
            retention,
        }
    }

    pub fn from_settings(settings: &Settings) -> CrosschainResult<Self> {
        let chains = settings.enabled_chains();
        let authority = ObserverAuthority::new(
            settings.node.observers.clone(),
            settings.node.admins.clone(),
            chains.iter().map(|(_, c)| c.chain_id),
        );
        let fungible = InMemoryFungible::new(settings.foreign_coins.clone());
        let threshold: Threshold = settings.ballot.threshold();

        let mut keeper = Keeper::new(
            settings.node.observers.clone(),
            threshold,
            settings.node.protocol_chain_id,
            Arc::new(authority),
            Arc::new(fungible),
        )?;
        for (name, chain) in chains {
            let gas_price = chain
                .gas_price()
                .map_err(|e| CrosschainError::Config(e.to_string()))?;
            keeper.register_chain(chain.chain_id, gas_price, chain.start_nonce);
            info!(
                "Registered chain {} (ID: {}) starting at nonce {}",
                name, chain.chain_id, chain.start_nonce
            );
        }

        Ok(Self::new(keeper, settings.node.ballot_retention_blocks))
    }

    pub async fn apply_inbound(
        &self,
        block_time: DateTime<Utc>,
        msg: &MsgVoteInbound,
    ) -> CrosschainResult<bool> {
        let result = self
            .execute(block_time, |keeper, block| keeper.vote_inbound(block, msg))
            .await;
        metrics::record_vote("inbound", vote_result(&result));
        result
    }

    pub async fn apply_outbound(
        &self,
        block_time: DateTime<Utc>,
        msg: &MsgVoteOutbound,
    ) -> CrosschainResult<bool> {
        let result = self
            .execute(block_time, |keeper, block| keeper.vote_outbound(block, msg))
            .await;
        metrics::record_vote("outbound", vote_result(&result));
        result
    }

    pub async fn remove_cctx(
        &self,
        block_time: DateTime<Utc>,
        actor: &str,
        index: &str,
    ) -> CrosschainResult<bool> {
        self.execute(block_time, |keeper, block| {
            keeper.remove_cctx(block, actor, index)
        })
        .await
    }

    /// Run one message in a fresh block at `block_time` and commit the block
    /// on success
    async fn execute<T>(
        &self,
        block_time: DateTime<Utc>,
        apply: impl FnOnce(&mut Keeper, &mut BlockContext) -> CrosschainResult<T>,
    ) -> CrosschainResult<T> {
        let mut ledger = self.ledger.write().await;
        let mut block = BlockContext::new(ledger.height + 1, block_time);

        let output = match apply(&mut ledger.keeper, &mut block) {
            Ok(output) => output,
            Err(e) => {
                debug!("Message rejected at height {}: {}", block.height, e);
                return Err(e);
            }
        };

        ledger.height = block.height;
        for event in block.events() {
            info!("Block {} event {}: {:?}", block.height, event.name(), event);
            metrics::record_event(event);
        }

        if self.retention > 0 && block.height % self.retention == 0 {
            let pruned = ledger
                .keeper
                .prune_ballots(block.height.saturating_sub(self.retention));
            metrics::record_ballots_pruned(pruned);
        }
        metrics::record_block_height(block.height);
        metrics::record_cctx_stats(&ledger.keeper.stats());

        Ok(output)
    }

    pub async fn get_cctx(&self, index: &str) -> CrosschainResult<CrossChainTx> {
        self.ledger.read().await.keeper.get_cctx(index)
    }

    pub async fn cctx_by_inbound_hash(&self, inbound_hash: &str) -> CrosschainResult<CrossChainTx> {
        self.ledger.read().await.keeper.cctx_by_inbound_hash(inbound_hash)
    }

    pub async fn list_cctx(
        &self,
        request: Option<&PageRequest>,
    ) -> CrosschainResult<(Vec<CrossChainTx>, PageResponse)> {
        self.ledger.read().await.keeper.list_cctx(request)
    }

    pub async fn stats(&self) -> CctxStats {
        self.ledger.read().await.keeper.stats()
    }

    pub async fn height(&self) -> u64 {
        self.ledger.read().await.height
    }
}

fn vote_result(result: &CrosschainResult<bool>) -> &'static str {
    match result {
        Ok(true) => "finalized",
        Ok(false) => "accepted",
        Err(_) => "rejected",
    }
}

#[async_trait]
impl CctxSource for Node {
    async fn pending_cctxs(&self) -> CrosschainResult<Vec<CrossChainTx>> {
        let ledger = self.ledger.read().await;
        Ok(ledger
            .keeper
            .store()
            .cctxs_from(None)
            .filter(|c| c.current_status().is_pending_outbound())
            .cloned()
            .collect())
    }

    async fn cctx(&self, index: &str) -> CrosschainResult<Option<CrossChainTx>> {
        Ok(self.ledger.read().await.keeper.store().get_cctx(index).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cctx::messages::tests::{sample_inbound, sample_outbound};
    use crate::cctx::CctxStatus;
    use chrono::TimeZone;

    const SETTINGS: &str = r#"
[node]
observer_id = "observer-1"
observers = ["observer-0", "observer-1", "observer-2"]
admins = ["admin"]
protocol_chain_id = 7000
ballot_retention_blocks = 3

[api]
host = "127.0.0.1"
port = 8080

[metrics]
enabled = false
port = 9090

[chains.goerli]
chain_id = 5
name = "goerli"
gas_price = "10"
enabled = true

[chains.bsc]
chain_id = 97
name = "bsc"
gas_price = "20"
start_nonce = 7
enabled = true
"#;

    fn node() -> Node {
        let settings: Settings = toml::from_str(SETTINGS).unwrap();
        Node::from_settings(&settings).unwrap()
    }

    /// Block time `n` seconds and `n` nanoseconds past a fixed epoch
    fn at(n: u32) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + i64::from(n), n).unwrap()
    }

    #[tokio::test]
    async fn test_inbound_finalizes_into_pending_outbound() {
        let node = node();
        assert!(!node.apply_inbound(at(1), &sample_inbound("observer-0")).await.unwrap());
        assert!(node.apply_inbound(at(1), &sample_inbound("observer-1")).await.unwrap());
        assert_eq!(node.height().await, 2);

        let pending = node.pending_cctxs().await.unwrap();
        assert_eq!(pending.len(), 1);
        let leg = pending[0].current_outbound().unwrap();
        assert_eq!(leg.nonce, 7);
        assert_eq!(leg.gas_price, "20");

        let by_hash = node.cctx_by_inbound_hash("0xfeed").await.unwrap();
        assert_eq!(by_hash.index, pending[0].index);
    }

    #[tokio::test]
    async fn test_rejected_message_keeps_height() {
        let node = node();
        node.apply_inbound(at(1), &sample_inbound("observer-0")).await.unwrap();
        assert!(node.apply_inbound(at(1), &sample_inbound("observer-0")).await.is_err());
        assert!(node.apply_inbound(at(1), &sample_inbound("intruder")).await.is_err());
        assert_eq!(node.height().await, 1);
    }

    #[tokio::test]
    async fn test_outbound_vote_mines_leg() {
        let node = node();
        let msg = sample_inbound("observer-0");
        let index = msg.digest();
        node.apply_inbound(at(1), &msg).await.unwrap();
        node.apply_inbound(at(1), &sample_inbound("observer-2")).await.unwrap();

        for creator in ["observer-0", "observer-1"] {
            let mut vote = sample_outbound(creator, &index, "42");
            vote.outbound_nonce = 7;
            node.apply_outbound(at(2), &vote).await.unwrap();
        }

        let cctx = node.cctx(&index).await.unwrap().unwrap();
        assert_eq!(cctx.current_status(), CctxStatus::OutboundMined);
        assert!(node.pending_cctxs().await.unwrap().is_empty());
        assert_eq!(node.stats().await.count(CctxStatus::OutboundMined), 1);
    }

    #[tokio::test]
    async fn test_ballots_pruned_after_retention() {
        let node = node();
        let mut first = None;
        // ballots finalize at heights 2, 4 and 6
        for hash in ["0xa1", "0xb2", "0xc3"] {
            for creator in ["observer-0", "observer-1"] {
                let mut msg = sample_inbound(creator);
                msg.inbound_hash = hash.to_string();
                first.get_or_insert_with(|| msg.digest());
                node.apply_inbound(at(1), &msg).await.unwrap();
            }
        }
        assert_eq!(node.height().await, 6);

        // height 6 prunes ballots finalized before height 3
        let ledger = node.ledger.read().await;
        assert_eq!(ledger.keeper.store().ballot_count(), 2);
        let first = first.unwrap();
        assert!(ledger.keeper.store().get_ballot(&first).is_none());
        assert!(ledger.keeper.store().get_cctx(&first).is_some());
    }

    #[tokio::test]
    async fn test_remove_cctx_requires_admin() {
        let node = node();
        let msg = sample_inbound("observer-0");
        node.apply_inbound(at(1), &msg).await.unwrap();
        node.apply_inbound(at(1), &sample_inbound("observer-1")).await.unwrap();

        assert!(matches!(
            node.remove_cctx(at(3), "observer-0", &msg.digest()).await,
            Err(CrosschainError::Unauthorized { .. })
        ));
        assert!(node.remove_cctx(at(3), "admin", &msg.digest()).await.unwrap());
        assert!(node.get_cctx(&msg.digest()).await.is_err());
    }

    #[tokio::test]
    async fn test_replicas_elect_same_broadcaster() {
        for n in 0..6u32 {
            let (a, b) = (node(), node());
            for (height, creator) in ["observer-0", "observer-2"].into_iter().enumerate() {
                let time = at(n * 10 + height as u32);
                let msg = sample_inbound(creator);
                assert_eq!(
                    a.apply_inbound(time, &msg).await.unwrap(),
                    b.apply_inbound(time, &msg).await.unwrap()
                );
            }

            let index = sample_inbound("observer-0").digest();
            let leg_a = a.get_cctx(&index).await.unwrap().current_outbound().unwrap().clone();
            let leg_b = b.get_cctx(&index).await.unwrap().current_outbound().unwrap().clone();
            assert_eq!(leg_a.broadcaster, leg_b.broadcaster);
            // finalizing block carries n * 10 + 1 nanoseconds
            assert_eq!(leg_a.broadcaster, u64::from((n * 10 + 1) % 3));
        }
    }
}
