//! Work queue of outbound legs awaiting signature and broadcast

use crate::cctx::{CctxStatus, CrossChainTx};

use std::collections::{HashMap, HashSet};

/// Local progress of one outbound leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TxStatus {
    /// Queued, not signed yet
    Unprocessed,
    /// Signed (and broadcast if elected); waiting for the outbound vote
    Pending,
    /// The leg is settled, nothing left to do
    Mined,
}

/// Outbound legs seen by the monitor, keyed by work id
#[derive(Debug, Default)]
pub struct WorkQueue {
    /// Work ids in arrival order
    queue: Vec<String>,
    items: HashMap<String, CrossChainTx>,
    status: HashMap<String, TxStatus>,
}

/// `"{index}/{leg}"`, so a revert leg gets its own entry
pub fn work_id(cctx: &CrossChainTx) -> String {
    format!("{}/{}", cctx.index, cctx.current_leg())
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the current leg of a pending CCTX; returns whether it was new
    pub fn observe(&mut self, cctx: &CrossChainTx) -> bool {
        if !cctx.current_status().is_pending_outbound() {
            return false;
        }
        let id = work_id(cctx);
        if self.status.contains_key(&id) {
            return false;
        }
        self.queue.push(id.clone());
        self.items.insert(id.clone(), cctx.clone());
        self.status.insert(id, TxStatus::Unprocessed);
        true
    }

    pub fn status(&self, id: &str) -> Option<TxStatus> {
        self.status.get(id).copied()
    }

    /// Move an entry forward; it never moves back
    pub fn mark(&mut self, id: &str, status: TxStatus) {
        if let Some(current) = self.status.get_mut(id) {
            if status > *current {
                *current = status;
            }
        }
    }

    /// Work ids and CCTXs still to be signed, in arrival order
    pub fn unprocessed(&self) -> Vec<(String, CrossChainTx)> {
        self.queue
            .iter()
            .filter(|id| self.status(id) == Some(TxStatus::Unprocessed))
            .filter_map(|id| self.items.get(id).map(|c| (id.clone(), c.clone())))
            .collect()
    }

    /// Entries not yet settled whose work id is absent from `live`
    pub fn unsettled_except(&self, live: &HashSet<String>) -> Vec<(String, String)> {
        self.queue
            .iter()
            .filter(|id| !live.contains(*id) && self.status(id) != Some(TxStatus::Mined))
            .filter_map(|id| self.items.get(id).map(|c| (id.clone(), c.index.clone())))
            .collect()
    }

    /// Settle `id` given the latest view of its CCTX (`None` if removed).
    /// Returns whether the entry is now `Mined`.
    pub fn settle(&mut self, id: &str, latest: Option<&CrossChainTx>) -> bool {
        let settled = match latest {
            None => true,
            Some(cctx) => {
                matches!(
                    cctx.current_status(),
                    CctxStatus::OutboundMined | CctxStatus::Reverted | CctxStatus::Aborted
                ) || work_id(cctx) != id
            }
        };
        if settled {
            self.mark(id, TxStatus::Mined);
        }
        settled
    }

    /// Drop settled entries
    pub fn purge_mined(&mut self) -> usize {
        let mined: Vec<String> = self
            .queue
            .iter()
            .filter(|id| self.status(id) == Some(TxStatus::Mined))
            .cloned()
            .collect();
        for id in &mined {
            self.items.remove(id);
            self.status.remove(id);
        }
        self.queue.retain(|id| self.status.contains_key(id));
        mined.len()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cctx::messages::tests::sample_inbound;

    fn pending() -> CrossChainTx {
        let msg = sample_inbound("observer-0");
        let mut cctx = CrossChainTx::new(&msg, "0xabc", 0).unwrap();
        cctx.status
            .change_status(CctxStatus::PendingOutbound, "", 1)
            .unwrap();
        cctx
    }

    #[test]
    fn test_observe_once_per_leg() {
        let mut queue = WorkQueue::new();
        let mut cctx = pending();
        assert!(queue.observe(&cctx));
        assert!(!queue.observe(&cctx));
        assert_eq!(queue.status("0xabc/0"), Some(TxStatus::Unprocessed));

        cctx.add_revert_outbound().unwrap();
        cctx.status
            .change_status(CctxStatus::PendingRevert, "", 2)
            .unwrap();
        assert!(queue.observe(&cctx));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_ignores_non_pending() {
        let mut queue = WorkQueue::new();
        let msg = sample_inbound("observer-0");
        let cctx = CrossChainTx::new(&msg, "0xabc", 0).unwrap();
        assert!(!queue.observe(&cctx));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_settle_and_purge() {
        let mut queue = WorkQueue::new();
        let mut cctx = pending();
        queue.observe(&cctx);
        queue.mark("0xabc/0", TxStatus::Pending);

        assert!(!queue.settle("0xabc/0", Some(&cctx)));
        cctx.status
            .change_status(CctxStatus::OutboundMined, "", 3)
            .unwrap();
        assert!(queue.settle("0xabc/0", Some(&cctx)));
        assert!(queue.settle("0xabc/0", Some(&cctx)));
        assert_eq!(queue.status("0xabc/0"), Some(TxStatus::Mined));

        // mined never moves back
        queue.mark("0xabc/0", TxStatus::Unprocessed);
        assert_eq!(queue.status("0xabc/0"), Some(TxStatus::Mined));

        assert_eq!(queue.purge_mined(), 1);
        assert!(queue.is_empty());
    }
}
