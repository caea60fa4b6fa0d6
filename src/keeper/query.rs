//! Read access and administrative maintenance of the store

use super::{BlockContext, Keeper};
use crate::capability::Action;
use crate::cctx::CrossChainTx;
use crate::error::{CrosschainError, CrosschainResult};
use crate::events::CrosschainEvent;
use crate::state::CctxStats;

use serde::{Deserialize, Serialize};
use tracing::info;

pub const DEFAULT_PAGE_LIMIT: u64 = 100;
pub const MAX_PAGE_LIMIT: u64 = 1000;

/// Key or offset pagination over CCTXs in index order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Index to start from (inclusive), as returned in `next_key`
    #[serde(default)]
    pub key: Vec<u8>,
    #[serde(default)]
    pub offset: u64,
    /// 0 means `DEFAULT_PAGE_LIMIT`
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub count_total: bool,
}

impl PageRequest {
    pub fn is_empty(&self) -> bool {
        self == &PageRequest::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResponse {
    /// Key of the first item of the next page
    pub next_key: Option<Vec<u8>>,
    pub total: Option<u64>,
}

impl Keeper {
    pub fn get_cctx(&self, index: &str) -> CrosschainResult<CrossChainTx> {
        if index.is_empty() {
            return Err(CrosschainError::InvalidRequest("index cannot be empty".to_string()));
        }
        self.store
            .get_cctx(index)
            .cloned()
            .ok_or_else(|| CrosschainError::cctx_not_found(index))
    }

    pub fn cctx_by_inbound_hash(&self, inbound_hash: &str) -> CrosschainResult<CrossChainTx> {
        self.store
            .cctx_by_inbound_hash(inbound_hash)
            .cloned()
            .ok_or_else(|| CrosschainError::NotFound {
                kind: "inbound hash",
                id: inbound_hash.to_string(),
            })
    }

    /// One page of CCTXs
    pub fn list_cctx(
        &self,
        request: Option<&PageRequest>,
    ) -> CrosschainResult<(Vec<CrossChainTx>, PageResponse)> {
        let request = match request {
            Some(r) if !r.is_empty() => r,
            _ => return Err(CrosschainError::InvalidRequest("invalid request".to_string())),
        };
        if !request.key.is_empty() && request.offset > 0 {
            return Err(CrosschainError::InvalidRequest(
                "key and offset cannot both be set".to_string(),
            ));
        }
        let limit = match request.limit {
            0 => DEFAULT_PAGE_LIMIT,
            l => l.min(MAX_PAGE_LIMIT),
        } as usize;

        let start = if request.key.is_empty() {
            None
        } else {
            Some(
                std::str::from_utf8(&request.key)
                    .map_err(|_| CrosschainError::InvalidRequest("invalid page key".to_string()))?,
            )
        };

        let mut items: Vec<CrossChainTx> = self
            .store
            .cctxs_from(start)
            .skip(request.offset as usize)
            .take(limit + 1)
            .cloned()
            .collect();
        let next_key = if items.len() > limit {
            items.pop().map(|c| c.index.into_bytes())
        } else {
            None
        };
        let total = request
            .count_total
            .then(|| self.store.cctx_count() as u64);

        Ok((items, PageResponse { next_key, total }))
    }

    /// Administrative removal of a CCTX; removing a missing one is a no-op
    pub fn remove_cctx(
        &mut self,
        block: &mut BlockContext,
        actor: &str,
        index: &str,
    ) -> CrosschainResult<bool> {
        self.authorize(actor, Action::RemoveCctx)?;
        let removed = self.store.remove_cctx(index);
        if removed {
            info!("CCTX {} removed by {}", index, actor);
            block.emit(CrosschainEvent::CctxRemoved {
                index: index.to_string(),
            });
        }
        Ok(removed)
    }

    /// Garbage collect ballots finalized before `height`
    pub fn prune_ballots(&mut self, height: u64) -> usize {
        let pruned = self.store.prune_ballots(height);
        if pruned > 0 {
            info!("Pruned {} ballots finalized before height {}", pruned, height);
        }
        pruned
    }

    pub fn stats(&self) -> CctxStats {
        self.store.get_stats()
    }
}
