//! Crosschain keeper
//!
//! Applies observer votes to the replicated store. Every message is applied
//! atomically: all fallible checks run before the store is written, and
//! failures after a ballot finalized divert the CCTX to `Aborted` instead of
//! failing the message.

mod context;
mod query;
mod vote_inbound;
mod vote_outbound;

pub use context::BlockContext;
pub use query::{PageRequest, PageResponse, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};

use crate::ballot::Threshold;
use crate::capability::{Action, Authority, FungibleKeeper};
use crate::error::{CrosschainError, CrosschainResult};
use crate::state::CrosschainStore;

use ethers::types::U256;
use std::sync::Arc;
use tracing::info;

pub struct Keeper {
    store: CrosschainStore,
    /// Current observer set; seeds new ballots and broadcaster elections
    observers: Vec<String>,
    threshold: Threshold,
    /// Chain id of the protocol chain itself; inbounds addressed to it
    /// settle in-protocol
    protocol_chain_id: i64,
    authority: Arc<dyn Authority>,
    fungible: Arc<dyn FungibleKeeper>,
}

impl Keeper {
    pub fn new(
        observers: Vec<String>,
        threshold: Threshold,
        protocol_chain_id: i64,
        authority: Arc<dyn Authority>,
        fungible: Arc<dyn FungibleKeeper>,
    ) -> CrosschainResult<Self> {
        threshold.validate()?;
        if observers.is_empty() {
            return Err(CrosschainError::Config("observer set is empty".to_string()));
        }

        info!(
            "Keeper initialized with {} observers, threshold {}, protocol chain {}",
            observers.len(),
            threshold,
            protocol_chain_id
        );
        Ok(Self {
            store: CrosschainStore::new(),
            observers,
            threshold,
            protocol_chain_id,
            authority,
            fungible,
        })
    }

    pub fn store(&self) -> &CrosschainStore {
        &self.store
    }

    pub fn observers(&self) -> &[String] {
        &self.observers
    }

    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    pub fn protocol_chain_id(&self) -> i64 {
        self.protocol_chain_id
    }

    /// Enable outbound legs towards `chain_id`
    pub fn register_chain(&mut self, chain_id: i64, gas_price: U256, start_nonce: u64) {
        self.store.register_chain(chain_id, gas_price, start_nonce);
    }

    pub fn set_gas_price(&mut self, chain_id: i64, price: U256) {
        self.store.set_gas_price(chain_id, price);
    }

    fn authorize(&self, actor: &str, action: Action) -> CrosschainResult<()> {
        if self.authority.is_authorized(actor, &action) {
            Ok(())
        } else {
            Err(CrosschainError::Unauthorized {
                actor: actor.to_string(),
                action: action.to_string(),
            })
        }
    }
}
