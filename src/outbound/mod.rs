//! Outbound coordination
//!
//! For every CCTX leg that enters `PendingOutbound` or `PendingRevert`:
//! 1. Copy the destination chain's gas price onto the leg
//! 2. Assign the next nonce of the destination chain
//! 3. Elect one observer as the leg's broadcaster

pub mod election;
pub mod nonce;

pub use election::elect_broadcaster;
pub use nonce::ChainNonces;

use crate::cctx::CrossChainTx;
use crate::error::{CrosschainError, CrosschainResult};
use crate::keeper::BlockContext;
use crate::state::CrosschainStore;

use tracing::debug;

/// Assign gas price, nonce and broadcaster to the current leg of `cctx`.
///
/// All checks run before the store is touched: on error neither the store
/// nor the CCTX has changed.
pub fn assign_outbound(
    store: &mut CrosschainStore,
    cctx: &mut CrossChainTx,
    block: &BlockContext,
    observers: &[String],
) -> CrosschainResult<()> {
    let chain_id = cctx.current_outbound()?.receiver_chain_id;

    if !store.is_chain_supported(chain_id) {
        return Err(CrosschainError::ChainNotFound { chain_id });
    }
    let gas_price = store.gas_price(chain_id).ok_or_else(|| {
        CrosschainError::Validation(format!("gas price not found for chain {}", chain_id))
    })?;
    let broadcaster = elect_broadcaster(block.time, observers.len())
        .ok_or_else(|| CrosschainError::Validation("observer set is empty".to_string()))?;

    let nonce = store.chain_nonces_mut(chain_id)?.allocate(&cctx.index)?;

    let leg = cctx.current_outbound_mut()?;
    leg.gas_price = gas_price.to_string();
    leg.nonce = nonce;
    leg.broadcaster = broadcaster as u64;
    cctx.signers = observers.to_vec();

    debug!(
        "Assigned outbound {} on chain {}: nonce {}, broadcaster {}",
        cctx.index, chain_id, nonce, observers[broadcaster]
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cctx::messages::tests::sample_inbound;
    use chrono::{TimeZone, Utc};
    use ethers::types::U256;

    fn observers() -> Vec<String> {
        vec!["a".to_string(), "b".to_string(), "c".to_string()]
    }

    fn block(nanos: u32) -> BlockContext {
        BlockContext::new(7, Utc.timestamp_opt(1_700_000_000, nanos).unwrap())
    }

    fn cctx(hash: &str) -> CrossChainTx {
        let mut msg = sample_inbound("a");
        msg.inbound_hash = hash.to_string();
        CrossChainTx::new(&msg, &msg.digest(), 0).unwrap()
    }

    #[test]
    fn test_assigns_increasing_nonces_per_chain() {
        let mut store = CrosschainStore::new();
        store.register_chain(97, U256::from(20), 0);

        let mut nonces = Vec::new();
        for i in 0..4 {
            let mut c = cctx(&format!("0x{}", i));
            assign_outbound(&mut store, &mut c, &block(i), &observers()).unwrap();
            nonces.push(c.current_outbound().unwrap().nonce);
            assert_eq!(c.current_outbound().unwrap().gas_price, "20");
            assert_eq!(c.current_outbound().unwrap().broadcaster, (i % 3) as u64);
            assert_eq!(c.signers, observers());
        }
        assert_eq!(nonces, vec![0, 1, 2, 3]);
        assert_eq!(store.chain_nonces(97).unwrap().pending_range(), Some((0, 3)));
    }

    #[test]
    fn test_unsupported_chain_leaves_state() {
        let mut store = CrosschainStore::new();
        let mut c = cctx("0x1");
        let before = c.clone();
        let err = assign_outbound(&mut store, &mut c, &block(0), &observers()).unwrap_err();
        assert_eq!(err, CrosschainError::ChainNotFound { chain_id: 97 });
        assert_eq!(c, before);
    }

    #[test]
    fn test_empty_observer_set_allocates_nothing() {
        let mut store = CrosschainStore::new();
        store.register_chain(97, U256::from(20), 0);
        let mut c = cctx("0x1");
        assert!(assign_outbound(&mut store, &mut c, &block(0), &[]).is_err());
        assert_eq!(store.chain_nonces(97).unwrap().next, 0);
    }
}
