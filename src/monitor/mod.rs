//! Relay monitor for outbound signing and broadcast
//!
//! The monitor:
//! 1. Watches the store for CCTX legs waiting in `PendingOutbound` or
//!    `PendingRevert`
//! 2. Signs each leg once through the destination chain's `ChainSigner`
//! 3. Broadcasts only when this observer is the leg's elected broadcaster
//! 4. Drops legs once their CCTX moved on

pub mod engine;
pub mod queue;

pub use engine::{CctxSource, RelayMonitor, WatchReport};
pub use queue::{work_id, TxStatus, WorkQueue};
