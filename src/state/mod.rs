//! Replicated state
//!
//! Holds:
//! - CCTX records and the inbound-hash index
//! - Ballots until they are garbage collected
//! - Per-chain nonces, gas prices and last observed heights

mod store;

pub use store::{CctxStats, CrosschainStore, LastBlockHeight};
