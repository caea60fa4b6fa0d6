//! CCTX relayer - ballot-driven cross-chain transaction relay core
//!
//! Observers vote on inbound deposits and outbound results; finalized
//! ballots drive each cross-chain transaction through its lifecycle, and
//! the relay monitor signs and broadcasts the outbound legs.

pub mod api;
pub mod ballot;
pub mod capability;
pub mod cctx;
pub mod chain;
pub mod config;
pub mod error;
pub mod events;
pub mod keeper;
pub mod metrics;
pub mod monitor;
pub mod node;
pub mod outbound;
pub mod state;
