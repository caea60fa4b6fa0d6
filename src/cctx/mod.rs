//! Cross-chain transaction (CCTX) record, lifecycle status and the vote
//! messages that drive it

pub mod messages;
pub mod status;
pub mod types;

pub use messages::{MsgVoteInbound, MsgVoteOutbound, ReceiveStatus};
pub use status::{CctxStatus, Status};
pub use types::{
    CallOptions, CoinType, CrossChainTx, InboundParams, OutboundParams, ProtocolContractVersion,
    RevertOptions, TxFinalizationStatus,
};
