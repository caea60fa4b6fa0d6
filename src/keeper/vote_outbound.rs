//! Outbound votes: confirm a leg mined, or fall back to revert/abort

use super::{BlockContext, Keeper};
use crate::ballot::{BallotStatus, Observation};
use crate::capability::Action;
use crate::cctx::{CctxStatus, CrossChainTx, MsgVoteOutbound};
use crate::error::{CrosschainError, CrosschainResult};
use crate::events::CrosschainEvent;
use crate::outbound::assign_outbound;

use tracing::{debug, info, warn};

impl Keeper {
    /// Cast an observer's vote on the result of the current outbound leg.
    ///
    /// Returns `true` when this vote finalized the ballot. A successful
    /// outcome whose reported value differs from the leg's amount fails the
    /// whole message with `AmountMismatch`; the ballot is not saved.
    pub fn vote_outbound(
        &mut self,
        block: &mut BlockContext,
        msg: &MsgVoteOutbound,
    ) -> CrosschainResult<bool> {
        self.authorize(
            &msg.creator,
            Action::VoteOutbound {
                chain_id: msg.outbound_chain_id,
            },
        )?;
        msg.validate_basic()?;

        let mut cctx = self
            .store
            .get_cctx(&msg.cctx_hash)
            .cloned()
            .ok_or_else(|| CrosschainError::cctx_not_found(&msg.cctx_hash))?;
        let index = msg.digest();
        if self
            .store
            .get_ballot(&index)
            .is_some_and(|b| b.is_finalized())
        {
            return Err(CrosschainError::BallotAlreadyFinalized(index));
        }
        if !cctx.current_status().is_pending_outbound() {
            return Err(CrosschainError::Validation(format!(
                "cctx {} has no pending outbound (status {})",
                cctx.index,
                cctx.current_status()
            )));
        }
        let leg = cctx.current_outbound()?;
        if leg.receiver_chain_id != msg.outbound_chain_id || leg.nonce != msg.outbound_nonce {
            return Err(CrosschainError::Validation(format!(
                "vote for chain {} nonce {} does not match current leg (chain {} nonce {})",
                msg.outbound_chain_id, msg.outbound_nonce, leg.receiver_chain_id, leg.nonce
            )));
        }

        let observation = Observation::Outbound {
            receiver_chain_id: msg.outbound_chain_id,
            nonce: msg.outbound_nonce,
        };
        let ballot = self.store.get_or_create_ballot(
            &index,
            &self.observers,
            observation,
            self.threshold,
            block.height,
        );
        let ballot = ballot.add_vote(&msg.creator, msg.vote_type())?;
        let (ballot, finalized) = ballot.check_finalization(block.height);

        if !finalized {
            debug!(
                "Outbound vote from {} ({:?}) recorded on {}",
                msg.creator,
                msg.vote_type(),
                index
            );
            self.store.set_ballot(ballot);
            return Ok(false);
        }

        cctx.current_outbound_mut()?.ballot_index = index.clone();
        cctx.add_outbound(msg, ballot.status)?;

        block.emit(CrosschainEvent::BallotFinalized {
            ballot: index,
            observation,
            status: ballot.status,
        });
        self.finalize_outbound(block, cctx, ballot.status)?;
        self.store.set_ballot(ballot);
        Ok(true)
    }

    fn finalize_outbound(
        &mut self,
        block: &mut BlockContext,
        mut cctx: CrossChainTx,
        outcome: BallotStatus,
    ) -> CrosschainResult<()> {
        let leg = cctx.current_outbound()?;
        let (chain_id, nonce, hash) = (leg.receiver_chain_id, leg.nonce, leg.hash.clone());
        let timestamp = block.timestamp();

        // release the leg's nonce; a failed leg still consumed it on chain
        if let Err(e) = self.store.chain_nonces_mut(chain_id).and_then(|n| n.confirm(nonce)) {
            warn!("Cannot confirm nonce for cctx {}: {}", cctx.index, e);
        }

        match (outcome, cctx.current_status()) {
            (BallotStatus::FinalizedSuccess, CctxStatus::PendingOutbound) => {
                cctx.status
                    .change_status(CctxStatus::OutboundMined, "outbound mined", timestamp)?;
                block.emit(CrosschainEvent::OutboundMined {
                    index: cctx.index.clone(),
                    chain_id,
                    hash,
                });
            }
            (BallotStatus::FinalizedSuccess, _) => {
                cctx.status
                    .change_status(CctxStatus::Reverted, "revert mined", timestamp)?;
                block.emit(CrosschainEvent::Reverted {
                    index: cctx.index.clone(),
                    chain_id,
                });
            }
            (_, CctxStatus::PendingOutbound) => {
                let mut reverted = cctx.clone();
                match self.queue_revert(block, &mut reverted) {
                    Ok(()) => cctx = reverted,
                    Err(e) => {
                        let reason = format!("outbound failed and revert is not possible: {}", e);
                        warn!("Aborting cctx {}: {}", cctx.index, reason);
                        cctx.status
                            .change_status(CctxStatus::Aborted, reason.clone(), timestamp)?;
                        block.emit(CrosschainEvent::Aborted {
                            index: cctx.index.clone(),
                            reason,
                        });
                    }
                }
            }
            _ => {
                let reason = "revert outbound failed".to_string();
                cctx.status
                    .change_status(CctxStatus::Aborted, reason.clone(), timestamp)?;
                block.emit(CrosschainEvent::Aborted {
                    index: cctx.index.clone(),
                    reason,
                });
            }
        }

        info!(
            "CCTX {} outbound on chain {} nonce {} finalized: {}",
            cctx.index,
            chain_id,
            nonce,
            cctx.current_status()
        );
        self.store.set_cctx(cctx);
        Ok(())
    }

    /// Append a revert leg towards the sender side and assign it
    fn queue_revert(
        &mut self,
        block: &mut BlockContext,
        cctx: &mut CrossChainTx,
    ) -> CrosschainResult<()> {
        cctx.add_revert_outbound()?;
        cctx.status.change_status(
            CctxStatus::PendingRevert,
            "outbound failed, reverting to sender",
            block.timestamp(),
        )?;
        assign_outbound(&mut self.store, cctx, block, &self.observers)?;

        let leg = cctx.current_outbound()?;
        block.emit(CrosschainEvent::RevertQueued {
            index: cctx.index.clone(),
            chain_id: leg.receiver_chain_id,
            nonce: leg.nonce,
        });
        Ok(())
    }
}
