//! Inbound votes: tally, CCTX creation and settlement

use super::{BlockContext, Keeper};
use crate::ballot::{BallotStatus, Observation, VoteType};
use crate::capability::{Action, ContractCall, ForeignCoin};
use crate::cctx::{CctxStatus, CoinType, CrossChainTx, MsgVoteInbound, TxFinalizationStatus};
use crate::error::{CrosschainError, CrosschainResult};
use crate::events::CrosschainEvent;
use crate::outbound::assign_outbound;

use tracing::{debug, error, info, warn};

impl Keeper {
    /// Cast an observer's vote on an inbound event.
    ///
    /// Returns `true` when this vote finalized the ballot. The CCTX is
    /// created at that moment; settlement failures leave it `Aborted`.
    pub fn vote_inbound(
        &mut self,
        block: &mut BlockContext,
        msg: &MsgVoteInbound,
    ) -> CrosschainResult<bool> {
        self.authorize(
            &msg.creator,
            Action::VoteInbound {
                chain_id: msg.sender_chain_id,
            },
        )?;
        msg.validate_basic()?;

        let index = msg.digest();
        // the ballot may already be pruned, the CCTX never is
        if self.store.get_cctx(&index).is_some() {
            return Err(CrosschainError::BallotAlreadyFinalized(index));
        }
        let cctx = CrossChainTx::new(msg, &index, block.timestamp())?;

        let observation = Observation::Inbound {
            sender_chain_id: msg.sender_chain_id,
        };
        let ballot = self.store.get_or_create_ballot(
            &index,
            &self.observers,
            observation,
            self.threshold,
            block.height,
        );
        let ballot = ballot.add_vote(&msg.creator, VoteType::Yes)?;
        let (ballot, finalized) = ballot.check_finalization(block.height);

        if !finalized {
            debug!("Inbound vote from {} recorded on {}", msg.creator, index);
            self.store.set_ballot(ballot);
            return Ok(false);
        }

        let status = ballot.status;
        block.emit(CrosschainEvent::BallotFinalized {
            ballot: index.clone(),
            observation,
            status,
        });
        if status == BallotStatus::FinalizedSuccess {
            self.finalize_inbound(block, cctx)?;
        } else {
            warn!("Inbound ballot {} finalized as failure", index);
        }
        self.store.set_ballot(ballot);
        Ok(true)
    }

    fn finalize_inbound(
        &mut self,
        block: &mut BlockContext,
        mut cctx: CrossChainTx,
    ) -> CrosschainResult<()> {
        cctx.inbound_params.finalized_height = block.height;
        let receiver_chain_id = cctx.current_outbound()?.receiver_chain_id;

        let mut settled = cctx.clone();
        let outcome = if receiver_chain_id == self.protocol_chain_id {
            self.settle_in_protocol(block, &mut settled)
        } else {
            self.settle_external(block, &mut settled)
        };

        let cctx = match outcome {
            Ok(()) => settled,
            Err(e) => {
                if e.is_settlement_failure() {
                    warn!("Aborting cctx {}: {}", cctx.index, e);
                } else {
                    error!("Aborting cctx {} on unexpected error: {}", cctx.index, e);
                }
                cctx.status
                    .change_status(CctxStatus::Aborted, e.to_string(), block.timestamp())?;
                block.emit(CrosschainEvent::Aborted {
                    index: cctx.index.clone(),
                    reason: e.to_string(),
                });
                cctx
            }
        };

        self.store.set_last_inbound_height(
            cctx.inbound_params.sender_chain_id,
            cctx.inbound_params.observed_external_height,
        );
        info!(
            "CCTX {} created with status {} ({})",
            cctx.index,
            cctx.current_status(),
            cctx.log_identifier()
        );
        self.store.set_cctx(cctx);
        Ok(())
    }

    /// Move the amount onto the outbound leg and hand it to the coordinator
    fn settle_external(
        &mut self,
        block: &mut BlockContext,
        cctx: &mut CrossChainTx,
    ) -> CrosschainResult<()> {
        let amount = cctx.inbound_params.amount;
        cctx.current_outbound_mut()?.amount = amount;
        cctx.status
            .change_status(CctxStatus::PendingOutbound, "", block.timestamp())?;
        assign_outbound(&mut self.store, cctx, block, &self.observers)?;

        let leg = cctx.current_outbound()?;
        block.emit(CrosschainEvent::InboundFinalized {
            index: cctx.index.clone(),
            sender_chain_id: cctx.inbound_params.sender_chain_id,
            receiver_chain_id: leg.receiver_chain_id,
            amount: leg.amount.to_string(),
            nonce: leg.nonce,
        });
        Ok(())
    }

    /// Deposit on the protocol chain itself; the CCTX is mined right away
    fn settle_in_protocol(
        &self,
        block: &mut BlockContext,
        cctx: &mut CrossChainTx,
    ) -> CrosschainResult<()> {
        let amount = cctx.inbound_params.amount;
        let receiver = cctx.current_outbound()?.receiver.clone();
        let call = ContractCall::parse(&cctx.relayed_message)?;

        let receipt = match cctx.inbound_params.coin_type {
            CoinType::Zeta => self.fungible.mint_native(&receiver, amount, call.as_ref())?,
            coin_type => {
                let coin = self.resolve_foreign_coin(
                    coin_type,
                    cctx.inbound_params.sender_chain_id,
                    &cctx.inbound_params.asset,
                )?;
                self.fungible.deposit_and_call(
                    &coin.zrc20_contract,
                    &receiver,
                    amount,
                    call.as_ref(),
                )?
            }
        };
        if receipt.failed {
            return Err(CrosschainError::SettlementExecution(receipt.vm_error));
        }

        let leg = cctx.current_outbound_mut()?;
        leg.amount = amount;
        leg.hash = receipt.tx_hash.clone();
        leg.gas_used = receipt.gas_used;
        leg.observed_external_height = block.height;
        leg.tx_finalization_status = TxFinalizationStatus::Executed;
        cctx.status.change_status(
            CctxStatus::OutboundMined,
            "deposit executed on protocol chain",
            block.timestamp(),
        )?;

        block.emit(CrosschainEvent::InboundSettled {
            index: cctx.index.clone(),
            hash: receipt.tx_hash,
        });
        Ok(())
    }

    fn resolve_foreign_coin(
        &self,
        coin_type: CoinType,
        chain_id: i64,
        asset: &str,
    ) -> CrosschainResult<ForeignCoin> {
        let coins = self.fungible.foreign_coins();
        let found = match coin_type {
            CoinType::Gas => coins
                .into_iter()
                .find(|c| c.coin_type == CoinType::Gas && c.foreign_chain_id == chain_id),
            _ => coins.into_iter().find(|c| {
                c.coin_type == coin_type
                    && c.foreign_chain_id == chain_id
                    && c.asset.eq_ignore_ascii_case(asset)
            }),
        };
        found.ok_or_else(|| match coin_type {
            CoinType::Gas => {
                CrosschainError::AssetResolution(format!("cannot get gas coin on chain {}", chain_id))
            }
            _ => CrosschainError::AssetResolution(format!(
                "cannot get foreign coin for asset {} on chain {}",
                asset, chain_id
            )),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use crate::ballot::BallotStatus;
    use crate::cctx::messages::tests::sample_inbound;
    use crate::cctx::{CctxStatus, CoinType};
    use crate::error::CrosschainError;
    use ethers::types::U256;

    #[test]
    fn test_inbound_finalizes_on_second_vote() {
        let mut keeper = keeper();
        let mut ctx = block(10);

        assert!(!keeper.vote_inbound(&mut ctx, &sample_inbound("observer-0")).unwrap());
        let index = sample_inbound("observer-0").digest();
        assert!(keeper.store().get_cctx(&index).is_none());

        assert!(keeper.vote_inbound(&mut ctx, &sample_inbound("observer-1")).unwrap());
        let cctx = keeper.store().get_cctx(&index).unwrap();
        assert_eq!(cctx.current_status(), CctxStatus::PendingOutbound);
        assert_eq!(cctx.creator, "observer-1");
        assert_eq!(cctx.inbound_params.finalized_height, 10);

        let leg = cctx.current_outbound().unwrap();
        assert_eq!(leg.amount, U256::from(42));
        assert_eq!(leg.nonce, 0);
        assert_eq!(leg.gas_price, "20");
        // block time carries 4ns, three observers
        assert_eq!(leg.broadcaster, 1);
        assert_eq!(
            keeper.store().last_block_height(5).unwrap().last_inbound_height,
            420
        );
        assert_eq!(
            keeper.store().get_ballot(&index).unwrap().status,
            BallotStatus::FinalizedSuccess
        );
        let names: Vec<_> = ctx.events().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["BallotFinalized", "InboundFinalized"]);
    }

    #[test]
    fn test_duplicate_and_late_votes() {
        let mut keeper = keeper();
        let mut ctx = block(10);

        keeper.vote_inbound(&mut ctx, &sample_inbound("observer-0")).unwrap();
        assert!(matches!(
            keeper.vote_inbound(&mut ctx, &sample_inbound("observer-0")),
            Err(CrosschainError::DuplicateVote { .. })
        ));
        keeper.vote_inbound(&mut ctx, &sample_inbound("observer-1")).unwrap();

        // finalized once; the third vote changes nothing
        let before = keeper.store().get_cctx(&sample_inbound("x").digest()).cloned();
        assert!(matches!(
            keeper.vote_inbound(&mut ctx, &sample_inbound("observer-2")),
            Err(CrosschainError::BallotAlreadyFinalized(_))
        ));
        assert_eq!(
            keeper.store().get_cctx(&sample_inbound("x").digest()).cloned(),
            before
        );
        assert_eq!(keeper.store().chain_nonces(97).unwrap().next, 1);
    }

    #[test]
    fn test_unauthorized_voter_changes_nothing() {
        let mut keeper = keeper();
        let err = keeper
            .vote_inbound(&mut block(1), &sample_inbound("mallory"))
            .unwrap_err();
        assert!(matches!(err, CrosschainError::Unauthorized { .. }));
        assert_eq!(keeper.store().ballot_count(), 0);
    }

    #[test]
    fn test_invalid_message_records_no_vote() {
        let mut keeper = keeper();
        let mut msg = sample_inbound("observer-0");
        msg.sender = String::new();
        let err = keeper.vote_inbound(&mut block(1), &msg).unwrap_err();
        assert!(err.to_string().contains("sender cannot be empty"));
        assert_eq!(keeper.store().ballot_count(), 0);
    }

    #[test]
    fn test_distinct_nonces_per_destination() {
        let mut keeper = keeper();
        let mut ctx = block(3);
        for hash in ["0xa", "0xb", "0xc"] {
            for voter in ["observer-0", "observer-1"] {
                let mut msg = sample_inbound(voter);
                msg.inbound_hash = hash.to_string();
                keeper.vote_inbound(&mut ctx, &msg).unwrap();
            }
        }
        let mut nonces: Vec<_> = keeper
            .store()
            .cctxs_from(None)
            .map(|c| c.current_outbound().unwrap().nonce)
            .collect();
        nonces.sort();
        assert_eq!(nonces, vec![0, 1, 2]);
    }

    #[test]
    fn test_unsupported_destination_aborts() {
        let mut keeper = keeper();
        let mut ctx = block(3);
        for voter in ["observer-0", "observer-1"] {
            let mut msg = sample_inbound(voter);
            msg.receiver_chain_id = 12345;
            assert!(keeper.vote_inbound(&mut ctx, &msg).is_ok());
        }
        let cctx = keeper.store().cctxs_from(None).next().unwrap();
        assert_eq!(cctx.current_status(), CctxStatus::Aborted);
        assert_eq!(cctx.current_outbound().unwrap().amount, U256::zero());
    }

    #[test]
    fn test_unknown_gas_coin_aborts_without_outbound() {
        let mut keeper = keeper();
        let mut ctx = block(3);
        for voter in ["observer-0", "observer-1"] {
            let mut msg = sample_inbound(voter);
            msg.receiver_chain_id = PROTOCOL_CHAIN;
            keeper.vote_inbound(&mut ctx, &msg).unwrap();
        }

        let cctx = keeper.store().cctxs_from(None).next().unwrap();
        assert_eq!(cctx.current_status(), CctxStatus::Aborted);
        assert!(cctx
            .status
            .status_message
            .contains("cannot get gas coin on chain 5"));
        let leg = cctx.current_outbound().unwrap();
        assert_eq!(leg.amount, U256::zero());
        assert!(leg.hash.is_empty());
        assert!(ctx.events().iter().any(|e| e.name() == "Aborted"));
    }

    #[test]
    fn test_in_protocol_deposit_mines() {
        let (mut keeper, fungible) = keeper_with_coins(vec![gas_coin(5)]);
        let mut ctx = block(3);
        for voter in ["observer-0", "observer-1"] {
            let mut msg = sample_inbound(voter);
            msg.receiver_chain_id = PROTOCOL_CHAIN;
            keeper.vote_inbound(&mut ctx, &msg).unwrap();
        }

        let cctx = keeper.store().cctxs_from(None).next().unwrap();
        assert_eq!(cctx.current_status(), CctxStatus::OutboundMined);
        assert!(cctx.current_outbound().unwrap().hash.starts_with("0x"));
        assert_eq!(
            fungible.balance_of(
                "0xzrc20-gas-5",
                "0x2222222222222222222222222222222222222222"
            ),
            U256::from(42)
        );
        // no external nonce was consumed
        assert_eq!(keeper.store().chain_nonces(97).unwrap().next, 0);
    }

    #[test]
    fn test_in_protocol_malformed_message_aborts() {
        let (mut keeper, _) = keeper_with_coins(vec![gas_coin(5)]);
        let mut ctx = block(3);
        for voter in ["observer-0", "observer-1"] {
            let mut msg = sample_inbound(voter);
            msg.receiver_chain_id = PROTOCOL_CHAIN;
            msg.message = "abcd".to_string();
            keeper.vote_inbound(&mut ctx, &msg).unwrap();
        }
        let cctx = keeper.store().cctxs_from(None).next().unwrap();
        assert_eq!(cctx.current_status(), CctxStatus::Aborted);
    }

    #[test]
    fn test_in_protocol_native_mint() {
        let (mut keeper, fungible) = keeper_with_coins(Vec::new());
        let mut ctx = block(3);
        for voter in ["observer-0", "observer-1"] {
            let mut msg = sample_inbound(voter);
            msg.receiver_chain_id = PROTOCOL_CHAIN;
            msg.coin_type = CoinType::Zeta;
            keeper.vote_inbound(&mut ctx, &msg).unwrap();
        }
        let cctx = keeper.store().cctxs_from(None).next().unwrap();
        assert_eq!(cctx.current_status(), CctxStatus::OutboundMined);
        assert_eq!(
            fungible.balance_of("native", "0x2222222222222222222222222222222222222222"),
            U256::from(42)
        );
    }
}
