//! Relay monitor: signs and broadcasts outbound legs assigned by the keeper

use super::queue::{work_id, TxStatus, WorkQueue};
use crate::chain::{OutboundRequest, SignerRegistry};
use crate::cctx::messages::parse_uint;
use crate::cctx::{CctxStatus, CrossChainTx};
use crate::config::MonitorConfig;
use crate::error::{CrosschainError, CrosschainResult};

use async_trait::async_trait;
use futures::future::try_join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

/// Read access to the replicated CCTX store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CctxSource: Send + Sync {
    /// CCTXs whose current leg waits for an outbound transaction
    async fn pending_cctxs(&self) -> CrosschainResult<Vec<CrossChainTx>>;

    async fn cctx(&self, index: &str) -> CrosschainResult<Option<CrossChainTx>>;
}

/// Outcome of one watch cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchReport {
    pub queued: usize,
    pub mined: usize,
}

pub struct RelayMonitor {
    /// This participant's observer id
    observer_id: String,
    source: Arc<dyn CctxSource>,
    signers: Arc<SignerRegistry>,
    queue: Arc<Mutex<WorkQueue>>,
    poll_interval: Duration,
    default_gas_limit: u64,
    /// Shutdown flag
    shutdown: Arc<RwLock<bool>>,
}

impl RelayMonitor {
    pub fn new(
        observer_id: impl Into<String>,
        source: Arc<dyn CctxSource>,
        signers: Arc<SignerRegistry>,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            observer_id: observer_id.into(),
            source,
            signers,
            queue: Arc::new(Mutex::new(WorkQueue::new())),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            default_gas_limit: config.default_gas_limit,
            shutdown: Arc::new(RwLock::new(false)),
        }
    }

    /// Run the watch and dispatch duties until stopped
    pub async fn run(&self) -> CrosschainResult<()> {
        info!("Relay monitor started for observer {}", self.observer_id);
        tokio::join!(self.watch_loop(), self.dispatch_loop());
        info!("Relay monitor stopped");
        Ok(())
    }

    async fn watch_loop(&self) {
        let mut ticker = interval(self.poll_interval);
        loop {
            ticker.tick().await;
            if *self.shutdown.read().await {
                break;
            }
            if let Err(e) = self.watch_once().await {
                error!("Error watching pending cctxs: {}", e);
            }
        }
    }

    async fn dispatch_loop(&self) {
        let mut ticker = interval(self.poll_interval);
        loop {
            ticker.tick().await;
            if *self.shutdown.read().await {
                break;
            }
            self.dispatch_once().await;
        }
    }

    /// Queue newly pending legs and settle queued legs that left the
    /// pending set
    pub async fn watch_once(&self) -> CrosschainResult<WatchReport> {
        let pending = self.source.pending_cctxs().await?;
        let live: HashSet<String> = pending.iter().map(work_id).collect();

        let mut report = WatchReport::default();
        let stale = {
            let mut queue = self.queue.lock().await;
            for cctx in &pending {
                if queue.observe(cctx) {
                    debug!("Queued outbound {} ({})", work_id(cctx), cctx.log_identifier());
                    report.queued += 1;
                }
            }
            queue.unsettled_except(&live)
        };

        let latest = try_join_all(stale.iter().map(|(_, index)| self.source.cctx(index))).await?;
        let mut queue = self.queue.lock().await;
        for ((id, _), latest) in stale.iter().zip(latest) {
            if queue.settle(id, latest.as_ref()) {
                debug!("Outbound {} settled", id);
                report.mined += 1;
            }
        }
        queue.purge_mined();
        crate::metrics::record_queue_depth(queue.len());

        Ok(report)
    }

    /// Sign every unprocessed leg; returns how many were handled.
    ///
    /// The queue is only locked to take the snapshot and to record each
    /// result, so the watch loop keeps running while signer calls are in
    /// flight. `mark` never moves an entry backwards, so a leg settled in
    /// the meantime stays settled.
    pub async fn dispatch_once(&self) -> usize {
        let work = self.queue.lock().await.unprocessed();
        let mut handled = 0;

        for (id, cctx) in work {
            match self.process(&cctx).await {
                Ok(()) => {
                    self.queue.lock().await.mark(&id, TxStatus::Pending);
                    handled += 1;
                }
                Err(e) => {
                    let chain_id = cctx
                        .current_outbound()
                        .map(|o| o.receiver_chain_id)
                        .unwrap_or_default();
                    crate::metrics::record_outbound_error(chain_id);
                    if e.is_retryable() {
                        warn!("Retryable error on outbound {}: {}", id, e);
                    } else {
                        error!("Failed to process outbound {}: {}", id, e);
                    }
                }
            }
        }

        handled
    }

    async fn process(&self, cctx: &CrossChainTx) -> CrosschainResult<()> {
        let request = self.build_request(cctx)?;
        let signer = self.signers.get(request.chain_id)?;
        let signed = signer.sign(&request).await?;
        crate::metrics::record_outbound_signed(request.chain_id);

        let leg = cctx.current_outbound()?;
        let elected = cctx.signers.get(leg.broadcaster as usize);
        if elected.map(String::as_str) != Some(self.observer_id.as_str()) {
            debug!(
                "Signed outbound {} nonce {}; broadcaster is {:?}",
                cctx.index, request.nonce, elected
            );
            return Ok(());
        }

        let hash = signer.broadcast(&signed).await?;
        crate::metrics::record_outbound_broadcast(request.chain_id);
        info!(
            "Broadcast outbound {} on chain {} nonce {}: {}",
            cctx.index, request.chain_id, request.nonce, hash
        );
        Ok(())
    }

    fn build_request(&self, cctx: &CrossChainTx) -> CrosschainResult<OutboundRequest> {
        let leg = cctx.current_outbound()?;
        let reverting = cctx.current_status() == CctxStatus::PendingRevert;
        let (recipient, chain_id) = if reverting {
            cctx.revert_destination()
        } else {
            (leg.receiver.clone(), leg.receiver_chain_id)
        };

        let message = if reverting || cctx.relayed_message.is_empty() {
            Vec::new()
        } else {
            hex::decode(cctx.relayed_message.trim_start_matches("0x"))
                .map_err(|e| CrosschainError::Validation(format!("invalid message hex: {}", e)))?
        };
        let gas_limit = match leg.call_options.gas_limit {
            0 => self.default_gas_limit,
            limit => limit,
        };

        Ok(OutboundRequest {
            chain_id,
            recipient,
            coin_type: leg.coin_type,
            amount: leg.amount,
            gas_limit,
            gas_price: parse_uint("gas price", &leg.gas_price)?,
            nonce: leg.nonce,
            message,
            transfer_id: transfer_id(&cctx.index)?,
        })
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Stop the monitor
    pub async fn stop(&self) {
        *self.shutdown.write().await = true;
        info!("Relay monitor shutdown initiated");
    }
}

fn transfer_id(index: &str) -> CrosschainResult<[u8; 32]> {
    let bytes = hex::decode(index.trim_start_matches("0x"))
        .map_err(|e| CrosschainError::Validation(format!("invalid cctx index: {}", e)))?;
    bytes
        .try_into()
        .map_err(|_| CrosschainError::Validation(format!("cctx index {} is not 32 bytes", index)))
}
