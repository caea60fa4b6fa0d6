//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Observer votes and ballot finalization
//! - CCTX lifecycle events and status counts
//! - Outbound signing and broadcast
//! - Relay monitor queue depth

use crate::cctx::CctxStatus;
use crate::error::{CrosschainError, CrosschainResult};
use crate::events::CrosschainEvent;
use crate::state::CctxStats;

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, CounterVec, Encoder, GaugeVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::{error, info};

lazy_static! {
    // Vote metrics
    pub static ref VOTES: CounterVec = register_counter_vec!(
        "cctx_votes_total",
        "Observer votes by kind and result",
        &["kind", "result"]
    ).unwrap();

    // Lifecycle metrics
    pub static ref EVENTS_EMITTED: CounterVec = register_counter_vec!(
        "cctx_events_total",
        "Protocol events emitted by type",
        &["event_type"]
    ).unwrap();

    pub static ref CCTX_BY_STATUS: GaugeVec = register_gauge_vec!(
        "cctx_status_count",
        "Stored CCTXs per status",
        &["status"]
    ).unwrap();

    pub static ref BLOCK_HEIGHT: GaugeVec = register_gauge_vec!(
        "cctx_block_height",
        "Height of the last applied block",
        &[]
    ).unwrap();

    pub static ref BALLOTS_PRUNED: CounterVec = register_counter_vec!(
        "cctx_ballots_pruned_total",
        "Finalized ballots garbage collected",
        &[]
    ).unwrap();

    // Outbound metrics
    pub static ref OUTBOUND_SIGNED: CounterVec = register_counter_vec!(
        "cctx_outbound_signed_total",
        "Outbound transactions signed",
        &["chain_id"]
    ).unwrap();

    pub static ref OUTBOUND_BROADCAST: CounterVec = register_counter_vec!(
        "cctx_outbound_broadcast_total",
        "Outbound transactions broadcast by this observer",
        &["chain_id"]
    ).unwrap();

    pub static ref OUTBOUND_ERRORS: CounterVec = register_counter_vec!(
        "cctx_outbound_errors_total",
        "Outbound signing or broadcast failures",
        &["chain_id"]
    ).unwrap();

    pub static ref MONITOR_QUEUE_DEPTH: GaugeVec = register_gauge_vec!(
        "cctx_monitor_queue_depth",
        "Outbound legs tracked by the relay monitor",
        &[]
    ).unwrap();

    // Health metrics
    pub static ref HEALTH_CHECK_SUCCESS: CounterVec = register_counter_vec!(
        "cctx_health_check_success_total",
        "Total successful health checks",
        &[]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> CrosschainResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| CrosschainError::Internal(format!("metrics bind failed: {}", e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| CrosschainError::Internal(format!("metrics server failed: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    render().map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// Text exposition of every registered metric
pub fn render() -> CrosschainResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| CrosschainError::Internal(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| CrosschainError::Internal(e.to_string()))
}

// Helper functions to record metrics

pub fn record_vote(kind: &str, result: &str) {
    VOTES.with_label_values(&[kind, result]).inc();
}

pub fn record_event(event: &CrosschainEvent) {
    EVENTS_EMITTED.with_label_values(&[event.name()]).inc();
}

pub fn record_cctx_stats(stats: &CctxStats) {
    for status in CctxStatus::ALL {
        CCTX_BY_STATUS
            .with_label_values(&[status.as_str()])
            .set(stats.count(status) as f64);
    }
}

pub fn record_block_height(height: u64) {
    BLOCK_HEIGHT.with_label_values(&[]).set(height as f64);
}

pub fn record_ballots_pruned(count: usize) {
    BALLOTS_PRUNED.with_label_values(&[]).inc_by(count as f64);
}

pub fn record_outbound_signed(chain_id: i64) {
    OUTBOUND_SIGNED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_outbound_broadcast(chain_id: i64) {
    OUTBOUND_BROADCAST
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_outbound_error(chain_id: i64) {
    OUTBOUND_ERRORS
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_queue_depth(depth: usize) {
    MONITOR_QUEUE_DEPTH.with_label_values(&[]).set(depth as f64);
}

pub fn record_health_check() {
    HEALTH_CHECK_SUCCESS.with_label_values(&[]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_recorded_metrics() {
        record_vote("inbound", "accepted");
        record_outbound_signed(97);
        let text = render().unwrap();
        assert!(text.contains("cctx_votes_total"));
        assert!(text.contains("cctx_outbound_signed_total"));
    }
}
