//! HTTP API for health checks, CCTX queries and observer votes

use crate::cctx::{CrossChainTx, MsgVoteInbound, MsgVoteOutbound};
use crate::chain::SignerRegistry;
use crate::config::ApiConfig;
use crate::error::{CrosschainError, CrosschainResult};
use crate::keeper::PageRequest;
use crate::node::Node;
use crate::state::CctxStats;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub node: Arc<Node>,
    pub signers: Arc<SignerRegistry>,
}

/// Error type for HTTP handlers
pub struct ApiError(StatusCode, String);

impl From<CrosschainError> for ApiError {
    fn from(err: CrosschainError) -> Self {
        let status = match &err {
            CrosschainError::NotFound { .. } => StatusCode::NOT_FOUND,
            CrosschainError::Unauthorized { .. } => StatusCode::FORBIDDEN,
            CrosschainError::Validation(_)
            | CrosschainError::InvalidRequest(_)
            | CrosschainError::AmountMismatch { .. } => StatusCode::BAD_REQUEST,
            CrosschainError::DuplicateVote { .. }
            | CrosschainError::VoterNotEligible { .. }
            | CrosschainError::BallotAlreadyFinalized(_)
            | CrosschainError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(ErrorResponse { error: self.1 })).into_response()
    }
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/stats", get(get_stats))
        .route("/cctx", get(list_cctx))
        .route("/cctx/:index", get(get_cctx))
        .route("/inbound/:hash", get(get_cctx_by_inbound_hash))
        .route("/vote/inbound", post(vote_inbound))
        .route("/vote/outbound", post(vote_outbound))
        .route("/admin/remove_cctx", post(remove_cctx))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> CrosschainResult<()> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CrosschainError::Internal(format!("API bind failed: {}", e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| CrosschainError::Internal(format!("API server failed: {}", e)))?;

    Ok(())
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check - at least one chain can be signed for
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let mut signer_chains = state.signers.chain_ids();
    signer_chains.sort_unstable();
    let ready = !signer_chains.is_empty();

    let body = Json(ReadinessResponse {
        ready,
        height: state.node.height().await,
        signer_chains,
    });
    if ready {
        (StatusCode::OK, body)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, body)
    }
}

async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.node.stats().await;
    Json(StatsResponse {
        height: state.node.height().await,
        stats,
    })
}

async fn get_cctx(
    State(state): State<AppState>,
    Path(index): Path<String>,
) -> Result<Json<CrossChainTx>, ApiError> {
    Ok(Json(state.node.get_cctx(&index).await?))
}

async fn get_cctx_by_inbound_hash(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<CrossChainTx>, ApiError> {
    Ok(Json(state.node.cctx_by_inbound_hash(&hash).await?))
}

/// `GET /cctx?key=..&offset=..&limit=..&count_total=..`
async fn list_cctx(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, ApiError> {
    let request = PageRequest {
        key: params.key.unwrap_or_default().into_bytes(),
        offset: params.offset.unwrap_or_default(),
        limit: params.limit.unwrap_or_default(),
        count_total: params.count_total.unwrap_or_default(),
    };
    let (cctxs, page) = state.node.list_cctx(Some(&request)).await?;

    Ok(Json(ListResponse {
        cctxs,
        next_key: page
            .next_key
            .map(|k| String::from_utf8_lossy(&k).into_owned()),
        total: page.total,
    }))
}

async fn vote_inbound(
    State(state): State<AppState>,
    Json(req): Json<VoteRequest<MsgVoteInbound>>,
) -> Result<Json<VoteResponse>, ApiError> {
    let msg = req.msg;
    let finalized = state.node.apply_inbound(block_time(req.block_time), &msg).await?;
    Ok(Json(VoteResponse {
        ballot: msg.digest(),
        finalized,
    }))
}

async fn vote_outbound(
    State(state): State<AppState>,
    Json(req): Json<VoteRequest<MsgVoteOutbound>>,
) -> Result<Json<VoteResponse>, ApiError> {
    let msg = req.msg;
    let finalized = state.node.apply_outbound(block_time(req.block_time), &msg).await?;
    Ok(Json(VoteResponse {
        ballot: msg.digest(),
        finalized,
    }))
}

async fn remove_cctx(
    State(state): State<AppState>,
    Json(req): Json<RemoveCctxRequest>,
) -> Result<Json<RemoveCctxResponse>, ApiError> {
    let removed = state
        .node
        .remove_cctx(block_time(req.block_time), &req.creator, &req.index)
        .await?;
    Ok(Json(RemoveCctxResponse { removed }))
}

/// Block time of a message submitted over HTTP. Replicas must be fed the
/// same time for the same message; the local clock is only a fallback for
/// a single-node setup.
fn block_time(supplied: Option<DateTime<Utc>>) -> DateTime<Utc> {
    supplied.unwrap_or_else(Utc::now)
}

// Request and response types

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    key: Option<String>,
    offset: Option<u64>,
    limit: Option<u64>,
    count_total: Option<bool>,
}

/// A vote message plus the block time it is applied at
#[derive(Debug, Deserialize)]
struct VoteRequest<M> {
    #[serde(default)]
    block_time: Option<DateTime<Utc>>,
    #[serde(flatten)]
    msg: M,
}

#[derive(Debug, Deserialize)]
struct RemoveCctxRequest {
    creator: String,
    index: String,
    #[serde(default)]
    block_time: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    height: u64,
    signer_chains: Vec<i64>,
}

#[derive(Serialize)]
struct StatsResponse {
    height: u64,
    #[serde(flatten)]
    stats: CctxStats,
}

#[derive(Serialize, Deserialize)]
struct ListResponse {
    cctxs: Vec<CrossChainTx>,
    next_key: Option<String>,
    total: Option<u64>,
}

#[derive(Serialize, Deserialize)]
struct VoteResponse {
    ballot: String,
    finalized: bool,
}

#[derive(Serialize, Deserialize)]
struct RemoveCctxResponse {
    removed: bool,
}

#[derive(Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
}
