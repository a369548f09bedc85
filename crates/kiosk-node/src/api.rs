//! HTTP API for the kiosk node.

use crate::desk::{ContributionRequest, ProgressSummary};
use crate::error::Error;
use crate::journal::{Report, ReportFilter};
use crate::models::ContributionRecord;
use crate::node::NodeState;
use crate::state::CampaignState;
use crate::ws::ws_state_handler;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use kiosk_ledger::{Allocation, Amount, BucketIndex};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

type AppState = Arc<NodeState>;

type ApiResult<T> = Result<T, (StatusCode, String)>;

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    // CORS layer for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/health", get(health))
        .route("/api/v1/node", get(get_node_info))
        // Replicated state as this instance sees it
        .route("/api/v1/state", get(get_state))
        .route("/api/v1/progress", get(get_progress))
        // Contributions
        .route("/api/v1/allocations/preview", post(preview_allocation))
        .route("/api/v1/contributions", post(create_contribution))
        .route("/api/v1/transactions", get(list_transactions))
        // WebSocket for live state updates
        .route("/api/v1/ws/state", get(ws_state_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn reject(e: Error) -> (StatusCode, String) {
    let status = match &e {
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        _ => {
            warn!("Request failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, e.to_string())
}

// --- Health ---

async fn health() -> &'static str {
    "OK"
}

/// Which kiosk this node is.
#[derive(Debug, Serialize)]
pub struct NodeInfo {
    pub instance_id: String,
    pub installation: Option<String>,
    pub topic: String,
    pub buckets: usize,
}

async fn get_node_info(State(state): State<AppState>) -> Json<NodeInfo> {
    let sync = state.kiosk.sync();
    Json(NodeInfo {
        instance_id: sync.instance_id().to_string(),
        installation: state.installation.clone(),
        topic: sync.topic().to_string(),
        buckets: sync.buckets(),
    })
}

// --- State ---

async fn get_state(State(state): State<AppState>) -> Json<CampaignState> {
    Json(state.kiosk.sync().snapshot().await)
}

async fn get_progress(State(state): State<AppState>) -> Json<ProgressSummary> {
    Json(state.kiosk.progress().await)
}

// --- Contributions ---

#[derive(Debug, Deserialize)]
struct PreviewRequest {
    amount: Amount,
    #[serde(default)]
    buckets: Vec<BucketIndex>,
}

async fn preview_allocation(
    State(state): State<AppState>,
    Json(req): Json<PreviewRequest>,
) -> ApiResult<Json<Allocation>> {
    state
        .kiosk
        .preview(req.amount, &req.buckets)
        .await
        .map(Json)
        .map_err(reject)
}

async fn create_contribution(
    State(state): State<AppState>,
    Json(req): Json<ContributionRequest>,
) -> ApiResult<(StatusCode, Json<ContributionRecord>)> {
    let record = state.kiosk.contribute(req).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn list_transactions(
    State(state): State<AppState>,
    Query(filter): Query<ReportFilter>,
) -> ApiResult<Json<Report>> {
    state.kiosk.report(filter).map(Json).map_err(reject)
}
