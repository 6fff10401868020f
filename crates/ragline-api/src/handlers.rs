//! Route handler functions for all API endpoints.
//!
//! Each handler extracts query parameters via axum extractors, talks to the
//! retriever or the refresh controller, and returns JSON.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Query parameter types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct QueryParams {
    pub q: Option<String>,
    pub k: Option<usize>,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    /// Generation of the published snapshot, 0 before the first refresh.
    pub generation: u64,
    pub document_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryHit {
    pub position: usize,
    pub distance: f32,
    pub source_id: String,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub generation: u64,
    pub results: Vec<QueryHit>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub accepted: bool,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.retriever.store().current();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        generation: snapshot.as_ref().map_or(0, |s| s.generation()),
        document_count: snapshot.as_ref().map_or(0, |s| s.len()),
    })
}

/// GET /query?q=<text>&k=<n>
///
/// `k` defaults to the configured `default_k` and is capped at `max_k`.
pub async fn query(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<QueryResponse>, ApiError> {
    let q = params
        .q
        .ok_or_else(|| ApiError::BadRequest("missing query parameter 'q'".to_string()))?;
    let k = params
        .k
        .unwrap_or(state.retrieval.default_k)
        .min(state.retrieval.max_k);

    let result = state.retriever.retrieve(&q, k).await?;
    debug!(generation = result.generation, returned = result.len(), "Query served");

    Ok(Json(QueryResponse {
        generation: result.generation,
        results: result
            .documents
            .into_iter()
            .map(|hit| QueryHit {
                position: hit.position,
                distance: hit.distance,
                source_id: hit.document.source_id,
                text: hit.document.normalized_text,
            })
            .collect(),
    }))
}

/// POST /refresh - ask the controller for an immediate refresh.
pub async fn refresh(State(state): State<AppState>) -> (StatusCode, Json<RefreshResponse>) {
    info!("Refresh requested via API");
    state.refresh.trigger();
    (StatusCode::ACCEPTED, Json(RefreshResponse { accepted: true }))
}
