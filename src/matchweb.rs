use crate::errors::{MatchError, MatchResult};
use crate::match_service::{MatchResponse, ModelInfo, ScoringGate};
use axum::{
    extract::{rejection::JsonRejection, Extension},
    response::Json,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the router exposing scoring, model metadata and health checks
pub fn build_match_router(gate: Arc<ScoringGate>) -> Router {
    Router::new()
        // current endpoints
        .route("/api/match/score", post(score_match))
        .route("/api/match/model", get(model_info))
        // versioned aliases
        .route("/v1/match/score", post(score_match))
        .route("/v1/match/model", get(model_info))
        // health endpoints
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .layer(Extension(gate))
        .layer(TraceLayer::new_for_http())
}

/// Bodies that are not JSON, and JSON that is not a valid request, both come
/// back as a 400 with the `{"error": ...}` body.
async fn score_match(
    Extension(gate): Extension<Arc<ScoringGate>>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> MatchResult<Json<MatchResponse>> {
    let service = gate.service()?;
    let Json(payload) =
        payload.map_err(|rejection| MatchError::validation("request", rejection.body_text()))?;
    let response = service.score_json(payload)?;
    Ok(Json(response))
}

async fn model_info(Extension(gate): Extension<Arc<ScoringGate>>) -> MatchResult<Json<ModelInfo>> {
    Ok(Json(gate.service()?.info()))
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn readyz(Extension(gate): Extension<Arc<ScoringGate>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ready": gate.is_ready() }))
}
