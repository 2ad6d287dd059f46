use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/batch/metadata/eligible-count", get(eligible_count))
        .route("/batch/metadata/status", get(status))
        .route("/batch/metadata/start", post(start))
        .route("/batch/metadata/stop", post(stop))
}

async fn eligible_count(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let count = state.supervisor.count_eligible()?;
    Ok(Json(json!({
        "count": count,
        "estimated_cost_usd": state.supervisor.estimate_cost_usd(count),
    })))
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": state.supervisor.status() }))
}

async fn start(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let status = state.supervisor.start()?;
    Ok(Json(json!({ "status": status })))
}

async fn stop(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": state.supervisor.stop() }))
}
