use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn root() -> impl IntoResponse {
    Json(json!({ "message": "Hello World" }))
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let vector_store_ready = state.cache.is_ready().await;
    let chain_bound = state.executor.is_bound();
    Json(json!({
        "status": if vector_store_ready { "ok" } else { "degraded" },
        "vector_store_ready": vector_store_ready,
        "chain_bound": chain_bound,
    }))
}
