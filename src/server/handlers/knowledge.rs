use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FetchUrlRequest {
    pub url: String,
}

pub async fn add_from_url(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<FetchUrlRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let added = state.knowledge.add_from_url(&payload.url).await?;
    tracing::info!(
        index_name = %added.index_name,
        added = added.stats.num_added,
        updated = added.stats.num_updated,
        skipped = added.stats.num_skipped,
        deleted = added.stats.num_deleted,
        "Knowledge base ready"
    );
    Ok(Json(json!({
        "title": added.title,
        "index_name": added.index_name,
        "code": 200,
        "example_questions": added.example_questions,
        "stats": added.stats,
    })))
}

pub async fn check_vector_store(
    State(state): State<Arc<AppState>>,
    Path(index_name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let sources = state.knowledge.select(&index_name).await?;
    Ok(Json(json!({
        "message": "success",
        "code": 200,
        "data": { "sources": sources },
    })))
}
