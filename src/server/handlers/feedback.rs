use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::core::errors::ApiError;
use crate::feedback::{FeedbackRequest, FeedbackUpdate, LangSmithClient};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GetTraceRequest {
    pub run_id: Uuid,
}

fn langsmith(state: &AppState) -> Result<&LangSmithClient, ApiError> {
    state.langsmith.as_ref().ok_or_else(|| {
        ApiError::ServiceUnavailable("LangSmith is not configured".to_string())
    })
}

pub async fn send_feedback(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<FeedbackRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let feedback_id = langsmith(&state)?.create_feedback(&payload).await?;
    Ok(Json(json!({
        "result": "posted feedback successfully",
        "code": 200,
        "feedback_id": feedback_id,
    })))
}

pub async fn update_feedback(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<FeedbackUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    langsmith(&state)?.update_feedback(&payload).await?;
    Ok(Json(json!({
        "result": "patched feedback successfully",
        "code": 200,
    })))
}

pub async fn get_trace(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GetTraceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let url = langsmith(&state)?.trace_url(payload.run_id).await?;
    Ok(Json(url))
}
