use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Typed failures raised by the chain, store and ingestion layers.
///
/// These never carry HTTP semantics; [`ApiError`] is the only place they are
/// mapped onto status codes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RagError {
    #[error("chain not set")]
    NotConfigured,
    #[error("collection not found: {0}")]
    CollectionNotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0}")]
    Collaborator(String),
    #[error("not implemented: {0}")]
    NotImplemented(String),
}

impl RagError {
    pub fn collaborator<E: std::fmt::Display>(err: E) -> Self {
        RagError::Collaborator(err.to_string())
    }
}

impl From<sqlx::Error> for RagError {
    fn from(err: sqlx::Error) -> Self {
        RagError::Collaborator(format!("record manager: {err}"))
    }
}

impl From<reqwest::Error> for RagError {
    fn from(err: reqwest::Error) -> Self {
        RagError::Collaborator(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::NotConfigured => ApiError::Internal("Chain not set".to_string()),
            RagError::CollectionNotFound(_) | RagError::InvalidInput(_) => {
                ApiError::BadRequest(err.to_string())
            }
            RagError::NotImplemented(capability) => ApiError::NotImplemented(capability),
            RagError::Collaborator(msg) => ApiError::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let message = match self {
            ApiError::ServiceUnavailable(msg)
            | ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::NotImplemented(msg)
            | ApiError::Internal(msg) => msg,
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "{}", message);
        }

        let body = Json(json!({ "error": message, "code": status.as_u16() }));
        (status, body).into_response()
    }
}
