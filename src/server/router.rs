use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::handlers::{chat, feedback, health, knowledge};
use crate::state::AppState;

/// Creates the application router with all routes and middleware.
///
/// This function sets up:
/// - CORS middleware
/// - Health check endpoints
/// - Knowledge base creation and selection
/// - Chat endpoints (invoke, batch, stream)
/// - Feedback and trace endpoints
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state.settings.server.cors_allowed_origins);
    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .route("/knowledge/url", post(knowledge::add_from_url))
        .route(
            "/check_vector_store/:index_name",
            get(knowledge::check_vector_store),
        )
        .route("/chat/invoke", post(chat::invoke))
        .route("/chat/batch", post(chat::batch))
        .route("/chat/stream", post(chat::stream))
        .route(
            "/feedback",
            post(feedback::send_feedback).patch(feedback::update_feedback),
        )
        .route("/get_trace", post(feedback::get_trace))
        .with_state(state)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

/// An empty origin list allows any origin.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allowed_origins = origins
        .iter()
        .map(|origin| origin.trim())
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();

    let allow_origin = if allowed_origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(allowed_origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
}
