use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Stream control
        .route("/api/streams/start", post(handlers::start_stream))
        .route("/api/streams/stop", post(handlers::stop_stream))
        // Session queries
        .route("/api/streams/status", get(handlers::all_streams_status))
        .route(
            "/api/streams/status/:session_id",
            get(handlers::stream_status),
        )
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
