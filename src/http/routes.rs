use super::handlers;
use super::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Turn control
        .route("/turn/start", post(handlers::start_turn))
        .route("/turn/stop", post(handlers::stop_turn))
        .route("/turn/status", get(handlers::get_status))
        // Host UI state
        .route("/conversation", get(handlers::get_conversation))
        .route("/notice", delete(handlers::clear_notice))
        .route("/playback/unlock", post(handlers::unlock_playback))
        // The UI is served from another origin
        .layer(CorsLayer::permissive())
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
