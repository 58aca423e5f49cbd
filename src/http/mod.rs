//! HTTP API server for the host UI
//!
//! This module exposes the turn controller to a local UI:
//! - POST /turn/start - Start listening (also unlocks playback)
//! - POST /turn/stop - Stop listening
//! - GET /turn/status - Current state, elapsed seconds and notice
//! - GET /conversation - Ordered conversation turns
//! - DELETE /notice - Clear the current notice
//! - POST /playback/unlock - Unlock playback from a user gesture
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{ErrorResponse, StartResponse, StatusResponse};
pub use routes::create_router;
pub use state::AppState;
