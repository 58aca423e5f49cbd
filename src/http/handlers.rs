use super::state::AppState;
use crate::turn::{
    ConversationTurn, Notice, NoticeKind, PermissionState, StartOutcome, TurnState,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::{info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub outcome: String,
    pub state: TurnState,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub stopped: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: TurnState,
    pub label: String,
    pub elapsed_secs: f64,
    pub notice: Option<Notice>,
    pub permission: PermissionState,
    pub playback_unlocked: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<NoticeKind>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /turn/start
/// Start listening for one turn
pub async fn start_turn(State(state): State<AppState>) -> impl IntoResponse {
    info!("Start requested over HTTP");

    match state.controller.start().await {
        StartOutcome::Listening => (
            StatusCode::OK,
            Json(StartResponse {
                outcome: "listening".to_string(),
                state: state.controller.state(),
            }),
        )
            .into_response(),
        StartOutcome::Rejected => (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: format!("Cannot start while {}", state.controller.state()),
                notice: None,
            }),
        )
            .into_response(),
        StartOutcome::Failed(kind) => {
            warn!("Start failed: {:?}", kind);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: kind.message().to_string(),
                    notice: Some(kind),
                }),
            )
                .into_response()
        }
    }
}

/// POST /turn/stop
/// Deliver the user stop-signal
pub async fn stop_turn(State(state): State<AppState>) -> impl IntoResponse {
    if state.controller.stop() {
        (StatusCode::OK, Json(StopResponse { stopped: true })).into_response()
    } else {
        (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: format!("Not listening (state: {})", state.controller.state()),
                notice: None,
            }),
        )
            .into_response()
    }
}

/// GET /turn/status
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let controller = &state.controller;
    let turn_state = controller.state();

    Json(StatusResponse {
        state: turn_state,
        label: turn_state.label().to_string(),
        elapsed_secs: controller.recording_elapsed_secs(),
        notice: controller.notice(),
        permission: controller.permission(),
        playback_unlocked: controller.playback_unlocked(),
    })
}

/// GET /conversation
pub async fn get_conversation(State(state): State<AppState>) -> impl IntoResponse {
    let turns: Vec<ConversationTurn> = state.controller.conversation();
    (StatusCode::OK, Json(turns))
}

/// DELETE /notice
pub async fn clear_notice(State(state): State<AppState>) -> impl IntoResponse {
    state.controller.clear_notice();
    StatusCode::NO_CONTENT
}

/// POST /playback/unlock
pub async fn unlock_playback(State(state): State<AppState>) -> impl IntoResponse {
    state.controller.unlock_playback().await;
    StatusCode::NO_CONTENT
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
