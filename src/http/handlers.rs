use super::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartStreamRequest {
    /// Media server stream to consume
    pub stream_name: String,

    /// Optional session ID (if not provided, generate UUID)
    pub session_id: Option<String>,

    /// Optional exam result this session belongs to
    pub exam_result_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StopStreamRequest {
    pub session_id: Option<String>,
    pub stream_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StreamActionResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/streams/start
/// Start analyzing a media stream
pub async fn start_stream(
    State(state): State<AppState>,
    Json(req): Json<StartStreamRequest>,
) -> impl IntoResponse {
    if req.stream_name.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(StreamActionResponse {
                success: false,
                message: "stream_name must not be empty".to_string(),
                data: None,
            }),
        )
            .into_response();
    }

    let session_id = req
        .session_id
        .unwrap_or_else(|| format!("session-{}", uuid::Uuid::new_v4()));

    info!("Starting analysis session {} for stream {}", session_id, req.stream_name);

    if state.manager.get(&session_id).await.is_some() {
        return (
            StatusCode::CONFLICT,
            Json(StreamActionResponse {
                success: false,
                message: format!("Session {} is already active", session_id),
                data: None,
            }),
        )
            .into_response();
    }

    if !state
        .manager
        .start(&session_id, &req.stream_name, req.exam_result_id)
        .await
    {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(StreamActionResponse {
                success: false,
                message: format!("Failed to start session {}", session_id),
                data: None,
            }),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        Json(StreamActionResponse {
            success: true,
            message: format!("Analysis started for stream {}", req.stream_name),
            data: Some(json!({
                "session_id": session_id,
                "stream_name": req.stream_name,
            })),
        }),
    )
        .into_response()
}

/// POST /api/streams/stop
/// Stop a session by ID or by stream name
pub async fn stop_stream(
    State(state): State<AppState>,
    Json(req): Json<StopStreamRequest>,
) -> impl IntoResponse {
    let (label, stopped) = match (&req.session_id, &req.stream_name) {
        (Some(session_id), _) => (session_id.clone(), state.manager.stop(session_id).await),
        (None, Some(stream_name)) => (
            stream_name.clone(),
            state.manager.stop_by_stream_name(stream_name).await,
        ),
        (None, None) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(StreamActionResponse {
                    success: false,
                    message: "session_id or stream_name is required".to_string(),
                    data: None,
                }),
            )
                .into_response();
        }
    };

    if stopped {
        (
            StatusCode::OK,
            Json(StreamActionResponse {
                success: true,
                message: format!("Session stopped: {}", label),
                data: None,
            }),
        )
            .into_response()
    } else {
        warn!("Stop requested but no session matched {}", label);
        (
            StatusCode::NOT_FOUND,
            Json(StreamActionResponse {
                success: false,
                message: format!("No active session for {}", label),
                data: None,
            }),
        )
            .into_response()
    }
}

/// GET /api/streams/status
/// Snapshot of every active session
pub async fn all_streams_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.manager.stats().await)
}

/// GET /api/streams/status/:session_id
/// Snapshot of one session
pub async fn stream_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.manager.get(&session_id).await {
        Some(consumer) => Json(consumer.stats().await).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(StreamActionResponse {
                success: false,
                message: format!("Session {} not found", session_id),
                data: None,
            }),
        )
            .into_response(),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
