//! HTTP API server for external control (proctoring dashboard)
//!
//! This module provides a REST API for controlling analysis sessions:
//! - POST /api/streams/start - Start analyzing a stream
//! - POST /api/streams/stop - Stop a session by ID or stream name
//! - GET /api/streams/status - Snapshot of all sessions
//! - GET /api/streams/status/:session_id - Snapshot of one session
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
