//! Session state and stats snapshots served by the status endpoints.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SessionState {
    Created = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

/// Lock-free session-state holder shared across a consumer's tasks.
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> SessionState {
        match self.0.load(Ordering::Relaxed) {
            0 => SessionState::Created,
            1 => SessionState::Running,
            2 => SessionState::Stopping,
            _ => SessionState::Stopped,
        }
    }

    pub fn store(&self, state: SessionState) {
        self.0.store(state as u8, Ordering::Relaxed);
    }

    /// Moves `from` to `to`; false when another task won the transition.
    pub fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsumerStats {
    pub session_id: String,
    pub stream_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exam_result_id: Option<String>,
    pub state: SessionState,
    pub frames_processed: u64,
    pub video_emotions_detected: u64,
    pub audio_segments_processed: u64,
    pub audio_emotions_detected: u64,
    pub heart_rate_measurements: u64,
    pub uptime_seconds: u64,
    /// Points waiting for the next checkpoint flush.
    pub buffered_points: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManagerStats {
    pub total_consumers: usize,
    pub consumers: HashMap<String, ConsumerStats>,
}
