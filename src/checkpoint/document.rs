//! On-disk shape of a session's checkpoint document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checkpoint::point::DataPoint;

/// Running per-modality counts, recomputed on every append.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStats {
    pub video_emotion_count: u64,
    pub audio_emotion_count: u64,
    pub heart_rate_count: u64,
}

/// One JSON document per session: created at session start, append-only while
/// the session runs, read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointDocument {
    pub session_id: String,
    pub exam_result_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub video_emotions: Vec<DataPoint>,
    #[serde(default)]
    pub audio_emotions: Vec<DataPoint>,
    #[serde(default)]
    pub heart_rate_data: Vec<DataPoint>,
    #[serde(default)]
    pub stats: DocumentStats,
}

impl CheckpointDocument {
    pub fn new(session_id: &str, exam_result_id: Option<&str>, metadata: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            exam_result_id: exam_result_id.map(str::to_string),
            created_at: now,
            updated_at: now,
            metadata,
            video_emotions: Vec::new(),
            audio_emotions: Vec::new(),
            heart_rate_data: Vec::new(),
            stats: DocumentStats::default(),
        }
    }

    pub fn refresh_stats(&mut self) {
        self.stats = DocumentStats {
            video_emotion_count: self.video_emotions.len() as u64,
            audio_emotion_count: self.audio_emotions.len() as u64,
            heart_rate_count: self.heart_rate_data.len() as u64,
        };
    }

    pub fn total_points(&self) -> u64 {
        self.stats.video_emotion_count + self.stats.audio_emotion_count + self.stats.heart_rate_count
    }
}

/// Size and location summary reported upstream when a session finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Path relative to the storage root.
    pub relative_path: String,
    pub checkpoint_count: u64,
    pub file_size: u64,
}
