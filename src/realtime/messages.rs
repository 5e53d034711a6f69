//! Wire format of the per-session realtime feed.
//!
//! One subject per session carries every message kind; subscribers branch on
//! the `kind` discriminator. All keys are camelCase.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::analyzer::{EmotionResult, HeartRateResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeMessage {
    pub session_id: String,
    /// ISO-8601 UTC send time.
    pub timestamp: String,
    pub kind: String,
    pub payload: serde_json::Value,
}

impl RealtimeMessage {
    pub fn new(session_id: &str, kind: &str, payload: serde_json::Value) -> Self {
        Self {
            session_id: session_id.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            kind: kind.to_string(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoEmotionPayload {
    pub dominant_emotion: String,
    pub emotion_scores: HashMap<String, f64>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_count: Option<u32>,
    pub frame_number: u64,
}

impl VideoEmotionPayload {
    pub fn new(result: &EmotionResult, frame_number: u64) -> Self {
        Self {
            dominant_emotion: result.dominant_emotion.clone(),
            emotion_scores: result.emotion_scores.clone(),
            confidence: result.confidence,
            face_count: result.face_count,
            frame_number,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioEmotionPayload {
    pub dominant_emotion: String,
    pub emotion_scores: HashMap<String, f64>,
    pub confidence: f64,
    pub segment_number: u64,
}

impl AudioEmotionPayload {
    pub fn new(result: &EmotionResult, segment_number: u64) -> Self {
        Self {
            dominant_emotion: result.dominant_emotion.clone(),
            emotion_scores: result.emotion_scores.clone(),
            confidence: result.confidence,
            segment_number,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartRatePayload {
    pub heart_rate: f64,
    pub signal_quality: f64,
    pub confidence: f64,
    pub measurement_number: u64,
}

impl HeartRatePayload {
    pub fn new(result: &HeartRateResult, measurement_number: u64) -> Self {
        Self {
            heart_rate: result.heart_rate,
            signal_quality: result.signal_quality,
            confidence: result.confidence,
            measurement_number,
        }
    }
}
