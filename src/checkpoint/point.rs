//! Checkpoint data points as they appear on disk and over the wire.
//!
//! File and realtime payloads use camelCase keys; the modality tag values
//! stay snake_case to match the downstream readers.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analyzer::{EmotionResult, HeartRateResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    VideoEmotion,
    AudioEmotion,
    HeartRate,
    /// Catch-all for tags written by newer producers; dropped on append.
    #[serde(other)]
    Unknown,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::VideoEmotion => "video_emotion",
            Modality::AudioEmotion => "audio_emotion",
            Modality::HeartRate => "heart_rate",
            Modality::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Modality-specific portion of a data point, flattened into the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointPayload {
    #[serde(rename_all = "camelCase")]
    Emotion {
        dominant_emotion: String,
        emotion_scores: HashMap<String, f64>,
    },
    #[serde(rename_all = "camelCase")]
    HeartRate { heart_rate: f64, signal_quality: f64 },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement_number: Option<u64>,
}

/// One analysis result, immutable once appended to a checkpoint document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    pub data_type: Modality,
    /// Analyzer confidence in this result, 0.0 to 1.0.
    pub confidence: f64,
    #[serde(flatten)]
    pub payload: PointPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PointMetadata>,
}

impl DataPoint {
    pub fn video_emotion(result: &EmotionResult, frame_number: u64) -> Self {
        Self {
            timestamp: Utc::now(),
            data_type: Modality::VideoEmotion,
            confidence: result.confidence,
            payload: PointPayload::Emotion {
                dominant_emotion: result.dominant_emotion.clone(),
                emotion_scores: result.emotion_scores.clone(),
            },
            metadata: Some(PointMetadata {
                frame_number: Some(frame_number),
                ..PointMetadata::default()
            }),
        }
    }

    pub fn audio_emotion(result: &EmotionResult, segment_number: u64, duration_secs: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            data_type: Modality::AudioEmotion,
            confidence: result.confidence,
            payload: PointPayload::Emotion {
                dominant_emotion: result.dominant_emotion.clone(),
                emotion_scores: result.emotion_scores.clone(),
            },
            metadata: Some(PointMetadata {
                segment_number: Some(segment_number),
                segment_duration_secs: Some(duration_secs),
                ..PointMetadata::default()
            }),
        }
    }

    pub fn heart_rate(result: &HeartRateResult, measurement_number: u64, frame_number: u64) -> Self {
        Self {
            timestamp: Utc::now(),
            data_type: Modality::HeartRate,
            confidence: result.confidence,
            payload: PointPayload::HeartRate {
                heart_rate: result.heart_rate,
                signal_quality: result.signal_quality,
            },
            metadata: Some(PointMetadata {
                measurement_number: Some(measurement_number),
                frame_number: Some(frame_number),
                ..PointMetadata::default()
            }),
        }
    }

    pub fn dominant_emotion(&self) -> Option<&str> {
        match &self.payload {
            PointPayload::Emotion { dominant_emotion, .. } => Some(dominant_emotion),
            PointPayload::HeartRate { .. } => None,
        }
    }

    pub fn emotion_scores(&self) -> Option<&HashMap<String, f64>> {
        match &self.payload {
            PointPayload::Emotion { emotion_scores, .. } => Some(emotion_scores),
            PointPayload::HeartRate { .. } => None,
        }
    }

    pub fn heart_rate_value(&self) -> Option<f64> {
        match &self.payload {
            PointPayload::HeartRate { heart_rate, .. } => Some(*heart_rate),
            PointPayload::Emotion { .. } => None,
        }
    }
}
