//! Modality analyzer seams.
//!
//! Classifier internals live behind these traits. The pipeline treats every
//! analyzer as a black box: feed it a frame or a segment, get back an
//! optional result. Implementations are synchronous and may block; callers
//! dispatch them on the blocking pool.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stream::demuxer::AudioSegment;
use crate::stream::source::VideoFrame;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("model files not found at {path}")]
    ModelNotFound { path: PathBuf },
    #[error("model failed to load: {0}")]
    ModelLoad(String),
    #[error("analyzer initialization failed: {0}")]
    Initialization(String),
    #[error("analysis failed: {0}")]
    Analysis(String),
}

/// Classification outcome shared by the video and audio emotion modalities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionResult {
    pub dominant_emotion: String,
    pub emotion_scores: HashMap<String, f64>,
    pub confidence: f64,
    /// Set by vision analyzers that also report face presence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_count: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartRateResult {
    /// Beats per minute.
    pub heart_rate: f64,
    /// Quality of the underlying signal window, 0.0 to 1.0.
    pub signal_quality: f64,
    pub confidence: f64,
}

/// Lifecycle surface common to every modality analyzer.
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &str;
    fn is_initialized(&self) -> bool;
    fn initialize(&self) -> Result<(), AnalyzerError>;
}

pub trait VideoEmotionAnalyzer: Analyzer {
    /// Returns `Ok(None)` when the frame carries no usable face signal.
    fn analyze(&self, frame: &VideoFrame) -> Result<Option<EmotionResult>, AnalyzerError>;
}

pub trait AudioEmotionAnalyzer: Analyzer {
    /// Returns `Ok(None)` when the segment carries no usable voice signal.
    fn analyze(&self, segment: &AudioSegment) -> Result<Option<EmotionResult>, AnalyzerError>;
}

/// Heart-rate estimators accumulate frames in an internal buffer and yield a
/// reading only once enough signal has been collected, so most calls return
/// `Ok(None)`.
pub trait HeartRateAnalyzer: Analyzer {
    fn analyze(&self, frame: &VideoFrame) -> Result<Option<HeartRateResult>, AnalyzerError>;
}

/// The analyzers available to a session, one slot per modality. An empty slot
/// means the modality is absent from the session's output.
#[derive(Clone, Default)]
pub struct AnalyzerSet {
    pub video: Option<Arc<dyn VideoEmotionAnalyzer>>,
    pub audio: Option<Arc<dyn AudioEmotionAnalyzer>>,
    pub heart_rate: Option<Arc<dyn HeartRateAnalyzer>>,
}

impl AnalyzerSet {
    pub fn is_empty(&self) -> bool {
        self.video.is_none() && self.audio.is_none() && self.heart_rate.is_none()
    }
}
