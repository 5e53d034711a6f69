//! Time-windowed write sampling for the video emotion path.
//!
//! Realtime fan-out sees every result; the checkpoint file only gets one
//! point per window. Windows close lazily: the boundary is checked when the
//! next result arrives, so an idle stream simply leaves the current window
//! open until `take_candidate` drains it at session stop.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::checkpoint::point::DataPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingStrategy {
    /// Keep whichever result arrived last in the window.
    LastValid,
    /// Keep the highest-confidence result in the window; ties keep the
    /// earlier one.
    HighestConfidence,
}

impl Default for SamplingStrategy {
    fn default() -> Self {
        SamplingStrategy::LastValid
    }
}

#[derive(Debug)]
pub struct WindowSampler {
    window: Duration,
    strategy: SamplingStrategy,
    window_start: Instant,
    candidate: Option<DataPoint>,
}

impl WindowSampler {
    pub fn new(window: Duration, strategy: SamplingStrategy) -> Self {
        Self {
            window,
            strategy,
            window_start: Instant::now(),
            candidate: None,
        }
    }

    /// Offers a freshly analyzed point. Returns the previous window's pick
    /// when `point` lands past the window boundary; the new window opens
    /// seeded with `point`.
    pub fn offer(&mut self, point: DataPoint) -> Option<DataPoint> {
        if self.window_start.elapsed() >= self.window {
            let closed = self.candidate.take();
            self.window_start = Instant::now();
            self.candidate = Some(point);
            return closed;
        }
        match self.strategy {
            SamplingStrategy::LastValid => self.candidate = Some(point),
            SamplingStrategy::HighestConfidence => {
                let replace = self
                    .candidate
                    .as_ref()
                    .map_or(true, |current| point.confidence > current.confidence);
                if replace {
                    self.candidate = Some(point);
                }
            }
        }
        None
    }

    /// Closes the window unconditionally. Used at session stop so the
    /// trailing partial window is never lost.
    pub fn take_candidate(&mut self) -> Option<DataPoint> {
        self.window_start = Instant::now();
        self.candidate.take()
    }

    pub fn has_candidate(&self) -> bool {
        self.candidate.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::point::{Modality, PointPayload};
    use chrono::Utc;
    use std::collections::HashMap;

    fn point(confidence: f64) -> DataPoint {
        DataPoint {
            timestamp: Utc::now(),
            data_type: Modality::VideoEmotion,
            confidence,
            payload: PointPayload::Emotion {
                dominant_emotion: "happy".to_string(),
                emotion_scores: HashMap::new(),
            },
            metadata: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn last_valid_keeps_newest_in_window() {
        let mut sampler = WindowSampler::new(Duration::from_secs(1), SamplingStrategy::LastValid);
        assert!(sampler.offer(point(0.9)).is_none());
        assert!(sampler.offer(point(0.2)).is_none());
        tokio::time::advance(Duration::from_millis(1100)).await;
        let closed = sampler.offer(point(0.5)).expect("window should close");
        assert_eq!(closed.confidence, 0.2);
        assert!(sampler.has_candidate());
    }

    #[tokio::test(start_paused = true)]
    async fn highest_confidence_keeps_peak() {
        let mut sampler =
            WindowSampler::new(Duration::from_secs(1), SamplingStrategy::HighestConfidence);
        assert!(sampler.offer(point(0.3)).is_none());
        assert!(sampler.offer(point(0.9)).is_none());
        assert!(sampler.offer(point(0.5)).is_none());
        tokio::time::advance(Duration::from_millis(1100)).await;
        let closed = sampler.offer(point(0.1)).expect("window should close");
        assert_eq!(closed.confidence, 0.9);
    }

    #[tokio::test(start_paused = true)]
    async fn highest_confidence_tie_keeps_earlier() {
        let mut sampler =
            WindowSampler::new(Duration::from_secs(1), SamplingStrategy::HighestConfidence);
        let mut first = point(0.7);
        first.metadata = Some(crate::checkpoint::point::PointMetadata {
            frame_number: Some(1),
            ..Default::default()
        });
        sampler.offer(first);
        let mut second = point(0.7);
        second.metadata = Some(crate::checkpoint::point::PointMetadata {
            frame_number: Some(2),
            ..Default::default()
        });
        sampler.offer(second);
        let kept = sampler.take_candidate().expect("candidate expected");
        assert_eq!(kept.metadata.unwrap().frame_number, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_window_emits_nothing() {
        let mut sampler = WindowSampler::new(Duration::from_secs(1), SamplingStrategy::LastValid);
        tokio::time::advance(Duration::from_secs(5)).await;
        // The expired window held no candidate, so nothing comes out.
        assert!(sampler.offer(point(0.4)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn take_candidate_drains_open_window() {
        let mut sampler = WindowSampler::new(Duration::from_secs(60), SamplingStrategy::LastValid);
        sampler.offer(point(0.8));
        let drained = sampler.take_candidate().expect("candidate expected");
        assert_eq!(drained.confidence, 0.8);
        assert!(sampler.take_candidate().is_none());
        assert!(!sampler.has_candidate());
    }
}
