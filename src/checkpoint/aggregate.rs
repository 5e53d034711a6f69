//! Post-hoc aggregation of a finished checkpoint document.
//!
//! Pure computation: reads a document, produces summary statistics, touches
//! nothing. Emotion aggregation pools the video and audio arrays; heart-rate
//! aggregation filters non-positive readings before averaging.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::checkpoint::document::CheckpointDocument;
use crate::checkpoint::point::DataPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StressLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressIndicators {
    pub level: StressLevel,
    pub avg_bpm: f64,
    pub hrv: f64,
}

/// Flattened summary row, shaped for the persistence collaborator's
/// aggregate endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateResult {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exam_result_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_valence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_arousal: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dominant_emotion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion_distribution: Option<HashMap<String, f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_attention: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attention_variability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distraction_events: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engagement_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consistency_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_heart_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heart_rate_variability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stress_indicators: Option<StressIndicators>,
    pub data_quality: f64,
    pub analysis_confidence: f64,
}

/// Reduces a document to its summary, or `None` when all three modality
/// arrays are empty. Never panics on odd data.
pub fn calculate_aggregate(doc: &CheckpointDocument) -> Option<AggregateResult> {
    let video = &doc.video_emotions;
    let audio = &doc.audio_emotions;
    let heart = &doc.heart_rate_data;
    if video.is_empty() && audio.is_empty() && heart.is_empty() {
        return None;
    }

    let mut result = AggregateResult {
        session_id: doc.session_id.clone(),
        exam_result_id: doc.exam_result_id.clone(),
        data_quality: 0.5,
        analysis_confidence: 0.5,
        ..AggregateResult::default()
    };

    let emotion_points: Vec<&DataPoint> = video.iter().chain(audio.iter()).collect();
    if !emotion_points.is_empty() {
        aggregate_emotions(&emotion_points, &mut result);
    }
    if !heart.is_empty() {
        aggregate_heart_rate(heart, &mut result);
    }

    let confidences: Vec<f64> = video
        .iter()
        .chain(audio.iter())
        .chain(heart.iter())
        .map(|p| p.confidence)
        .collect();
    if !confidences.is_empty() {
        let quality = round_to(mean(&confidences), 3);
        result.data_quality = quality;
        result.analysis_confidence = quality;
    }

    Some(result)
}

fn aggregate_emotions(points: &[&DataPoint], result: &mut AggregateResult) {
    let labels: Vec<&str> = points.iter().filter_map(|p| p.dominant_emotion()).collect();

    // Frequency table in first-seen order so a count tie resolves to the
    // label observed first.
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for label in &labels {
        match counts.iter_mut().find(|(l, _)| l == label) {
            Some((_, n)) => *n += 1,
            None => counts.push((label, 1)),
        }
    }

    let mut dominant: Option<(&str, usize)> = None;
    for (label, n) in &counts {
        if dominant.map_or(true, |(_, best)| *n > best) {
            dominant = Some((label, *n));
        }
    }
    result.dominant_emotion = Some(
        dominant
            .map(|(label, _)| label.to_string())
            .unwrap_or_else(|| "neutral".to_string()),
    );

    if !labels.is_empty() {
        let total = labels.len() as f64;
        result.emotion_distribution = Some(
            counts
                .iter()
                .map(|(label, n)| (label.to_string(), round_to(*n as f64 / total, 3)))
                .collect(),
        );
    }

    // Per-label score averages, each label averaged only over the points
    // that reported it (a missing score is not a zero).
    let score_maps: Vec<&HashMap<String, f64>> = points
        .iter()
        .filter_map(|p| p.emotion_scores())
        .filter(|scores| !scores.is_empty())
        .collect();
    if score_maps.is_empty() {
        return;
    }
    let mut sums: HashMap<&str, (f64, usize)> = HashMap::new();
    for scores in &score_maps {
        for (label, score) in scores.iter() {
            let slot = sums.entry(label.as_str()).or_insert((0.0, 0));
            slot.0 += score;
            slot.1 += 1;
        }
    }
    let avg_scores: HashMap<String, f64> = sums
        .into_iter()
        .map(|(label, (sum, n))| (label.to_string(), round_to(sum / n as f64, 3)))
        .collect();

    let score = |label: &str| avg_scores.get(label).copied().unwrap_or(0.0);
    let positive = score("happy") + score("surprise");
    let negative = score("sad") + score("angry") + score("disgust");
    result.avg_valence = Some(round_to(
        (positive - negative) / (positive + negative + 0.001),
        3,
    ));
    let high = score("angry") + score("fear") + score("surprise");
    let low = score("sad") + score("neutral");
    result.avg_arousal = Some(round_to(high / (high + low + 0.001), 3));
}

fn aggregate_heart_rate(points: &[DataPoint], result: &mut AggregateResult) {
    let rates: Vec<f64> = points
        .iter()
        .filter_map(|p| p.heart_rate_value())
        .filter(|bpm| *bpm > 0.0)
        .collect();
    if rates.is_empty() {
        return;
    }
    let avg = round_to(mean(&rates), 1);
    let variability = if rates.len() > 1 {
        round_to(sample_stdev(&rates), 1)
    } else {
        0.0
    };
    let level = if avg > 100.0 {
        if variability < 5.0 {
            StressLevel::High
        } else {
            StressLevel::Medium
        }
    } else if avg > 85.0 {
        StressLevel::Medium
    } else {
        StressLevel::Low
    };
    result.avg_heart_rate = Some(avg);
    result.heart_rate_variability = Some(variability);
    result.stress_indicators = Some(StressIndicators {
        level,
        avg_bpm: avg,
        hrv: variability,
    });
}

/// Attention summary over normalized samples in [0, 1]. A distraction event
/// is a transition from at-or-above 0.5 to below it. No pipeline produces
/// attention samples yet; this exists to complete the aggregate schema and is
/// exercised directly by callers that do have samples.
pub fn aggregate_attention(samples: &[f64], result: &mut AggregateResult) {
    if samples.is_empty() {
        return;
    }
    let avg = mean(samples);
    let variability = if samples.len() > 1 {
        sample_stdev(samples)
    } else {
        0.0
    };
    let mut distraction_events = 0u32;
    let mut below = false;
    for sample in samples {
        if *sample < 0.5 {
            if !below {
                distraction_events += 1;
                below = true;
            }
        } else {
            below = false;
        }
    }
    result.avg_attention = Some(round_to(avg, 3));
    result.attention_variability = Some(round_to(variability, 3));
    result.distraction_events = Some(distraction_events);
    result.engagement_score = Some(round_to(avg * 100.0 * (1.0 - variability.min(0.5)), 1));
    result.consistency_score = Some(round_to((1.0 - variability.min(1.0)) * 100.0, 1));
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn sample_stdev(values: &[f64]) -> f64 {
    let m = mean(values);
    let variance =
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
