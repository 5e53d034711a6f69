// Tests for checkpoint document aggregation
//
// These tests pin down the summary formulas: emotion pooling and
// distribution, valence/arousal, heart rate statistics with stress tiers,
// and the attention summary.

use std::collections::HashMap;

use affect_stream::checkpoint::{
    aggregate_attention, calculate_aggregate, AggregateResult, CheckpointDocument, DataPoint,
    StressLevel,
};
use affect_stream::{EmotionResult, HeartRateResult};
use serde_json::json;

fn approx(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() < 1e-9
}

fn doc() -> CheckpointDocument {
    CheckpointDocument::new("session-x", Some("exam-9"), json!({}))
}

fn emotion_point(label: &str, confidence: f64, frame: u64) -> DataPoint {
    let result = EmotionResult {
        dominant_emotion: label.to_string(),
        emotion_scores: [(label.to_string(), confidence)].into_iter().collect(),
        confidence,
        face_count: Some(1),
    };
    DataPoint::video_emotion(&result, frame)
}

fn scored_point(scores: &[(&str, f64)], dominant: &str, frame: u64) -> DataPoint {
    let result = EmotionResult {
        dominant_emotion: dominant.to_string(),
        emotion_scores: scores
            .iter()
            .map(|(label, score)| (label.to_string(), *score))
            .collect(),
        confidence: 0.9,
        face_count: Some(1),
    };
    DataPoint::video_emotion(&result, frame)
}

fn audio_point(label: &str, confidence: f64, segment: u64) -> DataPoint {
    let result = EmotionResult {
        dominant_emotion: label.to_string(),
        emotion_scores: HashMap::new(),
        confidence,
        face_count: None,
    };
    DataPoint::audio_emotion(&result, segment, 3.0)
}

fn heart_point(bpm: f64, measurement: u64) -> DataPoint {
    let result = HeartRateResult {
        heart_rate: bpm,
        signal_quality: 0.9,
        confidence: 0.8,
    };
    DataPoint::heart_rate(&result, measurement, measurement)
}

#[test]
fn test_empty_document_yields_no_aggregate() {
    let doc = doc();
    assert!(calculate_aggregate(&doc).is_none());
}

#[test]
fn test_emotion_distribution_and_dominant() {
    let mut doc = doc();
    doc.video_emotions.push(emotion_point("happy", 0.8, 1));
    doc.video_emotions.push(emotion_point("happy", 0.8, 2));
    doc.video_emotions.push(emotion_point("happy", 0.8, 3));
    doc.video_emotions.push(emotion_point("sad", 0.6, 4));

    let result = calculate_aggregate(&doc).expect("aggregate expected");
    assert_eq!(result.session_id, "session-x");
    assert_eq!(result.exam_result_id.as_deref(), Some("exam-9"));
    assert_eq!(result.dominant_emotion.as_deref(), Some("happy"));

    let distribution = result.emotion_distribution.expect("distribution expected");
    assert!(approx(distribution["happy"], 0.75));
    assert!(approx(distribution["sad"], 0.25));

    // Quality is the mean confidence over every point.
    assert!(approx(result.data_quality, 0.75));
    assert!(approx(result.analysis_confidence, 0.75));
}

#[test]
fn test_dominant_count_tie_keeps_first_seen() {
    let mut doc = doc();
    doc.video_emotions.push(emotion_point("happy", 0.5, 1));
    doc.video_emotions.push(emotion_point("sad", 0.5, 2));
    doc.video_emotions.push(emotion_point("happy", 0.5, 3));
    doc.video_emotions.push(emotion_point("sad", 0.5, 4));

    let result = calculate_aggregate(&doc).expect("aggregate expected");
    assert_eq!(result.dominant_emotion.as_deref(), Some("happy"));
}

#[test]
fn test_unlabeled_points_fall_back_to_neutral() {
    // A heart-rate shaped record sitting in an emotion array carries no
    // label; the aggregate still comes out well formed.
    let mut doc = doc();
    doc.video_emotions.push(heart_point(80.0, 1));

    let result = calculate_aggregate(&doc).expect("aggregate expected");
    assert_eq!(result.dominant_emotion.as_deref(), Some("neutral"));
    assert!(result.emotion_distribution.is_none());
    assert!(result.avg_valence.is_none());
    assert!(result.avg_arousal.is_none());
}

#[test]
fn test_valence_and_arousal_from_average_scores() {
    let mut doc = doc();
    doc.video_emotions.push(scored_point(
        &[("happy", 0.8), ("sad", 0.1), ("neutral", 0.1)],
        "happy",
        1,
    ));
    doc.video_emotions.push(scored_point(
        &[("happy", 0.6), ("sad", 0.3), ("fear", 0.1)],
        "happy",
        2,
    ));

    let result = calculate_aggregate(&doc).expect("aggregate expected");
    // avg scores: happy 0.7, sad 0.2, neutral 0.1, fear 0.1
    // valence = (0.7 - 0.2) / (0.7 + 0.2 + 0.001)
    assert!(approx(result.avg_valence.unwrap(), 0.555));
    // arousal = 0.1 / (0.1 + 0.3 + 0.001)
    assert!(approx(result.avg_arousal.unwrap(), 0.249));
}

#[test]
fn test_emotions_pool_video_and_audio() {
    let mut doc = doc();
    doc.video_emotions.push(emotion_point("happy", 0.9, 1));
    doc.audio_emotions.push(audio_point("sad", 0.7, 1));
    doc.audio_emotions.push(audio_point("sad", 0.7, 2));

    let result = calculate_aggregate(&doc).expect("aggregate expected");
    assert_eq!(result.dominant_emotion.as_deref(), Some("sad"));
    let distribution = result.emotion_distribution.expect("distribution expected");
    assert!(approx(distribution["happy"], 0.333));
    assert!(approx(distribution["sad"], 0.667));
}

#[test]
fn test_heart_rate_high_stress_tier() {
    let mut doc = doc();
    doc.heart_rate_data.push(heart_point(105.0, 1));
    doc.heart_rate_data.push(heart_point(106.0, 2));

    let result = calculate_aggregate(&doc).expect("aggregate expected");
    assert!(approx(result.avg_heart_rate.unwrap(), 105.5));
    assert!(approx(result.heart_rate_variability.unwrap(), 0.7));

    let stress = result.stress_indicators.expect("stress expected");
    assert_eq!(stress.level, StressLevel::High);
    assert!(approx(stress.avg_bpm, 105.5));
    assert!(approx(stress.hrv, 0.7));
}

#[test]
fn test_heart_rate_single_reading_is_medium_above_85() {
    let mut doc = doc();
    doc.heart_rate_data.push(heart_point(90.0, 1));

    let result = calculate_aggregate(&doc).expect("aggregate expected");
    assert!(approx(result.avg_heart_rate.unwrap(), 90.0));
    // One sample has no spread.
    assert!(approx(result.heart_rate_variability.unwrap(), 0.0));
    assert_eq!(
        result.stress_indicators.expect("stress expected").level,
        StressLevel::Medium
    );
}

#[test]
fn test_heart_rate_low_tier_and_zero_filter() {
    let mut doc = doc();
    // Dropped frames report 0 bpm; they must not drag the average down.
    doc.heart_rate_data.push(heart_point(0.0, 1));
    doc.heart_rate_data.push(heart_point(70.0, 2));
    doc.heart_rate_data.push(heart_point(72.0, 3));

    let result = calculate_aggregate(&doc).expect("aggregate expected");
    assert!(approx(result.avg_heart_rate.unwrap(), 71.0));
    assert!(approx(result.heart_rate_variability.unwrap(), 1.4));
    assert_eq!(
        result.stress_indicators.expect("stress expected").level,
        StressLevel::Low
    );
}

#[test]
fn test_all_zero_heart_rates_leave_fields_unset() {
    let mut doc = doc();
    doc.heart_rate_data.push(heart_point(0.0, 1));

    let result = calculate_aggregate(&doc).expect("aggregate expected");
    assert!(result.avg_heart_rate.is_none());
    assert!(result.stress_indicators.is_none());
    // The document was not empty, so an aggregate still exists with the
    // confidence of the raw points.
    assert!(approx(result.data_quality, 0.8));
}

#[test]
fn test_attention_summary_counts_distraction_events() {
    let mut result = AggregateResult::default();
    aggregate_attention(&[0.8, 0.4, 0.3, 0.6, 0.2], &mut result);

    assert!(approx(result.avg_attention.unwrap(), 0.46));
    assert!(approx(result.attention_variability.unwrap(), 0.241));
    // Dips below 0.5: [0.4, 0.3] and [0.2].
    assert_eq!(result.distraction_events, Some(2));
    assert!(approx(result.engagement_score.unwrap(), 34.9));
    assert!(approx(result.consistency_score.unwrap(), 75.9));
}

#[test]
fn test_attention_summary_ignores_empty_input() {
    let mut result = AggregateResult::default();
    aggregate_attention(&[], &mut result);
    assert!(result.avg_attention.is_none());
    assert!(result.distraction_events.is_none());
}
