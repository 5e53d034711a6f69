// Tests for the realtime publisher and its wire format
//
// The publisher is best-effort by contract: disabled or unreachable brokers
// must never produce errors, only skipped sends.

use anyhow::Result;
use serde_json::json;

use affect_stream::config::RealtimeSettings;
use affect_stream::realtime::{RealtimeMessage, RealtimePublisher, VideoEmotionPayload};
use affect_stream::EmotionResult;

#[tokio::test]
async fn test_disabled_publisher_is_inert() {
    let publisher = RealtimePublisher::connect(&RealtimeSettings {
        url: "nats://127.0.0.1:4222".to_string(),
        enabled: false,
    })
    .await;

    assert!(!publisher.is_enabled());
    assert!(
        !publisher
            .publish("session-1", "video_emotion", &json!({"x": 1}))
            .await
    );
    assert!(
        !publisher
            .publish_event("session-1", "session_started", json!({}))
            .await
    );
}

#[tokio::test]
async fn test_unreachable_broker_degrades_to_disabled() {
    // Nothing listens on port 1; construction still succeeds.
    let publisher = RealtimePublisher::connect(&RealtimeSettings {
        url: "nats://127.0.0.1:1".to_string(),
        enabled: true,
    })
    .await;

    assert!(!publisher.is_enabled());
    assert!(
        !publisher
            .publish("session-1", "heart_rate", &json!({"bpm": 70}))
            .await
    );
}

#[test]
fn test_message_envelope_uses_camel_case() -> Result<()> {
    let message = RealtimeMessage::new("session-9", "video_emotion", json!({"ok": true}));
    let value = serde_json::to_value(&message)?;

    assert_eq!(value["sessionId"], "session-9");
    assert_eq!(value["kind"], "video_emotion");
    assert_eq!(value["payload"]["ok"], true);
    // RFC 3339 send time.
    assert!(value["timestamp"].as_str().unwrap_or_default().contains('T'));
    Ok(())
}

#[test]
fn test_video_payload_shape() -> Result<()> {
    let result = EmotionResult {
        dominant_emotion: "happy".to_string(),
        emotion_scores: [("happy".to_string(), 0.8)].into_iter().collect(),
        confidence: 0.8,
        face_count: Some(1),
    };
    let value = serde_json::to_value(VideoEmotionPayload::new(&result, 7))?;

    assert_eq!(value["dominantEmotion"], "happy");
    assert_eq!(value["emotionScores"]["happy"], 0.8);
    assert_eq!(value["faceCount"], 1);
    assert_eq!(value["frameNumber"], 7);
    Ok(())
}

#[test]
fn test_video_payload_omits_missing_face_count() -> Result<()> {
    let result = EmotionResult {
        dominant_emotion: "sad".to_string(),
        emotion_scores: [("sad".to_string(), 0.6)].into_iter().collect(),
        confidence: 0.6,
        face_count: None,
    };
    let value = serde_json::to_value(VideoEmotionPayload::new(&result, 3))?;

    assert!(value.get("faceCount").is_none());
    Ok(())
}
