// Integration tests for the HTTP control surface
//
// The router is served on an ephemeral port and driven with real requests:
// session start/stop, duplicate and validation failures, and the status
// endpoints.

use std::sync::{Arc, Mutex as StdMutex};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::mpsc;

use affect_stream::analyzer::AnalyzerSet;
use affect_stream::backend::BackendClient;
use affect_stream::checkpoint::CheckpointFileStore;
use affect_stream::config::{BackendSettings, RealtimeSettings, Settings};
use affect_stream::http::{create_router, AppState};
use affect_stream::realtime::RealtimePublisher;
use affect_stream::stream::{
    AudioSegment, FrameSource, MediaSourceFactory, SegmentSource, StreamConsumerManager,
    VideoFrame,
};

#[derive(Default)]
struct OpenFrameSource {
    hold: Arc<StdMutex<Vec<mpsc::Sender<VideoFrame>>>>,
}

#[async_trait]
impl FrameSource for OpenFrameSource {
    async fn connect(&mut self) -> Result<mpsc::Receiver<VideoFrame>> {
        let (tx, rx) = mpsc::channel(1);
        self.hold.lock().unwrap().push(tx);
        Ok(rx)
    }

    async fn disconnect(&mut self) {
        self.hold.lock().unwrap().clear();
    }

    fn name(&self) -> &str {
        "open-frames"
    }
}

#[derive(Default)]
struct IdleSegmentSource;

#[async_trait]
impl SegmentSource for IdleSegmentSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioSegment>> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }

    async fn stop(&mut self) {}
}

struct FakeFactory;

impl MediaSourceFactory for FakeFactory {
    fn frame_source(&self, _stream_name: &str) -> Box<dyn FrameSource> {
        Box::<OpenFrameSource>::default()
    }

    fn segment_source(&self, _stream_name: &str) -> Box<dyn SegmentSource> {
        Box::<IdleSegmentSource>::default()
    }
}

async fn spawn_api(temp_dir: &TempDir) -> Result<String> {
    let mut settings = Settings::default();
    settings.checkpoint.storage_root = temp_dir.path().to_path_buf();
    settings.checkpoint.flush_interval_secs = 600;

    let store = Arc::new(CheckpointFileStore::new(temp_dir.path()));
    let publisher = Arc::new(
        RealtimePublisher::connect(&RealtimeSettings {
            url: "nats://127.0.0.1:4222".to_string(),
            enabled: false,
        })
        .await,
    );
    let backend = Arc::new(BackendClient::new(&BackendSettings {
        api_url: "http://127.0.0.1:9".to_string(),
        service_token: "test-token".to_string(),
        request_timeout_secs: 2,
    })?);

    let manager = Arc::new(StreamConsumerManager::new(
        Arc::new(settings),
        AnalyzerSet::default(),
        Arc::new(FakeFactory),
        store,
        publisher,
        backend,
    ));
    let app = create_router(AppState::new(manager));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    Ok(format!("http://{addr}"))
}

#[tokio::test]
async fn test_health_endpoint() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let base = spawn_api(&temp_dir).await?;

    let resp = reqwest::get(format!("{base}/health")).await?;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await?, "OK");
    Ok(())
}

#[tokio::test]
async fn test_start_generates_session_id_when_missing() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let base = spawn_api(&temp_dir).await?;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/streams/start"))
        .json(&json!({"stream_name": "cam-1"}))
        .send()
        .await?;
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["stream_name"], "cam-1");
    let session_id = body["data"]["session_id"].as_str().unwrap_or_default();
    assert!(
        session_id.starts_with("session-"),
        "Generated IDs carry the session- prefix, got {session_id}"
    );
    Ok(())
}

#[tokio::test]
async fn test_start_rejects_blank_stream_name() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let base = spawn_api(&temp_dir).await?;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/streams/start"))
        .json(&json!({"stream_name": "  "}))
        .send()
        .await?;
    assert_eq!(resp.status(), 400);

    let body: Value = resp.json().await?;
    assert_eq!(body["success"], false);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_start_conflicts() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let base = spawn_api(&temp_dir).await?;
    let client = reqwest::Client::new();

    let request = json!({"stream_name": "cam-1", "session_id": "sess-dup"});
    let first = client
        .post(format!("{base}/api/streams/start"))
        .json(&request)
        .send()
        .await?;
    assert_eq!(first.status(), 200);

    let second = client
        .post(format!("{base}/api/streams/start"))
        .json(&request)
        .send()
        .await?;
    assert_eq!(second.status(), 409);
    Ok(())
}

#[tokio::test]
async fn test_stop_by_session_id_then_not_found() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let base = spawn_api(&temp_dir).await?;
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/api/streams/start"))
        .json(&json!({"stream_name": "cam-1", "session_id": "sess-stop"}))
        .send()
        .await?
        .error_for_status()?;

    let stop = client
        .post(format!("{base}/api/streams/stop"))
        .json(&json!({"session_id": "sess-stop"}))
        .send()
        .await?;
    assert_eq!(stop.status(), 200);

    let again = client
        .post(format!("{base}/api/streams/stop"))
        .json(&json!({"session_id": "sess-stop"}))
        .send()
        .await?;
    assert_eq!(again.status(), 404);
    Ok(())
}

#[tokio::test]
async fn test_stop_by_stream_name() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let base = spawn_api(&temp_dir).await?;
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/api/streams/start"))
        .json(&json!({"stream_name": "cam-7", "session_id": "sess-by-name"}))
        .send()
        .await?
        .error_for_status()?;

    let stop = client
        .post(format!("{base}/api/streams/stop"))
        .json(&json!({"stream_name": "cam-7"}))
        .send()
        .await?;
    assert_eq!(stop.status(), 200);

    let status = reqwest::get(format!("{base}/api/streams/status/sess-by-name")).await?;
    assert_eq!(status.status(), 404);
    Ok(())
}

#[tokio::test]
async fn test_stop_requires_a_selector() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let base = spawn_api(&temp_dir).await?;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/streams/stop"))
        .json(&json!({}))
        .send()
        .await?;
    assert_eq!(resp.status(), 400);
    Ok(())
}

#[tokio::test]
async fn test_status_endpoints_report_sessions() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let base = spawn_api(&temp_dir).await?;
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/api/streams/start"))
        .json(&json!({
            "stream_name": "cam-1",
            "session_id": "sess-status",
            "exam_result_id": "exam-3"
        }))
        .send()
        .await?
        .error_for_status()?;

    let all: Value = reqwest::get(format!("{base}/api/streams/status"))
        .await?
        .json()
        .await?;
    assert_eq!(all["total_consumers"], 1);
    assert_eq!(all["consumers"]["sess-status"]["stream_name"], "cam-1");

    let one: Value = reqwest::get(format!("{base}/api/streams/status/sess-status"))
        .await?
        .json()
        .await?;
    assert_eq!(one["session_id"], "sess-status");
    assert_eq!(one["exam_result_id"], "exam-3");
    assert_eq!(one["state"], "running");
    assert_eq!(one["frames_processed"], 0);
    Ok(())
}
