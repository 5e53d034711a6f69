//! Per-session stream consumer.
//!
//! One consumer owns everything a session does: the frame loop (video
//! emotion and heart rate), the audio loop fed by the demuxer, the periodic
//! checkpoint flush, and the end-of-session drain that finalizes the
//! document and reports the aggregate upstream.
//!
//! Realtime fan-out sees every accepted result; the checkpoint file sees the
//! windowed sample of the video path and every audio/heart-rate point.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::analyzer::{
    Analyzer, AnalyzerSet, AudioEmotionAnalyzer, HeartRateAnalyzer, VideoEmotionAnalyzer,
};
use crate::backend::BackendClient;
use crate::checkpoint::aggregate::calculate_aggregate;
use crate::checkpoint::point::{DataPoint, Modality};
use crate::checkpoint::sampler::{SamplingStrategy, WindowSampler};
use crate::checkpoint::store::CheckpointFileStore;
use crate::realtime::messages::{AudioEmotionPayload, HeartRatePayload, VideoEmotionPayload};
use crate::realtime::publisher::RealtimePublisher;
use crate::stream::demuxer::{AudioSegment, SegmentSource};
use crate::stream::source::{FrameSource, VideoFrame};
use crate::stream::stats::{ConsumerStats, SessionState, StateCell};
use crate::stream::MAX_CONNECT_ATTEMPTS;

const STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub session_id: String,
    pub stream_name: String,
    pub exam_result_id: Option<String>,
    /// Analyze every Nth frame; every frame is still counted.
    pub frame_skip_interval: u64,
    pub window: Duration,
    pub strategy: SamplingStrategy,
    pub flush_interval: Duration,
}

#[derive(Default)]
struct Counters {
    frames_processed: AtomicU64,
    video_emotions: AtomicU64,
    audio_segments: AtomicU64,
    audio_emotions: AtomicU64,
    heart_rate_measurements: AtomicU64,
}

struct PendingCheckpoints {
    buffer: Vec<DataPoint>,
    window: WindowSampler,
}

pub struct StreamConsumer {
    config: ConsumerConfig,
    analyzers: AnalyzerSet,
    store: Arc<CheckpointFileStore>,
    publisher: Arc<RealtimePublisher>,
    backend: Arc<BackendClient>,
    frame_source: Mutex<Option<Box<dyn FrameSource>>>,
    segment_source: Mutex<Box<dyn SegmentSource>>,
    state: StateCell,
    cancel: CancellationToken,
    counters: Counters,
    pending: Mutex<PendingCheckpoints>,
    started_at: Mutex<Option<DateTime<Utc>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl StreamConsumer {
    pub fn new(
        mut config: ConsumerConfig,
        analyzers: AnalyzerSet,
        frame_source: Box<dyn FrameSource>,
        segment_source: Box<dyn SegmentSource>,
        store: Arc<CheckpointFileStore>,
        publisher: Arc<RealtimePublisher>,
        backend: Arc<BackendClient>,
    ) -> Arc<Self> {
        config.frame_skip_interval = config.frame_skip_interval.max(1);
        let window = WindowSampler::new(config.window, config.strategy);
        Arc::new(Self {
            config,
            analyzers,
            store,
            publisher,
            backend,
            frame_source: Mutex::new(Some(frame_source)),
            segment_source: Mutex::new(segment_source),
            state: StateCell::new(SessionState::Created),
            cancel: CancellationToken::new(),
            counters: Counters::default(),
            pending: Mutex::new(PendingCheckpoints {
                buffer: Vec::new(),
                window,
            }),
            started_at: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    pub fn stream_name(&self) -> &str {
        &self.config.stream_name
    }

    pub fn state(&self) -> SessionState {
        self.state.load()
    }

    /// Brings the session up: checkpoint document, analyzers, and the three
    /// loops. A modality whose analyzer cannot initialize is disabled for
    /// this session; nothing here aborts the start.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.state.load() != SessionState::Created {
            warn!(session_id = %self.config.session_id, "consumer already started");
            return Ok(());
        }
        info!(
            session_id = %self.config.session_id,
            stream = %self.config.stream_name,
            "starting stream consumer"
        );

        let metadata = json!({
            "streamName": self.config.stream_name,
            "startedAt": Utc::now().to_rfc3339(),
        });
        if let Err(e) = self
            .store
            .initialize(
                &self.config.session_id,
                self.config.exam_result_id.as_deref(),
                metadata,
            )
            .await
        {
            error!(
                session_id = %self.config.session_id,
                error = %e,
                "checkpoint document init failed, continuing without a durable trace"
            );
        }

        let video = match &self.analyzers.video {
            Some(analyzer) => ready_or_disable(Arc::clone(analyzer), "video-emotion").await,
            None => None,
        };
        let audio = match &self.analyzers.audio {
            Some(analyzer) => ready_or_disable(Arc::clone(analyzer), "audio-emotion").await,
            None => None,
        };
        let heart = match &self.analyzers.heart_rate {
            Some(analyzer) => ready_or_disable(Arc::clone(analyzer), "heart-rate").await,
            None => None,
        };

        self.publisher
            .publish_event(
                &self.config.session_id,
                "session_started",
                json!({ "streamName": self.config.stream_name }),
            )
            .await;

        let mut tasks = self.tasks.lock().await;

        // The demuxer only runs when something can consume its segments.
        match audio {
            Some(analyzer) => match self.segment_source.lock().await.start().await {
                Ok(segments) => {
                    let this = Arc::clone(self);
                    tasks.push(tokio::spawn(async move {
                        this.audio_loop(segments, analyzer).await;
                    }));
                }
                Err(e) => error!(
                    session_id = %self.config.session_id,
                    error = %e,
                    "audio demuxer failed to start, audio modality disabled"
                ),
            },
            None => debug!(
                session_id = %self.config.session_id,
                "audio analyzer inactive, demuxer not started"
            ),
        }

        if let Some(source) = self.frame_source.lock().await.take() {
            let this = Arc::clone(self);
            tasks.push(tokio::spawn(async move {
                this.frame_loop(source, video, heart).await;
            }));
        }

        {
            let this = Arc::clone(self);
            tasks.push(tokio::spawn(async move {
                this.flush_loop().await;
            }));
        }
        drop(tasks);

        *self.started_at.lock().await = Some(Utc::now());
        self.state.store(SessionState::Running);
        info!(session_id = %self.config.session_id, "stream consumer running");
        Ok(())
    }

    /// Drains the session: cancels the loops, stops the demuxer, persists
    /// the trailing window and buffer, reports file info, and saves the
    /// aggregate. Always ends in `Stopped`, whatever failed along the way.
    pub async fn stop(&self) -> Result<()> {
        if !self
            .state
            .transition(SessionState::Running, SessionState::Stopping)
        {
            warn!(
                session_id = %self.config.session_id,
                state = ?self.state.load(),
                "stop requested but consumer not running"
            );
            return Ok(());
        }
        info!(session_id = %self.config.session_id, "stopping stream consumer");
        self.cancel.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for mut task in tasks {
            if tokio::time::timeout(STOP_GRACE, &mut task).await.is_err() {
                warn!(
                    session_id = %self.config.session_id,
                    "session task did not stop in time, aborting"
                );
                task.abort();
            }
        }
        self.segment_source.lock().await.stop().await;

        self.flush_pending(true).await;
        self.report_file_info().await;
        self.finalize_aggregate().await;

        self.publisher
            .publish_event(
                &self.config.session_id,
                "session_stopped",
                json!({
                    "framesProcessed": self.counters.frames_processed.load(Ordering::Relaxed),
                    "videoEmotionsDetected": self.counters.video_emotions.load(Ordering::Relaxed),
                    "audioEmotionsDetected": self.counters.audio_emotions.load(Ordering::Relaxed),
                    "heartRateMeasurements":
                        self.counters.heart_rate_measurements.load(Ordering::Relaxed),
                }),
            )
            .await;

        self.state.store(SessionState::Stopped);
        info!(session_id = %self.config.session_id, "stream consumer stopped");
        Ok(())
    }

    pub async fn stats(&self) -> ConsumerStats {
        let uptime_seconds = match *self.started_at.lock().await {
            Some(started) => (Utc::now() - started).num_seconds().max(0) as u64,
            None => 0,
        };
        let buffered_points = self.pending.lock().await.buffer.len();
        ConsumerStats {
            session_id: self.config.session_id.clone(),
            stream_name: self.config.stream_name.clone(),
            exam_result_id: self.config.exam_result_id.clone(),
            state: self.state.load(),
            frames_processed: self.counters.frames_processed.load(Ordering::Relaxed),
            video_emotions_detected: self.counters.video_emotions.load(Ordering::Relaxed),
            audio_segments_processed: self.counters.audio_segments.load(Ordering::Relaxed),
            audio_emotions_detected: self.counters.audio_emotions.load(Ordering::Relaxed),
            heart_rate_measurements: self
                .counters
                .heart_rate_measurements
                .load(Ordering::Relaxed),
            uptime_seconds,
            buffered_points,
        }
    }

    async fn frame_loop(
        self: Arc<Self>,
        mut source: Box<dyn FrameSource>,
        video: Option<Arc<dyn VideoEmotionAnalyzer>>,
        heart: Option<Arc<dyn HeartRateAnalyzer>>,
    ) {
        let session_id = self.config.session_id.clone();
        let mut attempts = 0u32;
        'connect: while !self.cancel.is_cancelled() {
            let mut frames = match source.connect().await {
                Ok(frames) => {
                    attempts = 0;
                    frames
                }
                Err(e) => {
                    attempts += 1;
                    warn!(
                        session_id = %session_id,
                        attempt = attempts,
                        error = %e,
                        "media source connection failed"
                    );
                    if attempts >= MAX_CONNECT_ATTEMPTS {
                        error!(
                            session_id = %session_id,
                            "video pipeline degraded: giving up on media source"
                        );
                        break 'connect;
                    }
                    let backoff = Duration::from_secs(1u64 << attempts);
                    tokio::select! {
                        _ = self.cancel.cancelled() => break 'connect,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    continue;
                }
            };
            info!(session_id = %session_id, source = source.name(), "media source connected");

            loop {
                let frame = tokio::select! {
                    _ = self.cancel.cancelled() => break 'connect,
                    frame = frames.recv() => match frame {
                        Some(frame) => frame,
                        None => {
                            warn!(session_id = %session_id, "video feed ended, reconnecting");
                            break;
                        }
                    },
                };
                self.process_frame(frame, &video, &heart).await;
            }
        }
        source.disconnect().await;
        debug!(session_id = %session_id, "frame loop finished");
    }

    async fn process_frame(
        &self,
        frame: VideoFrame,
        video: &Option<Arc<dyn VideoEmotionAnalyzer>>,
        heart: &Option<Arc<dyn HeartRateAnalyzer>>,
    ) {
        if !frame.is_valid() {
            debug!(session_id = %self.config.session_id, "discarding malformed frame");
            return;
        }
        let frame_number = self.counters.frames_processed.fetch_add(1, Ordering::Relaxed) + 1;
        if frame_number % self.config.frame_skip_interval != 0 {
            return;
        }

        if let Some(analyzer) = video {
            let task = {
                let analyzer = Arc::clone(analyzer);
                let frame = frame.clone();
                tokio::task::spawn_blocking(move || analyzer.analyze(&frame))
            };
            match task.await {
                Ok(Ok(Some(result))) => {
                    self.counters.video_emotions.fetch_add(1, Ordering::Relaxed);
                    let payload = VideoEmotionPayload::new(&result, frame_number);
                    self.publisher
                        .publish(
                            &self.config.session_id,
                            Modality::VideoEmotion.as_str(),
                            &payload,
                        )
                        .await;
                    let point = DataPoint::video_emotion(&result, frame_number);
                    let mut pending = self.pending.lock().await;
                    if let Some(closed) = pending.window.offer(point) {
                        pending.buffer.push(closed);
                    }
                }
                Ok(Ok(None)) => debug!(
                    session_id = %self.config.session_id,
                    frame_number,
                    "no face signal in frame"
                ),
                Ok(Err(e)) => warn!(
                    session_id = %self.config.session_id,
                    frame_number,
                    error = %e,
                    "video emotion analysis failed"
                ),
                Err(e) => warn!(
                    session_id = %self.config.session_id,
                    error = %e,
                    "video analysis task failed"
                ),
            }
        }

        if let Some(analyzer) = heart {
            let task = {
                let analyzer = Arc::clone(analyzer);
                let frame = frame;
                tokio::task::spawn_blocking(move || analyzer.analyze(&frame))
            };
            match task.await {
                Ok(Ok(Some(result))) => {
                    let measurement_number = self
                        .counters
                        .heart_rate_measurements
                        .fetch_add(1, Ordering::Relaxed)
                        + 1;
                    let payload = HeartRatePayload::new(&result, measurement_number);
                    self.publisher
                        .publish(
                            &self.config.session_id,
                            Modality::HeartRate.as_str(),
                            &payload,
                        )
                        .await;
                    let point = DataPoint::heart_rate(&result, measurement_number, frame_number);
                    self.pending.lock().await.buffer.push(point);
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => warn!(
                    session_id = %self.config.session_id,
                    frame_number,
                    error = %e,
                    "heart rate analysis failed"
                ),
                Err(e) => warn!(
                    session_id = %self.config.session_id,
                    error = %e,
                    "heart rate analysis task failed"
                ),
            }
        }

        tokio::task::yield_now().await;
    }

    async fn audio_loop(
        self: Arc<Self>,
        mut segments: mpsc::Receiver<AudioSegment>,
        analyzer: Arc<dyn AudioEmotionAnalyzer>,
    ) {
        let session_id = self.config.session_id.clone();
        loop {
            let segment = tokio::select! {
                _ = self.cancel.cancelled() => break,
                segment = segments.recv() => match segment {
                    Some(segment) => segment,
                    None => {
                        debug!(session_id = %session_id, "segment channel closed");
                        break;
                    }
                },
            };
            self.counters.audio_segments.fetch_add(1, Ordering::Relaxed);
            let sequence = segment.sequence;
            let duration_secs = segment.duration_secs();
            let task = {
                let analyzer = Arc::clone(&analyzer);
                tokio::task::spawn_blocking(move || analyzer.analyze(&segment))
            };
            match task.await {
                Ok(Ok(Some(result))) => {
                    self.counters.audio_emotions.fetch_add(1, Ordering::Relaxed);
                    let payload = AudioEmotionPayload::new(&result, sequence);
                    self.publisher
                        .publish(
                            &self.config.session_id,
                            Modality::AudioEmotion.as_str(),
                            &payload,
                        )
                        .await;
                    let point = DataPoint::audio_emotion(&result, sequence, duration_secs);
                    self.pending.lock().await.buffer.push(point);
                }
                Ok(Ok(None)) => debug!(
                    session_id = %session_id,
                    sequence,
                    "no voice signal in segment"
                ),
                Ok(Err(e)) => warn!(
                    session_id = %session_id,
                    sequence,
                    error = %e,
                    "audio emotion analysis failed"
                ),
                Err(e) => warn!(
                    session_id = %session_id,
                    error = %e,
                    "audio analysis task failed"
                ),
            }
        }
        debug!(session_id = %session_id, "audio loop finished");
    }

    async fn flush_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => self.flush_pending(false).await,
            }
        }
    }

    /// Pushes the pending buffer to the store. With `drain_window` the open
    /// sampling window is force-closed first; the periodic flush leaves it
    /// alone. A failed write drops the batch: those points already went out
    /// over the realtime feed.
    async fn flush_pending(&self, drain_window: bool) {
        let points = {
            let mut pending = self.pending.lock().await;
            if drain_window {
                if let Some(candidate) = pending.window.take_candidate() {
                    pending.buffer.push(candidate);
                }
            }
            if pending.buffer.is_empty() {
                return;
            }
            std::mem::take(&mut pending.buffer)
        };
        let count = points.len();
        match self.store.append(&self.config.session_id, &points).await {
            Ok(info) => debug!(
                session_id = %self.config.session_id,
                appended = count,
                total = info.checkpoint_count,
                bytes = info.file_size,
                "checkpoints flushed"
            ),
            Err(e) => warn!(
                session_id = %self.config.session_id,
                dropped = count,
                error = %e,
                "checkpoint flush failed, dropping buffered points"
            ),
        }
    }

    async fn report_file_info(&self) {
        match self.store.file_info(&self.config.session_id).await {
            Ok(Some(info)) => {
                if let Err(e) = self
                    .backend
                    .update_session_file_info(&self.config.session_id, &info)
                    .await
                {
                    error!(
                        session_id = %self.config.session_id,
                        error = %e,
                        "failed to report checkpoint file info"
                    );
                }
            }
            Ok(None) => debug!(
                session_id = %self.config.session_id,
                "no checkpoint document to report"
            ),
            Err(e) => warn!(
                session_id = %self.config.session_id,
                error = %e,
                "checkpoint file info unavailable"
            ),
        }
    }

    async fn finalize_aggregate(&self) {
        let doc = match self.store.read(&self.config.session_id).await {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                warn!(
                    session_id = %self.config.session_id,
                    "no checkpoint document, skipping aggregation"
                );
                return;
            }
            Err(e) => {
                error!(
                    session_id = %self.config.session_id,
                    error = %e,
                    "failed to load checkpoint document for aggregation"
                );
                return;
            }
        };
        match calculate_aggregate(&doc) {
            Some(aggregate) => {
                if let Err(e) = self.backend.save_aggregate(&aggregate).await {
                    error!(
                        session_id = %self.config.session_id,
                        error = %e,
                        "failed to save session aggregate"
                    );
                } else {
                    info!(session_id = %self.config.session_id, "session aggregate saved");
                }
            }
            None => warn!(
                session_id = %self.config.session_id,
                "no analysis data collected, skipping aggregate"
            ),
        }
    }
}

/// Makes sure an analyzer is initialized, running the initialization on the
/// blocking pool. Returns `None` when the modality must be disabled.
async fn ready_or_disable<A>(analyzer: Arc<A>, modality: &'static str) -> Option<Arc<A>>
where
    A: Analyzer + ?Sized + 'static,
{
    if analyzer.is_initialized() {
        return Some(analyzer);
    }
    let init = Arc::clone(&analyzer);
    match tokio::task::spawn_blocking(move || init.initialize()).await {
        Ok(Ok(())) => {
            info!(modality, analyzer = analyzer.name(), "analyzer initialized");
            Some(analyzer)
        }
        Ok(Err(e)) => {
            error!(
                modality,
                error = %e,
                "analyzer unavailable, modality disabled for this session"
            );
            None
        }
        Err(e) => {
            error!(
                modality,
                error = %e,
                "analyzer init task failed, modality disabled for this session"
            );
            None
        }
    }
}
