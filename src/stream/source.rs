//! Video frame acquisition.
//!
//! `FrameSource` is the seam between a consumer and its media transport.
//! The production implementation shells out to ffmpeg and reads packed RGB24
//! frames off its stdout; tests drive consumers with scripted sources.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::{AnalysisSettings, MediaSettings};
use crate::stream::demuxer::{AudioDemuxer, DemuxerConfig, SegmentSource};

const FRAME_CHANNEL_CAPACITY: usize = 4;

/// One packed-RGB24 frame pulled from the media source.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Milliseconds since the feed connected.
    pub timestamp_ms: u64,
}

impl VideoFrame {
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == (self.width as usize) * (self.height as usize) * 3
    }
}

#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Establishes the feed and returns the frame channel. An error means
    /// this attempt failed; the caller owns the retry policy.
    async fn connect(&mut self) -> Result<mpsc::Receiver<VideoFrame>>;

    /// Tears down the feed and any subprocess behind it.
    async fn disconnect(&mut self);

    fn name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct RtspSourceConfig {
    pub url: String,
    pub ffmpeg_binary: String,
    pub transport: String,
    pub width: u32,
    pub height: u32,
    pub connect_timeout: Duration,
}

/// ffmpeg-backed RTSP frame source. The decoder is respawned on every
/// `connect`; a connect only succeeds once the first full frame arrives.
pub struct RtspFrameSource {
    config: RtspSourceConfig,
    child: Arc<Mutex<Option<Child>>>,
    reader: Option<JoinHandle<()>>,
}

impl RtspFrameSource {
    pub fn new(config: RtspSourceConfig) -> Self {
        Self {
            config,
            child: Arc::new(Mutex::new(None)),
            reader: None,
        }
    }

    fn spawn_decoder(&self) -> Result<Child> {
        let scale = format!("scale={}:{}", self.config.width, self.config.height);
        let mut cmd = Command::new(&self.config.ffmpeg_binary);
        cmd.args(["-rtsp_transport", &self.config.transport])
            .args(["-i", &self.config.url, "-an"])
            .args(["-vf", &scale])
            .args(["-pix_fmt", "rgb24", "-f", "rawvideo", "pipe:1"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd.spawn()
            .with_context(|| format!("failed to spawn {}", self.config.ffmpeg_binary))
    }
}

#[async_trait]
impl FrameSource for RtspFrameSource {
    async fn connect(&mut self) -> Result<mpsc::Receiver<VideoFrame>> {
        self.disconnect().await;

        let mut child = self.spawn_decoder()?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("decoder stdout not captured"))?;
        if let Some(stderr) = child.stderr.take() {
            log_subprocess_stderr(stderr, "video-decoder");
        }

        let frame_len = (self.config.width as usize) * (self.config.height as usize) * 3;
        let mut first = vec![0u8; frame_len];
        match timeout(self.config.connect_timeout, stdout.read_exact(&mut first)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                let _ = child.start_kill();
                return Err(anyhow!("decoder produced no frames from {}: {e}", self.config.url));
            }
            Err(_) => {
                let _ = child.start_kill();
                return Err(anyhow!(
                    "timed out waiting for first frame from {}",
                    self.config.url
                ));
            }
        }

        *self.child.lock().await = Some(child);
        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let dims = (self.config.width, self.config.height);
        self.reader = Some(tokio::spawn(read_frames(
            stdout,
            first,
            frame_len,
            dims,
            tx,
            Arc::clone(&self.child),
        )));
        info!(source = %self.config.url, "video feed connected");
        Ok(rx)
    }

    async fn disconnect(&mut self) {
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }

    fn name(&self) -> &str {
        &self.config.url
    }
}

async fn read_frames(
    mut stdout: ChildStdout,
    first: Vec<u8>,
    frame_len: usize,
    (width, height): (u32, u32),
    tx: mpsc::Sender<VideoFrame>,
    child: Arc<Mutex<Option<Child>>>,
) {
    let started = tokio::time::Instant::now();
    let mut pending = Some(first);
    loop {
        let data = match pending.take() {
            Some(buf) => buf,
            None => {
                let mut buf = vec![0u8; frame_len];
                match stdout.read_exact(&mut buf).await {
                    Ok(_) => buf,
                    Err(e) => {
                        debug!(error = %e, "video feed ended");
                        break;
                    }
                }
            }
        };
        let frame = VideoFrame {
            data,
            width,
            height,
            timestamp_ms: started.elapsed().as_millis() as u64,
        };
        if tx.send(frame).await.is_err() {
            debug!("frame receiver dropped, stopping decoder");
            break;
        }
    }
    if let Some(mut child) = child.lock().await.take() {
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}

/// Forwards a child's stderr to the log so decoder diagnostics are not lost.
pub(crate) fn log_subprocess_stderr(stderr: ChildStderr, component: &'static str) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let lower = line.to_lowercase();
            if lower.contains("error") || lower.contains("fail") {
                warn!(component = component, "{}", line);
            } else {
                debug!(component = component, "{}", line);
            }
        }
    })
}

/// Builds the per-stream media endpoints a consumer needs. The production
/// factory derives RTSP URLs from the configured gateway; tests swap in
/// scripted sources.
pub trait MediaSourceFactory: Send + Sync {
    fn frame_source(&self, stream_name: &str) -> Box<dyn FrameSource>;
    fn segment_source(&self, stream_name: &str) -> Box<dyn SegmentSource>;
}

pub struct RtspSourceFactory {
    media: MediaSettings,
    analysis: AnalysisSettings,
}

impl RtspSourceFactory {
    pub fn new(media: MediaSettings, analysis: AnalysisSettings) -> Self {
        Self { media, analysis }
    }

    fn stream_url(&self, stream_name: &str) -> String {
        format!(
            "rtsp://{}:{}/{}",
            self.media.host, self.media.rtsp_port, stream_name
        )
    }
}

impl MediaSourceFactory for RtspSourceFactory {
    fn frame_source(&self, stream_name: &str) -> Box<dyn FrameSource> {
        Box::new(RtspFrameSource::new(RtspSourceConfig {
            url: self.stream_url(stream_name),
            ffmpeg_binary: self.media.ffmpeg_binary.clone(),
            transport: self.media.transport.clone(),
            width: self.media.frame_width,
            height: self.media.frame_height,
            connect_timeout: Duration::from_secs(self.media.connect_timeout_secs),
        }))
    }

    fn segment_source(&self, stream_name: &str) -> Box<dyn SegmentSource> {
        Box::new(AudioDemuxer::new(DemuxerConfig {
            url: self.stream_url(stream_name),
            ffmpeg_binary: self.media.ffmpeg_binary.clone(),
            transport: self.media.transport.clone(),
            sample_rate: self.analysis.audio_sample_rate,
            segment_secs: self.analysis.audio_segment_secs,
            read_chunk_secs: self.analysis.audio_read_chunk_secs,
        }))
    }
}
