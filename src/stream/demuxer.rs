//! Audio demuxing.
//!
//! A session's audio channel is pulled independently of its video frames: an
//! ffmpeg subprocess resamples the stream to 16 kHz mono s16le PCM on stdout,
//! and the extract task assembles fixed-duration f32 segments from it. The
//! hand-off to the consumer is a bounded channel with a bounded send, so a
//! stalled analyzer backs pressure up here instead of growing a queue.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::stream::source::log_subprocess_stderr;
use crate::stream::MAX_CONNECT_ATTEMPTS;

const SEGMENT_CHANNEL_CAPACITY: usize = 8;
const SEGMENT_SEND_TIMEOUT: Duration = Duration::from_secs(2);
const TASK_JOIN_GRACE: Duration = Duration::from_secs(5);
const CHILD_QUIT_GRACE: Duration = Duration::from_secs(1);

/// A fixed-duration block of normalized mono samples in [-1.0, 1.0].
#[derive(Debug, Clone)]
pub struct AudioSegment {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// 1-based position of this segment within the session.
    pub sequence: u64,
}

impl AudioSegment {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

#[async_trait]
pub trait SegmentSource: Send + Sync {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioSegment>>;
    async fn stop(&mut self);
}

#[derive(Debug, Clone)]
pub struct DemuxerConfig {
    pub url: String,
    pub ffmpeg_binary: String,
    pub transport: String,
    pub sample_rate: u32,
    pub segment_secs: f64,
    pub read_chunk_secs: f64,
}

pub struct AudioDemuxer {
    config: DemuxerConfig,
    cancel: CancellationToken,
    child: Arc<Mutex<Option<Child>>>,
    task: Option<JoinHandle<()>>,
}

impl AudioDemuxer {
    pub fn new(config: DemuxerConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
            child: Arc::new(Mutex::new(None)),
            task: None,
        }
    }
}

#[async_trait]
impl SegmentSource for AudioDemuxer {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioSegment>> {
        let (tx, rx) = mpsc::channel(SEGMENT_CHANNEL_CAPACITY);
        self.task = Some(tokio::spawn(extract_loop(
            self.config.clone(),
            Arc::clone(&self.child),
            self.cancel.clone(),
            tx,
        )));
        Ok(rx)
    }

    async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(mut child) = self.child.lock().await.take() {
            // ffmpeg exits cleanly on a quit command; fall back to SIGKILL
            // after the grace window.
            if let Some(mut stdin) = child.stdin.take() {
                let _ = stdin.write_all(b"q").await;
                let _ = stdin.shutdown().await;
            }
            match tokio::time::timeout(CHILD_QUIT_GRACE, child.wait()).await {
                Ok(_) => debug!("audio extractor exited cleanly"),
                Err(_) => {
                    warn!("audio extractor unresponsive, killing");
                    let _ = child.kill().await;
                }
            }
        }
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(TASK_JOIN_GRACE, &mut task).await.is_err() {
                warn!("audio extraction task did not stop in time, aborting");
                task.abort();
            }
        }
    }
}

fn spawn_extractor(config: &DemuxerConfig) -> Result<Child> {
    let mut cmd = Command::new(&config.ffmpeg_binary);
    cmd.args(["-rtsp_transport", &config.transport])
        .args(["-i", &config.url, "-vn"])
        .args(["-ar", &config.sample_rate.to_string(), "-ac", "1"])
        .args(["-f", "s16le", "-acodec", "pcm_s16le", "pipe:1"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd.spawn()
        .with_context(|| format!("failed to spawn {}", config.ffmpeg_binary))
}

async fn extract_loop(
    config: DemuxerConfig,
    child_slot: Arc<Mutex<Option<Child>>>,
    cancel: CancellationToken,
    tx: mpsc::Sender<AudioSegment>,
) {
    let chunk_samples = (config.sample_rate as f64 * config.read_chunk_secs) as usize;
    let segment_samples = (config.sample_rate as f64 * config.segment_secs) as usize;
    let mut attempts = 0u32;
    let mut sequence = 0u64;

    while !cancel.is_cancelled() {
        let mut child = match spawn_extractor(&config) {
            Ok(child) => child,
            Err(e) => {
                attempts += 1;
                error!(source = %config.url, attempt = attempts, error = %e, "audio extractor failed to start");
                if attempts >= MAX_CONNECT_ATTEMPTS {
                    error!(source = %config.url, "audio extraction halted after repeated failures");
                    break;
                }
                let backoff = Duration::from_secs(1u64 << attempts);
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(backoff) => {}
                }
                continue;
            }
        };
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.start_kill();
                error!("audio extractor stdout not captured");
                break;
            }
        };
        if let Some(stderr) = child.stderr.take() {
            log_subprocess_stderr(stderr, "audio-extractor");
        }
        info!(source = %config.url, "audio extraction started");
        *child_slot.lock().await = Some(child);

        let bytes_read = pump_segments(
            stdout,
            chunk_samples,
            segment_samples,
            config.sample_rate,
            &cancel,
            &tx,
            &mut sequence,
        )
        .await;

        if cancel.is_cancelled() {
            break;
        }
        if let Some(mut child) = child_slot.lock().await.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        // An extractor that exits without producing audio counts against the
        // retry budget; one that streamed and then lost the source gets a
        // fresh budget.
        if bytes_read == 0 {
            attempts += 1;
            if attempts >= MAX_CONNECT_ATTEMPTS {
                error!(source = %config.url, "audio extraction halted: source produced no audio");
                break;
            }
            let backoff = Duration::from_secs(1u64 << attempts);
            warn!(source = %config.url, attempt = attempts, "audio source produced no data, backing off");
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(backoff) => {}
            }
        } else {
            attempts = 0;
            warn!(source = %config.url, "audio stream ended, reconnecting");
        }
    }
    debug!(source = %config.url, "audio extraction task finished");
}

async fn pump_segments(
    mut stdout: ChildStdout,
    chunk_samples: usize,
    segment_samples: usize,
    sample_rate: u32,
    cancel: &CancellationToken,
    tx: &mpsc::Sender<AudioSegment>,
    sequence: &mut u64,
) -> u64 {
    let mut chunk = vec![0u8; chunk_samples * 2];
    let mut raw: Vec<u8> = Vec::new();
    let mut buffer: Vec<f32> = Vec::with_capacity(segment_samples);
    let mut total_bytes = 0u64;

    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => break,
            r = stdout.read(&mut chunk) => r,
        };
        let n = match read {
            Ok(0) => {
                debug!("audio pipe closed");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                debug!(error = %e, "audio pipe read failed");
                break;
            }
        };
        total_bytes += n as u64;
        raw.extend_from_slice(&chunk[..n]);

        // Convert whole s16le samples; an odd trailing byte waits for the
        // next read.
        let usable = raw.len() - (raw.len() % 2);
        for pair in raw[..usable].chunks_exact(2) {
            let sample = i16::from_le_bytes([pair[0], pair[1]]);
            buffer.push(f32::from(sample) / 32768.0);
        }
        raw.drain(..usable);

        while buffer.len() >= segment_samples {
            let rest = buffer.split_off(segment_samples);
            let samples = std::mem::replace(&mut buffer, rest);
            *sequence += 1;
            let segment = AudioSegment {
                samples,
                sample_rate,
                sequence: *sequence,
            };
            match tx.send_timeout(segment, SEGMENT_SEND_TIMEOUT).await {
                Ok(()) => {}
                Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                    warn!(sequence = *sequence, "audio pipeline congested, dropping segment");
                }
                Err(mpsc::error::SendTimeoutError::Closed(_)) => {
                    debug!("segment receiver dropped");
                    return total_bytes;
                }
            }
        }
    }
    total_bytes
}
