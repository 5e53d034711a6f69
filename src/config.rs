use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::checkpoint::sampler::SamplingStrategy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub service: ServiceSettings,
    pub media: MediaSettings,
    pub analysis: AnalysisSettings,
    pub checkpoint: CheckpointSettings,
    pub realtime: RealtimeSettings,
    pub backend: BackendSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service: ServiceSettings::default(),
            media: MediaSettings::default(),
            analysis: AnalysisSettings::default(),
            checkpoint: CheckpointSettings::default(),
            realtime: RealtimeSettings::default(),
            backend: BackendSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5678,
        }
    }
}

/// Where the media server lives and how ffmpeg should pull from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaSettings {
    pub host: String,
    pub rtsp_port: u16,
    pub transport: String,
    pub ffmpeg_binary: String,
    pub frame_width: u32,
    pub frame_height: u32,
    pub connect_timeout_secs: u64,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            rtsp_port: 8554,
            transport: "tcp".to_string(),
            ffmpeg_binary: "ffmpeg".to_string(),
            frame_width: 640,
            frame_height: 360,
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Analyze every Nth decoded frame.
    pub frame_skip_interval: u64,
    pub audio_sample_rate: u32,
    pub audio_segment_secs: f64,
    pub audio_read_chunk_secs: f64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            frame_skip_interval: 2,
            audio_sample_rate: 16_000,
            audio_segment_secs: 3.0,
            audio_read_chunk_secs: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointSettings {
    pub storage_root: PathBuf,
    pub flush_interval_secs: u64,
    pub window_secs: f64,
    pub strategy: SamplingStrategy,
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("data/checkpoints"),
            flush_interval_secs: 5,
            window_secs: 1.0,
            strategy: SamplingStrategy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeSettings {
    pub url: String,
    pub enabled: bool,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_string(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub api_url: String,
    pub service_token: String,
    pub request_timeout_secs: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:4001".to_string(),
            service_token: "dev-ai-service-token".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Settings {
    /// Loads settings from `path` (any format the config crate understands),
    /// falling back to the defaults for anything missing. A missing file is
    /// not an error.
    pub fn load(path: &str) -> Result<Self> {
        let defaults =
            config::Config::try_from(&Settings::default()).context("invalid default settings")?;
        let settings = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::with_name(path).required(false))
            .build()
            .context("failed to read configuration")?;

        settings
            .try_deserialize()
            .context("invalid configuration values")
    }
}
