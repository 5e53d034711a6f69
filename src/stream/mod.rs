//! Live stream ingestion: media sources, per-session consumers, and the
//! manager that tracks them.

pub mod consumer;
pub mod demuxer;
pub mod manager;
pub mod source;
pub mod stats;

pub use consumer::{ConsumerConfig, StreamConsumer};
pub use demuxer::{AudioDemuxer, AudioSegment, DemuxerConfig, SegmentSource};
pub use manager::StreamConsumerManager;
pub use source::{
    FrameSource, MediaSourceFactory, RtspFrameSource, RtspSourceConfig, RtspSourceFactory,
    VideoFrame,
};
pub use stats::{ConsumerStats, ManagerStats, SessionState};

/// Connection attempts before a media pipeline is declared degraded.
pub(crate) const MAX_CONNECT_ATTEMPTS: u32 = 3;
