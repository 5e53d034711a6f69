//! Real-time affect analysis pipeline for live media streams.
//!
//! Sessions are driven over HTTP: a start request spawns a consumer that
//! pulls one media stream, fans decoded frames and audio segments out to
//! the registered analyzers, publishes results over NATS, and appends
//! sampled checkpoints to a date-partitioned JSON document. Stopping a
//! session drains the pipeline, aggregates the document, and reports the
//! result to the exam backend.

pub mod analyzer;
pub mod backend;
pub mod checkpoint;
pub mod config;
pub mod http;
pub mod realtime;
pub mod stream;

pub use analyzer::{
    Analyzer, AnalyzerSet, AudioEmotionAnalyzer, EmotionResult, HeartRateAnalyzer,
    HeartRateResult, VideoEmotionAnalyzer,
};
pub use backend::BackendClient;
pub use checkpoint::{CheckpointDocument, CheckpointFileStore, DataPoint, Modality};
pub use config::Settings;
pub use http::{create_router, AppState};
pub use realtime::RealtimePublisher;
pub use stream::{StreamConsumer, StreamConsumerManager};
