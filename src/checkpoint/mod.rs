pub mod aggregate;
pub mod document;
pub mod point;
pub mod sampler;
pub mod store;

pub use aggregate::{
    aggregate_attention, calculate_aggregate, AggregateResult, StressIndicators, StressLevel,
};
pub use document::{CheckpointDocument, DocumentStats, FileInfo};
pub use point::{DataPoint, Modality, PointMetadata, PointPayload};
pub use sampler::{SamplingStrategy, WindowSampler};
pub use store::CheckpointFileStore;
