pub mod messages;
pub mod publisher;

pub use messages::{AudioEmotionPayload, HeartRatePayload, RealtimeMessage, VideoEmotionPayload};
pub use publisher::RealtimePublisher;
