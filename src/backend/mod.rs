pub mod client;

pub use client::{AnomalyEvent, BackendClient};
