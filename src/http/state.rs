use crate::stream::StreamConsumerManager;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<StreamConsumerManager>,
}

impl AppState {
    pub fn new(manager: Arc<StreamConsumerManager>) -> Self {
        Self { manager }
    }
}
