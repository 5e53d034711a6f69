//! Best-effort realtime fan-out over NATS.
//!
//! The publisher never fails the pipeline: if the broker is unreachable when
//! the process starts (or realtime is disabled in config), it comes up
//! permanently disabled and every publish returns false without touching the
//! network. Per-call errors and timeouts are logged and reported as false.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::RealtimeSettings;
use crate::realtime::messages::RealtimeMessage;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(2);

pub struct RealtimePublisher {
    client: Option<async_nats::Client>,
}

impl RealtimePublisher {
    /// Connects to the broker. Never fails: connection problems produce a
    /// disabled publisher for the lifetime of the process.
    pub async fn connect(settings: &RealtimeSettings) -> Self {
        if !settings.enabled {
            info!("realtime fan-out disabled by configuration");
            return Self { client: None };
        }
        match tokio::time::timeout(CONNECT_TIMEOUT, async_nats::connect(&settings.url)).await {
            Ok(Ok(client)) => {
                info!(url = %settings.url, "connected to realtime broker");
                Self {
                    client: Some(client),
                }
            }
            Ok(Err(e)) => {
                warn!(url = %settings.url, error = %e, "realtime broker unreachable, fan-out disabled for this run");
                Self { client: None }
            }
            Err(_) => {
                warn!(url = %settings.url, "realtime broker connect timed out, fan-out disabled for this run");
                Self { client: None }
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Publishes one analysis result on the session's subject. Returns
    /// whether the message was handed to the broker.
    pub async fn publish<T: Serialize>(&self, session_id: &str, kind: &str, payload: &T) -> bool {
        let client = match &self.client {
            Some(client) => client,
            None => return false,
        };
        let value = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                warn!(session_id, kind, error = %e, "failed to encode realtime payload");
                return false;
            }
        };
        let message = RealtimeMessage::new(session_id, kind, value);
        let bytes = match serde_json::to_vec(&message) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(session_id, kind, error = %e, "failed to encode realtime message");
                return false;
            }
        };
        let subject = format!("affect.session.{session_id}");
        match tokio::time::timeout(PUBLISH_TIMEOUT, client.publish(subject, bytes.into())).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(session_id, kind, error = %e, "realtime publish failed");
                false
            }
            Err(_) => {
                warn!(session_id, kind, "realtime publish timed out");
                false
            }
        }
    }

    /// Publishes a session lifecycle event on the same subject.
    pub async fn publish_event(
        &self,
        session_id: &str,
        kind: &str,
        data: serde_json::Value,
    ) -> bool {
        self.publish(session_id, kind, &data).await
    }
}
