//! Registry of active stream consumers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::analyzer::AnalyzerSet;
use crate::backend::BackendClient;
use crate::checkpoint::store::CheckpointFileStore;
use crate::config::Settings;
use crate::realtime::publisher::RealtimePublisher;
use crate::stream::consumer::{ConsumerConfig, StreamConsumer};
use crate::stream::source::MediaSourceFactory;
use crate::stream::stats::ManagerStats;

pub struct StreamConsumerManager {
    consumers: Mutex<HashMap<String, Arc<StreamConsumer>>>,
    settings: Arc<Settings>,
    analyzers: AnalyzerSet,
    sources: Arc<dyn MediaSourceFactory>,
    store: Arc<CheckpointFileStore>,
    publisher: Arc<RealtimePublisher>,
    backend: Arc<BackendClient>,
}

impl StreamConsumerManager {
    pub fn new(
        settings: Arc<Settings>,
        analyzers: AnalyzerSet,
        sources: Arc<dyn MediaSourceFactory>,
        store: Arc<CheckpointFileStore>,
        publisher: Arc<RealtimePublisher>,
        backend: Arc<BackendClient>,
    ) -> Self {
        Self {
            consumers: Mutex::new(HashMap::new()),
            settings,
            analyzers,
            sources,
            store,
            publisher,
            backend,
        }
    }

    /// Starts a consumer for `session_id`. Returns false when the session
    /// already exists or the consumer fails to come up.
    pub async fn start(
        &self,
        session_id: &str,
        stream_name: &str,
        exam_result_id: Option<String>,
    ) -> bool {
        let mut consumers = self.consumers.lock().await;
        if consumers.contains_key(session_id) {
            warn!(session_id, "session already active, ignoring start");
            return false;
        }

        let analysis = &self.settings.analysis;
        let checkpoint = &self.settings.checkpoint;
        let config = ConsumerConfig {
            session_id: session_id.to_string(),
            stream_name: stream_name.to_string(),
            exam_result_id,
            frame_skip_interval: analysis.frame_skip_interval.max(1),
            window: Duration::from_secs_f64(checkpoint.window_secs),
            strategy: checkpoint.strategy,
            flush_interval: Duration::from_secs(checkpoint.flush_interval_secs),
        };
        let consumer = StreamConsumer::new(
            config,
            self.analyzers.clone(),
            self.sources.frame_source(stream_name),
            self.sources.segment_source(stream_name),
            Arc::clone(&self.store),
            Arc::clone(&self.publisher),
            Arc::clone(&self.backend),
        );

        if let Err(e) = consumer.start().await {
            error!(session_id, error = %e, "failed to start stream consumer");
            return false;
        }
        consumers.insert(session_id.to_string(), consumer);
        info!(session_id, stream_name, "stream session registered");
        true
    }

    /// Stops and removes a consumer. Returns false for unknown sessions.
    /// The entry is unregistered only after the drain completes; a start
    /// with the same session id keeps being rejected until then.
    pub async fn stop(&self, session_id: &str) -> bool {
        let consumer = self.consumers.lock().await.get(session_id).cloned();
        match consumer {
            Some(consumer) => {
                if let Err(e) = consumer.stop().await {
                    error!(session_id, error = %e, "error while stopping consumer");
                }
                self.consumers.lock().await.remove(session_id);
                info!(session_id, "stream session removed");
                true
            }
            None => {
                warn!(session_id, "stop requested for unknown session");
                false
            }
        }
    }

    /// Stops the session consuming `stream_name`, when there is one.
    pub async fn stop_by_stream_name(&self, stream_name: &str) -> bool {
        let session_id = {
            let consumers = self.consumers.lock().await;
            consumers
                .values()
                .find(|c| c.stream_name() == stream_name)
                .map(|c| c.session_id().to_string())
        };
        match session_id {
            Some(session_id) => self.stop(&session_id).await,
            None => {
                warn!(stream_name, "no session consumes this stream");
                false
            }
        }
    }

    /// Shuts down every active session, draining each one fully.
    pub async fn stop_all(&self) {
        let session_ids: Vec<String> = self.consumers.lock().await.keys().cloned().collect();
        let count = session_ids.len();
        for session_id in session_ids {
            self.stop(&session_id).await;
        }
        info!(stopped = count, "all stream sessions stopped");
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<StreamConsumer>> {
        self.consumers.lock().await.get(session_id).cloned()
    }

    pub async fn stats(&self) -> ManagerStats {
        let consumers: Vec<Arc<StreamConsumer>> =
            self.consumers.lock().await.values().cloned().collect();
        let snapshots = futures::future::join_all(consumers.iter().map(|c| c.stats())).await;
        let consumers = snapshots
            .into_iter()
            .map(|s| (s.session_id.clone(), s))
            .collect::<HashMap<_, _>>();
        ManagerStats {
            total_consumers: consumers.len(),
            consumers,
        }
    }
}
