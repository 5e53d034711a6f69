//! HTTP client for the persistence collaborator.
//!
//! Every call here is fire-and-forget from the pipeline's perspective: the
//! consumer logs failures and moves on, it never retries. Payload keys follow
//! the collaborator's snake_case contract.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::checkpoint::aggregate::AggregateResult;
use crate::checkpoint::document::FileInfo;
use crate::config::BackendSettings;

/// A detected anomaly, reported out-of-band from the checkpoint trace.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyEvent {
    pub session_id: String,
    #[serde(rename = "type")]
    pub anomaly_type: String,
    pub severity: String,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    session_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    exam_result_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Value::is_null")]
    stream_info: Value,
}

#[derive(Serialize)]
struct UpdateStatusRequest<'a> {
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_time: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct FileInfoRequest<'a> {
    checkpoint_file_path: &'a str,
    checkpoint_count: u64,
    file_size: u64,
}

pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl BackendClient {
    pub fn new(settings: &BackendSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .context("failed to build backend HTTP client")?;
        Ok(Self {
            http,
            base_url: settings.api_url.trim_end_matches('/').to_string(),
            token: settings.service_token.clone(),
        })
    }

    pub async fn create_session(
        &self,
        session_id: &str,
        exam_result_id: Option<&str>,
        stream_info: Value,
    ) -> Result<()> {
        let url = format!("{}/api/ai/sessions", self.base_url);
        self.http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&CreateSessionRequest {
                session_id,
                exam_result_id,
                stream_info,
            })
            .send()
            .await
            .context("create_session request failed")?
            .error_for_status()
            .context("create_session rejected")?;
        debug!(session_id, "analysis session registered with backend");
        Ok(())
    }

    pub async fn update_session_status(
        &self,
        session_id: &str,
        status: &str,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let url = format!("{}/api/ai/sessions/{}/status", self.base_url, session_id);
        self.http
            .patch(&url)
            .bearer_auth(&self.token)
            .json(&UpdateStatusRequest { status, end_time })
            .send()
            .await
            .context("update_session_status request failed")?
            .error_for_status()
            .context("update_session_status rejected")?;
        debug!(session_id, status, "session status reported");
        Ok(())
    }

    pub async fn update_session_file_info(&self, session_id: &str, info: &FileInfo) -> Result<()> {
        let url = format!("{}/api/ai/sessions/{}/file-info", self.base_url, session_id);
        self.http
            .patch(&url)
            .bearer_auth(&self.token)
            .json(&FileInfoRequest {
                checkpoint_file_path: &info.relative_path,
                checkpoint_count: info.checkpoint_count,
                file_size: info.file_size,
            })
            .send()
            .await
            .context("update_session_file_info request failed")?
            .error_for_status()
            .context("update_session_file_info rejected")?;
        debug!(
            session_id,
            checkpoint_count = info.checkpoint_count,
            file_size = info.file_size,
            "checkpoint file info reported"
        );
        Ok(())
    }

    pub async fn save_aggregate(&self, aggregate: &AggregateResult) -> Result<()> {
        let url = format!("{}/api/ai/aggregates", self.base_url);
        self.http
            .post(&url)
            .bearer_auth(&self.token)
            .json(aggregate)
            .send()
            .await
            .context("save_aggregate request failed")?
            .error_for_status()
            .context("save_aggregate rejected")?;
        debug!(session_id = %aggregate.session_id, "session aggregate saved");
        Ok(())
    }

    pub async fn save_anomaly(&self, anomaly: &AnomalyEvent) -> Result<()> {
        let url = format!("{}/api/ai/anomalies", self.base_url);
        self.http
            .post(&url)
            .bearer_auth(&self.token)
            .json(anomaly)
            .send()
            .await
            .context("save_anomaly request failed")?
            .error_for_status()
            .context("save_anomaly rejected")?;
        debug!(session_id = %anomaly.session_id, anomaly_type = %anomaly.anomaly_type, "anomaly saved");
        Ok(())
    }
}
