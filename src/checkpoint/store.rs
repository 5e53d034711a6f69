//! Append-only checkpoint document store.
//!
//! Documents are partitioned by the UTC date of the session's first write:
//! `{root}/YYYY/MM/DD/{session_id}_data.json`. The partition is pinned when
//! the session first touches the store, so a session spanning midnight keeps
//! writing to the same file. Every mutation is a full read-modify-write of
//! the document, serialized by a per-file async lock and landed with a
//! temp-file rename so readers never observe a torn document.
//!
//! Locks are process-local. Cross-process exclusion is out of scope; the
//! manager's one-consumer-per-session registry is what keeps writers unique.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::checkpoint::document::{CheckpointDocument, FileInfo};
use crate::checkpoint::point::{DataPoint, Modality};

struct StoreEntry {
    path: PathBuf,
    lock: Mutex<()>,
}

pub struct CheckpointFileStore {
    storage_root: PathBuf,
    entries: Mutex<HashMap<String, Arc<StoreEntry>>>,
}

impl CheckpointFileStore {
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Creates the session's document if it does not exist yet and returns
    /// its path relative to the storage root. Idempotent: an existing
    /// document is left untouched.
    pub async fn initialize(
        &self,
        session_id: &str,
        exam_result_id: Option<&str>,
        metadata: serde_json::Value,
    ) -> Result<String> {
        let entry = self.entry(session_id).await;
        let _guard = entry.lock.lock().await;
        if tokio::fs::try_exists(&entry.path).await? {
            warn!(session_id, "checkpoint document already exists, reusing");
            return Ok(self.relative(&entry.path));
        }
        let doc = CheckpointDocument::new(session_id, exam_result_id, metadata);
        self.write_document(&entry.path, &doc).await?;
        debug!(session_id, path = %entry.path.display(), "checkpoint document created");
        Ok(self.relative(&entry.path))
    }

    /// Appends a batch of points, routing each into its modality array.
    /// Points with an unrecognized tag are dropped with a warning. A missing
    /// document is recreated first so a failed initialize never wedges the
    /// session's trace.
    pub async fn append(&self, session_id: &str, points: &[DataPoint]) -> Result<FileInfo> {
        let entry = self.entry(session_id).await;
        let _guard = entry.lock.lock().await;

        if !tokio::fs::try_exists(&entry.path).await? {
            warn!(session_id, "checkpoint document missing at append time, initializing");
            let doc = CheckpointDocument::new(session_id, None, serde_json::Value::Null);
            self.write_document(&entry.path, &doc).await?;
        }

        let mut doc = self.load_document(&entry.path, session_id).await?;
        for point in points {
            match point.data_type {
                Modality::VideoEmotion => doc.video_emotions.push(point.clone()),
                Modality::AudioEmotion => doc.audio_emotions.push(point.clone()),
                Modality::HeartRate => doc.heart_rate_data.push(point.clone()),
                Modality::Unknown => {
                    warn!(session_id, "dropping checkpoint point with unrecognized data type");
                }
            }
        }
        doc.updated_at = Utc::now();
        doc.refresh_stats();
        self.write_document(&entry.path, &doc).await?;

        let file_size = tokio::fs::metadata(&entry.path).await?.len();
        Ok(FileInfo {
            relative_path: self.relative(&entry.path),
            checkpoint_count: doc.total_points(),
            file_size,
        })
    }

    /// Loads the full document, or `None` if the session never wrote one.
    pub async fn read(&self, session_id: &str) -> Result<Option<CheckpointDocument>> {
        let entry = self.entry(session_id).await;
        let _guard = entry.lock.lock().await;
        if !tokio::fs::try_exists(&entry.path).await? {
            return Ok(None);
        }
        Ok(Some(self.load_document(&entry.path, session_id).await?))
    }

    pub async fn file_info(&self, session_id: &str) -> Result<Option<FileInfo>> {
        let entry = self.entry(session_id).await;
        let _guard = entry.lock.lock().await;
        if !tokio::fs::try_exists(&entry.path).await? {
            return Ok(None);
        }
        let doc = self.load_document(&entry.path, session_id).await?;
        let file_size = tokio::fs::metadata(&entry.path).await?.len();
        Ok(Some(FileInfo {
            relative_path: self.relative(&entry.path),
            checkpoint_count: doc.total_points(),
            file_size,
        }))
    }

    async fn entry(&self, session_id: &str) -> Arc<StoreEntry> {
        let mut entries = self.entries.lock().await;
        entries
            .entry(session_id.to_string())
            .or_insert_with(|| {
                let now = Utc::now();
                let relative = format!(
                    "{:04}/{:02}/{:02}/{}_data.json",
                    now.year(),
                    now.month(),
                    now.day(),
                    session_id
                );
                Arc::new(StoreEntry {
                    path: self.storage_root.join(relative),
                    lock: Mutex::new(()),
                })
            })
            .clone()
    }

    async fn load_document(&self, path: &Path, session_id: &str) -> Result<CheckpointDocument> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read checkpoint document for {session_id}"))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("corrupt checkpoint document for {session_id}"))
    }

    async fn write_document(&self, path: &Path, doc: &CheckpointDocument) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let body = serde_json::to_vec_pretty(doc).context("failed to encode checkpoint document")?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &body)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("failed to replace {}", path.display()))?;
        Ok(())
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.storage_root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }
}
