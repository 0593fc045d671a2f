//! Append-only JSONL checkpoint for resumable batch runs.
//!
//! One line per finished symbol. The latest line for a symbol wins; a symbol
//! counts as done only when that line is `completed` with the current bundle
//! fingerprint.

use crate::error::Result;
use crate::types::MetricsResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub symbol: String,
    pub fingerprint: String,
    pub status: CheckpointStatus,
    pub recorded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CheckpointEntry {
    pub fn completed(symbol: &str, fingerprint: &str, metrics: MetricsResult) -> Self {
        Self {
            symbol: symbol.to_string(),
            fingerprint: fingerprint.to_string(),
            status: CheckpointStatus::Completed,
            recorded_at: Utc::now(),
            metrics: Some(metrics),
            detail: None,
        }
    }

    pub fn failed(symbol: &str, fingerprint: &str, detail: impl Into<String>) -> Self {
        Self {
            symbol: symbol.to_string(),
            fingerprint: fingerprint.to_string(),
            status: CheckpointStatus::Failed,
            recorded_at: Utc::now(),
            metrics: None,
            detail: Some(detail.into()),
        }
    }
}

#[derive(Debug)]
pub struct Checkpoint {
    path: PathBuf,
    latest: HashMap<String, CheckpointEntry>,
}

impl Checkpoint {
    /// Open (or start) a checkpoint file. Malformed lines are skipped.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut latest = HashMap::new();

        if tokio::fs::try_exists(&path).await? {
            let content = tokio::fs::read_to_string(&path).await?;
            for (line_no, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<CheckpointEntry>(line) {
                    Ok(entry) => {
                        latest.insert(entry.symbol.clone(), entry);
                    }
                    Err(e) => warn!(
                        "Skipping malformed checkpoint line {} in {}: {}",
                        line_no + 1,
                        path.display(),
                        e
                    ),
                }
            }
            debug!("Checkpoint {} has {} symbols", path.display(), latest.len());
        }

        Ok(Self { path, latest })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_completed(&self, symbol: &str, fingerprint: &str) -> bool {
        self.latest.get(symbol).is_some_and(|e| {
            e.status == CheckpointStatus::Completed && e.fingerprint == fingerprint
        })
    }

    pub fn entry(&self, symbol: &str) -> Option<&CheckpointEntry> {
        self.latest.get(symbol)
    }

    /// Append one entry and flush it
    pub async fn record(&mut self, entry: CheckpointEntry) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let line = serde_json::to_string(&entry)?;
        file.write_all(format!("{}\n", line).as_bytes()).await?;
        file.flush().await?;

        self.latest.insert(entry.symbol.clone(), entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs").join("checkpoint.jsonl");

        let mut cp = Checkpoint::open(&path).await.unwrap();
        assert!(!cp.is_completed("FPT", "abc"));

        cp.record(CheckpointEntry::completed("FPT", "abc", MetricsResult::empty()))
            .await
            .unwrap();
        cp.record(CheckpointEntry::failed("VNM", "abc", "timeout"))
            .await
            .unwrap();
        assert!(cp.is_completed("FPT", "abc"));

        let reopened = Checkpoint::open(&path).await.unwrap();
        assert!(reopened.is_completed("FPT", "abc"));
        assert!(!reopened.is_completed("FPT", "other-bundle"));
        assert!(!reopened.is_completed("VNM", "abc"));
        assert_eq!(
            reopened.entry("VNM").unwrap().detail.as_deref(),
            Some("timeout")
        );
        // non-finite metrics survive the round trip
        assert!(reopened.entry("FPT").unwrap().metrics.unwrap().da.is_nan());
    }

    #[tokio::test]
    async fn test_latest_entry_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.jsonl");

        let mut cp = Checkpoint::open(&path).await.unwrap();
        cp.record(CheckpointEntry::failed("FPT", "abc", "boom"))
            .await
            .unwrap();
        cp.record(CheckpointEntry::completed("FPT", "abc", MetricsResult::empty()))
            .await
            .unwrap();

        let reopened = Checkpoint::open(&path).await.unwrap();
        assert!(reopened.is_completed("FPT", "abc"));
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.jsonl");
        let good = serde_json::to_string(&CheckpointEntry::completed(
            "HPG",
            "abc",
            MetricsResult::empty(),
        ))
        .unwrap();
        std::fs::write(&path, format!("{{not json\n\n{}\n", good)).unwrap();

        let cp = Checkpoint::open(&path).await.unwrap();
        assert!(cp.is_completed("HPG", "abc"));
    }
}
