//! Append-only audit log of verification outcomes.
//!
//! One JSON object per line. Lines are only ever appended; the analytics
//! summary reads the file back in append order.

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Number of entries shown in the "recent activity" view.
pub const RECENT_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Verified,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditReason {
    NftVerified,
    NoNft,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub user_id: i64,
    pub username: String,
    pub status: AuditStatus,
    pub reason: AuditReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nft_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
}

impl AuditEntry {
    pub fn verified(user_id: i64, username: &str, nft_count: u64, wallet_address: &str) -> Self {
        Self {
            timestamp: now_epoch_secs(),
            user_id,
            username: username.to_string(),
            status: AuditStatus::Verified,
            reason: AuditReason::NftVerified,
            nft_count: Some(nft_count),
            wallet_address: Some(wallet_address.to_string()),
        }
    }

    pub fn removed(user_id: i64, username: &str, reason: AuditReason, wallet_address: Option<&str>) -> Self {
        Self {
            timestamp: now_epoch_secs(),
            user_id,
            username: username.to_string(),
            status: AuditStatus::Removed,
            reason,
            nft_count: None,
            wallet_address: wallet_address.map(str::to_string),
        }
    }
}

fn now_epoch_secs() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Aggregate view used by the analytics command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalyticsSummary {
    pub total_verified: usize,
    pub total_removed: usize,
    /// Most recent entries, oldest first.
    pub recent: Vec<AuditEntry>,
}

pub struct AuditLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl AuditLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry as a single line.
    pub fn append(&self, entry: &AuditEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open audit log {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("failed to append to audit log {}", self.path.display()))?;
        log::info!(
            "Audit: user {} (@{}) {:?}/{:?}",
            entry.user_id,
            entry.username,
            entry.status,
            entry.reason
        );
        Ok(())
    }

    /// Append from async code without blocking a runtime worker.
    pub async fn record(self: &Arc<Self>, entry: AuditEntry) -> Result<()> {
        let log = Arc::clone(self);
        tokio::task::spawn_blocking(move || log.append(&entry))
            .await
            .context("audit writer task failed")?
    }

    /// Read every entry in append order. A missing file is an empty log.
    pub fn entries(&self) -> Result<Vec<AuditEntry>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read audit log {}", self.path.display()));
            }
        };

        let mut entries = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => log::warn!("Skipping malformed audit line {}: {}", idx + 1, e),
            }
        }
        Ok(entries)
    }

    /// Count outcomes and return the last `recent_limit` entries.
    pub fn summary(&self, recent_limit: usize) -> Result<AnalyticsSummary> {
        let entries = self.entries()?;
        let total_verified = entries
            .iter()
            .filter(|e| e.status == AuditStatus::Verified)
            .count();
        let total_removed = entries
            .iter()
            .filter(|e| e.status == AuditStatus::Removed)
            .count();
        let skip = entries.len().saturating_sub(recent_limit);
        let recent = entries.into_iter().skip(skip).collect();
        Ok(AnalyticsSummary {
            total_verified,
            total_removed,
            recent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::tempdir;

    #[test]
    fn test_line_format_matches_log_schema() {
        let temp_dir = tempdir().unwrap();
        let log = AuditLog::new(temp_dir.path().join("analytics.json"));

        log.append(&AuditEntry::verified(42, "alice", 3, "Wxyz")).unwrap();
        log.append(&AuditEntry::removed(43, "bob", AuditReason::Timeout, None)).unwrap();

        let raw = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<Value> = raw.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);

        assert_eq!(lines[0]["status"], "verified");
        assert_eq!(lines[0]["reason"], "nft_verified");
        assert_eq!(lines[0]["nft_count"], 3);
        assert_eq!(lines[0]["wallet_address"], "Wxyz");
        assert!(lines[0]["timestamp"].as_f64().unwrap() > 1_600_000_000.0);

        assert_eq!(lines[1]["status"], "removed");
        assert_eq!(lines[1]["reason"], "timeout");
        assert!(lines[1].get("nft_count").is_none());
        assert!(lines[1].get("wallet_address").is_none());
    }

    #[test]
    fn test_summary_counts_and_recent_window() {
        let temp_dir = tempdir().unwrap();
        let log = AuditLog::new(temp_dir.path().join("analytics.json"));

        for i in 0..7 {
            log.append(&AuditEntry::verified(i, &format!("v{}", i), 1, "W")).unwrap();
        }
        for i in 0..5 {
            log.append(&AuditEntry::removed(100 + i, &format!("r{}", i), AuditReason::NoNft, Some("W")))
                .unwrap();
        }

        let summary = log.summary(RECENT_LIMIT).unwrap();
        assert_eq!(summary.total_verified, 7);
        assert_eq!(summary.total_removed, 5);
        assert_eq!(summary.recent.len(), 10);
        assert_eq!(summary.recent.first().unwrap().username, "v2");
        assert_eq!(summary.recent.last().unwrap().username, "r4");
    }

    #[test]
    fn test_summary_of_short_log_returns_everything() {
        let temp_dir = tempdir().unwrap();
        let log = AuditLog::new(temp_dir.path().join("analytics.json"));
        log.append(&AuditEntry::removed(1, "a", AuditReason::Timeout, None)).unwrap();
        log.append(&AuditEntry::verified(2, "b", 1, "W")).unwrap();

        let summary = log.summary(RECENT_LIMIT).unwrap();
        let names: Vec<_> = summary.recent.iter().map(|e| e.username.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_record_from_async_context() {
        let temp_dir = tempdir().unwrap();
        let log = Arc::new(AuditLog::new(temp_dir.path().join("analytics.json")));

        log.record(AuditEntry::verified(42, "alice", 3, "Wxyz")).await.unwrap();
        log.record(AuditEntry::removed(7, "bob", AuditReason::NoNft, Some("W"))).await.unwrap();

        let entries = log.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].reason, AuditReason::NoNft);

        let broken = Arc::new(AuditLog::new(temp_dir.path()));
        assert!(broken.record(AuditEntry::verified(1, "a", 1, "W")).await.is_err());
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp_dir = tempdir().unwrap();
        let log = AuditLog::new(temp_dir.path().join("absent.json"));
        assert_eq!(log.summary(RECENT_LIMIT).unwrap(), AnalyticsSummary::default());
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("analytics.json");
        fs::write(
            &path,
            "{\"timestamp\":1.5,\"user_id\":1,\"username\":\"a\",\"status\":\"verified\",\"reason\":\"nft_verified\"}\nnot json\n\n",
        )
        .unwrap();

        let log = AuditLog::new(&path);
        let entries = log.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].nft_count, None);
    }
}
