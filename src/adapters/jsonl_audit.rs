//! Append-only audit log, one JSON object per line

use crate::core::error::AdapterError;
use crate::core::traits::{AuditEntry, AuditLog};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Stored form of an audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: Uuid,
    #[serde(flatten)]
    pub entry: AuditEntry,
}

pub struct JsonlAuditLog {
    path: PathBuf,
    append_lock: Mutex<()>,
}

impl JsonlAuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            append_lock: Mutex::new(()),
        }
    }

    /// Read every record back; a missing file is an empty log
    pub async fn records(&self) -> Result<Vec<AuditRecord>, AdapterError> {
        let data = match fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        data.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line)
                    .map_err(|e| AdapterError::Permanent(format!("bad audit line: {e}")))
            })
            .collect()
    }
}

#[async_trait]
impl AuditLog for JsonlAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<(), AdapterError> {
        let record = AuditRecord {
            id: Uuid::new_v4(),
            entry,
        };
        let mut line =
            serde_json::to_string(&record).map_err(|e| AdapterError::Permanent(e.to_string()))?;
        line.push('\n');

        let _guard = self.append_lock.lock().await;
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::AuditAction;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_records_are_appended_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let log = JsonlAuditLog::new(temp_dir.path().join("logs/audit.jsonl"));

        log.record(AuditEntry::course(
            AuditAction::Publish,
            "biology101",
            serde_json::json!({ "version": 4, "succeeded": true }),
        ))
        .await
        .unwrap();
        log.record(AuditEntry::course(
            AuditAction::Update,
            "biology101",
            serde_json::json!({ "version": 4, "succeeded": true }),
        ))
        .await
        .unwrap();

        let records = log.records().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].entry.action, AuditAction::Publish);
        assert_eq!(records[1].entry.action, AuditAction::Update);
        assert_ne!(records[0].id, records[1].id);

        let raw = std::fs::read_to_string(temp_dir.path().join("logs/audit.jsonl")).unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert!(raw.lines().all(|l| l.contains("\"subjectType\":\"course\"")));
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let temp_dir = TempDir::new().unwrap();
        let log = JsonlAuditLog::new(temp_dir.path().join("audit.jsonl"));
        assert!(log.records().await.unwrap().is_empty());
    }
}
