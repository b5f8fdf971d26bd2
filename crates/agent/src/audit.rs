//! Per-turn audit trail
//!
//! One JSON object per turn, appended as a line. Records are written after
//! the turn finishes and are never read back by the service.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use medirag_config::AuditConfig;
use medirag_core::{CompressionStats, IterationRecord, TerminationReason, TokenPlan};

use crate::intent::IntentDecision;
use crate::AgentError;

/// Everything that happened in one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnAuditRecord {
    pub turn_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub query: String,
    /// Retriever routing label
    pub route: String,
    pub intent: IntentDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<TokenPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<CompressionStats>,
    pub iterations: Vec<IterationRecord>,
    pub termination: TerminationReason,
    pub final_query: String,
    pub answer_chars: usize,
}

impl TurnAuditRecord {
    /// Start a record with a fresh id and the current time
    pub fn new(query: impl Into<String>, route: impl Into<String>, intent: IntentDecision) -> Self {
        let query = query.into();
        Self {
            turn_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            final_query: query.clone(),
            query,
            route: route.into(),
            intent,
            plan: None,
            compression: None,
            iterations: Vec::new(),
            termination: TerminationReason::NoRetrieval,
            answer_chars: 0,
        }
    }
}

/// Destination for turn records
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &TurnAuditRecord) -> Result<(), AgentError>;
}

/// Discards every record
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditLog;

impl AuditSink for NoopAuditLog {
    fn record(&self, _record: &TurnAuditRecord) -> Result<(), AgentError> {
        Ok(())
    }
}

/// Appends records to a JSON Lines file
pub struct JsonlAuditLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlAuditLog {
    /// Open (or create) the log, creating parent directories as needed
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .map_err(|e| AgentError::Audit(format!("{}: {}", dir.display(), e)))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| AgentError::Audit(format!("{}: {}", path.display(), e)))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditLog {
    fn record(&self, record: &TurnAuditRecord) -> Result<(), AgentError> {
        let mut line =
            serde_json::to_string(record).map_err(|e| AgentError::Audit(e.to_string()))?;
        line.push('\n');

        // one write per record keeps lines whole across concurrent turns
        let mut file = self.file.lock();
        file.write_all(line.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| AgentError::Audit(format!("{}: {}", self.path.display(), e)))
    }
}

/// Sink for the configured audit settings
pub fn sink_from_settings(config: &AuditConfig) -> Result<Arc<dyn AuditSink>, AgentError> {
    if config.enabled {
        tracing::info!(path = %config.path, "Audit log enabled");
        Ok(Arc::new(JsonlAuditLog::open(&config.path)?))
    } else {
        Ok(Arc::new(NoopAuditLog))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::Complexity;

    fn record(query: &str) -> TurnAuditRecord {
        let mut record = TurnAuditRecord::new(
            query,
            "default",
            IntentDecision {
                needs_retrieval: true,
                k: Some(3),
                complexity: Complexity::Simple,
            },
        );
        record.termination = TerminationReason::QualityAccepted;
        record.answer_chars = 42;
        record
    }

    #[test]
    fn test_appends_one_line_per_turn() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("audit.jsonl");
        let log = JsonlAuditLog::open(&path).unwrap();

        log.record(&record("고혈압 기준")).unwrap();
        log.record(&record("당뇨 식단")).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: TurnAuditRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.query, "고혈압 기준");
        assert_eq!(first.final_query, "고혈압 기준");
        assert_eq!(first.termination, TerminationReason::QualityAccepted);

        let raw: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(raw["intent"]["complexity"], "simple");
        assert_eq!(raw["termination"], "quality_accepted");
        assert!(raw.get("plan").is_none());
    }

    #[test]
    fn test_reopen_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        JsonlAuditLog::open(&path).unwrap().record(&record("a")).unwrap();
        JsonlAuditLog::open(&path).unwrap().record(&record("b")).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_disabled_settings_use_noop() {
        let sink = sink_from_settings(&AuditConfig::default()).unwrap();
        assert!(sink.record(&record("q")).is_ok());
    }
}
