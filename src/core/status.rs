//! Outcome and progress value types
//!
//! [`PublishResult`] describes one finished run, [`PublisherStatus`] is the
//! live snapshot the watcher keeps per course, and [`PublishOutcome`] is
//! what the facade hands back to callers.

use crate::core::error::ErrorDescriptor;
use crate::core::phase::{Phase, RunMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResult {
    pub app_name: String,
    pub mode: RunMode,
    pub succeeded: bool,
    /// Version produced, or attempted when the run failed
    pub version: u64,
    pub warnings: Vec<String>,
    pub errors: Vec<ErrorDescriptor>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PublishResult {
    /// Failed result for a run that never reached the pipeline
    pub fn rejected(
        app_name: impl Into<String>,
        mode: RunMode,
        version: u64,
        error: ErrorDescriptor,
    ) -> Self {
        let now = Utc::now();
        Self {
            app_name: app_name.into(),
            mode,
            succeeded: false,
            version,
            warnings: Vec::new(),
            errors: vec![error],
            started_at: now,
            finished_at: now,
        }
    }

    /// Phase the run settled in
    pub fn terminal_phase(&self) -> Phase {
        if self.succeeded { Phase::Done } else { Phase::Failed }
    }

    pub fn has_error(&self, code: &str) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }

    /// Duration in milliseconds
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Live snapshot of a course's publishing state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherStatus {
    pub app_name: String,
    pub phase: Phase,
    pub last_result: Option<PublishResult>,
    pub updated_at: DateTime<Utc>,
}

impl PublisherStatus {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            phase: Phase::Idle,
            last_result: None,
            updated_at: Utc::now(),
        }
    }
}

/// What a publish or unpublish request returns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum PublishOutcome {
    /// The request ran a pipeline to completion
    Completed { result: PublishResult },
    /// Another run holds the course; nothing was started
    Busy { status: PublisherStatus },
}

impl PublishOutcome {
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Completed { result } if result.succeeded)
    }

    pub fn result(&self) -> Option<&PublishResult> {
        match self {
            Self::Completed { result } => Some(result),
            Self::Busy { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::PublishError;

    #[test]
    fn test_rejected_result() {
        let error = PublishError::NotFound {
            app_name: "ghost".to_string(),
        };
        let result = PublishResult::rejected("ghost", RunMode::Publish, 0, error.describe(Phase::Idle));

        assert!(!result.succeeded);
        assert_eq!(result.terminal_phase(), Phase::Failed);
        assert!(result.has_error("NOT_FOUND"));
        assert_eq!(result.duration_ms(), 0);
    }

    #[test]
    fn test_new_status_is_idle() {
        let status = PublisherStatus::new("biology101");
        assert_eq!(status.phase, Phase::Idle);
        assert!(status.last_result.is_none());
    }

    #[test]
    fn test_outcome_serialization_is_tagged() {
        let busy = PublishOutcome::Busy {
            status: PublisherStatus::new("biology101"),
        };
        assert!(busy.is_busy());
        assert!(!busy.succeeded());
        assert!(busy.result().is_none());

        let json = serde_json::to_value(&busy).unwrap();
        assert_eq!(json["outcome"], "busy");
        assert_eq!(json["status"]["phase"], "idle");
        assert!(json["status"]["lastResult"].is_null());
    }
}
