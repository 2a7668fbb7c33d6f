//! Phases of a publish or unpublish run
//!
//! The phase set is closed. `Done` and `Failed` are terminal; `Failed` and
//! `RollingBack` can be entered from any non-terminal phase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage of the publishing state machine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Idle,
    Fetching,
    Validating,
    Packaging,
    Uploading,
    Finalizing,
    Done,
    RollingBack,
    Failed,
}

impl Phase {
    /// `Done` and `Failed` end a run
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;

        match (self, next) {
            // A new run starts from a settled slot
            (Idle | Done | Failed, Idle) => true,
            (Idle, Fetching | Validating) => true,
            (Fetching, Validating) => true,
            (Validating, Packaging | Finalizing | Done) => true,
            (Packaging, Uploading) => true,
            (Uploading, Finalizing) => true,
            (Finalizing, Done) => true,
            (RollingBack, Failed) => true,
            (RollingBack, _) => false,
            (from, RollingBack | Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Validating => "validating",
            Self::Packaging => "packaging",
            Self::Uploading => "uploading",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
            Self::RollingBack => "rollingBack",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which phase sequence a run drives
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Publish,
    Unpublish,
}

/// Recorded phase change
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
    pub timestamp: DateTime<Utc>,
}

impl PhaseTransition {
    pub fn new(from: Phase, to: Phase) -> Self {
        Self {
            from,
            to,
            timestamp: Utc::now(),
        }
    }
}

/// Render a transition history as `from → to` lines
pub fn format_history(transitions: &[PhaseTransition]) -> String {
    transitions
        .iter()
        .map(|t| format!("{}: {} → {}", t.timestamp.to_rfc3339(), t.from, t.to))
        .collect::<Vec<_>>()
        .join("\n")
}
