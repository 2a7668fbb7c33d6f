//! Error handling for course publishing
//!
//! Two layers of errors live here. [`AdapterError`] is what external
//! collaborators (content source, artifact store, repository, audit log)
//! report. [`PublishError`] is the closed taxonomy a pipeline run can end
//! with; it is always converted into an [`ErrorDescriptor`] before leaving
//! the facade.

use crate::core::phase::Phase;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors whose transient variants may be retried by [`crate::core::RetryManager`]
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Failure reported by an external collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("permanent failure: {0}")]
    Permanent(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl Retryable for AdapterError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }
}

impl From<std::io::Error> for AdapterError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(error.to_string()),
            std::io::ErrorKind::InvalidData | std::io::ErrorKind::InvalidInput => {
                Self::Permanent(error.to_string())
            }
            _ => Self::Transient(error.to_string()),
        }
    }
}

/// Main error type for a publish or unpublish run
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PublishError {
    #[error("[{app_name}] content source unavailable after {attempts} attempt(s): {message}")]
    SourceUnavailable {
        app_name: String,
        attempts: u32,
        message: String,
    },

    #[error("[{app_name}] content validation failed: {}", .issues.join("; "))]
    ValidationFailed {
        app_name: String,
        issues: Vec<String>,
    },

    #[error("[{app_name}] packaging failed: {message}")]
    PackagingFailed { app_name: String, message: String },

    #[error("[{app_name}] artifact upload failed after {attempts} attempt(s): {message}")]
    UploadFailed {
        app_name: String,
        attempts: u32,
        message: String,
    },

    #[error("[{app_name}] finalize failed: {message}")]
    FinalizeFailed {
        app_name: String,
        message: String,
        /// Artifact written by this run that the course record does not reference
        orphaned_artifact: Option<String>,
    },

    #[error("[{app_name}] could not remove artifact {location}: {message}")]
    RollbackFailed {
        app_name: String,
        location: String,
        message: String,
    },

    #[error("[{app_name}] run cancelled before {phase}")]
    Cancelled { app_name: String, phase: Phase },

    #[error("[{app_name}] course not found")]
    NotFound { app_name: String },

    #[error("[{app_name}] course repository unavailable: {message}")]
    RepositoryUnavailable { app_name: String, message: String },

    #[error("[{app_name}] run aborted: {message}")]
    Internal { app_name: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl PublishError {
    /// Get the course key associated with this error, if any
    pub fn app_name(&self) -> Option<&str> {
        match self {
            Self::SourceUnavailable { app_name, .. }
            | Self::ValidationFailed { app_name, .. }
            | Self::PackagingFailed { app_name, .. }
            | Self::UploadFailed { app_name, .. }
            | Self::FinalizeFailed { app_name, .. }
            | Self::RollbackFailed { app_name, .. }
            | Self::Cancelled { app_name, .. }
            | Self::NotFound { app_name }
            | Self::RepositoryUnavailable { app_name, .. }
            | Self::Internal { app_name, .. } => Some(app_name),
            Self::Config(_) => None,
        }
    }

    /// Get suggested actions for this error
    pub fn suggested_actions(&self) -> Vec<&'static str> {
        match self {
            Self::SourceUnavailable { .. } => vec![
                "Check the content source status",
                "Verify the course's source credentials",
            ],
            Self::ValidationFailed { .. } => vec!["Fix the reported content issues and publish again"],
            Self::PackagingFailed { .. } => vec!["Inspect the course content for unserializable fields"],
            Self::UploadFailed { .. } => vec![
                "Check artifact storage availability",
                "Publish again once storage recovers",
            ],
            Self::FinalizeFailed { .. } => vec![
                "The artifact exists but the course record was not updated",
                "Reconcile the course record manually before publishing again",
            ],
            Self::RollbackFailed { .. } => vec!["Remove the listed artifact from storage manually"],
            Self::Cancelled { .. } => vec!["Publish again when ready"],
            Self::NotFound { .. } => vec!["Check the course identifier"],
            Self::RepositoryUnavailable { .. } => vec!["Check the course repository and try again"],
            Self::Internal { .. } => vec!["Inspect the logs for the aborted run and publish again"],
            Self::Config(_) => vec!["Check course-publisher.yaml and environment overrides"],
        }
    }

    /// Get error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "SOURCE_UNAVAILABLE",
            Self::ValidationFailed { .. } => "VALIDATION_FAILED",
            Self::PackagingFailed { .. } => "PACKAGING_FAILED",
            Self::UploadFailed { .. } => "UPLOAD_FAILED",
            Self::FinalizeFailed { .. } => "FINALIZE_FAILED",
            Self::RollbackFailed { .. } => "ROLLBACK_FAILED",
            Self::Cancelled { .. } => "CANCELLED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::RepositoryUnavailable { .. } => "REPOSITORY_UNAVAILABLE",
            Self::Internal { .. } => "INTERNAL",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Convert into the serializable form carried by a run's result
    pub fn describe(&self, phase: Phase) -> ErrorDescriptor {
        ErrorDescriptor {
            code: self.code().to_string(),
            phase,
            message: self.to_string(),
            retryable: self.is_retryable(),
            suggested_actions: self
                .suggested_actions()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

impl Retryable for PublishError {
    /// Whether publishing again (or retrying the phase) can succeed without operator action
    ///
    /// A finalize failure is fatal only when it left an artifact behind that
    /// the course record does not reference.
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. }
                | Self::UploadFailed { .. }
                | Self::Cancelled { .. }
                | Self::RepositoryUnavailable { .. }
                | Self::FinalizeFailed {
                    orphaned_artifact: None,
                    ..
                }
        )
    }
}

/// Structured error carried in a run's result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDescriptor {
    pub code: String,
    pub phase: Phase,
    pub message: String,
    pub retryable: bool,
    /// Operator hints shown next to failed results
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_actions: Vec<String>,
}
