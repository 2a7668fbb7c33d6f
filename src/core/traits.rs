//! Collaborator interfaces and the values that cross them
//!
//! The pipeline never talks to a concrete content source, storage backend
//! or database. Everything it needs comes through these traits, so the
//! same pipeline runs against the in-memory adapters in tests and the
//! file/HTTP adapters in the binary.

use crate::core::course::{ArtifactLocation, Course};
use crate::core::error::AdapterError;
use crate::security::SourceCredentials;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Content
// ============================================================================

/// One lesson as delivered by the content source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub body: String,
}

/// Raw course content as fetched, before validation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawContent {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
    /// Source-specific fields carried into the artifact manifest untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ============================================================================
// Audit
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Publish,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectType {
    Course,
}

/// One audit log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub action: AuditAction,
    pub subject_type: SubjectType,
    pub subject_id: String,
    pub data: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn course(action: AuditAction, app_name: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            action,
            subject_type: SubjectType::Course,
            subject_id: app_name.into(),
            data,
            recorded_at: Utc::now(),
        }
    }
}

// ============================================================================
// Collaborators
// ============================================================================

/// Headless content system supplying raw course content
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch the current content for a course
    ///
    /// Transient failures are retried by the pipeline; permanent ones
    /// (bad credentials, unknown space) end the fetch immediately.
    async fn fetch(
        &self,
        app_name: &str,
        credentials: &SourceCredentials,
    ) -> Result<RawContent, AdapterError>;
}

/// Durable storage for packaged artifacts
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` under `destination` and return where they landed
    async fn upload(&self, bytes: Vec<u8>, destination: &str) -> Result<ArtifactLocation, AdapterError>;

    /// Remove an artifact; removing a missing artifact succeeds
    async fn delete(&self, location: &ArtifactLocation) -> Result<(), AdapterError>;

    /// Location an upload to `destination` would produce
    ///
    /// Used to clean up after an upload that failed part way through.
    fn locate(&self, destination: &str) -> ArtifactLocation;
}

/// Owner of course records
#[async_trait]
pub trait CourseRepository: Send + Sync {
    /// Load a course; a missing course is `AdapterError::NotFound`
    async fn load(&self, app_name: &str) -> Result<Course, AdapterError>;

    /// Persist every field of `course` in one atomic update
    async fn save(&self, course: &Course) -> Result<(), AdapterError>;
}

/// Record of publish and unpublish actions
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<(), AdapterError>;
}

/// Delivery of rule-run summaries
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_summary(
        &self,
        recipients: &[String],
        log: &str,
        applied_count: usize,
        failed_count: usize,
    ) -> Result<(), AdapterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_content_keeps_extra_fields() {
        let json = r#"{
            "title": "Biology 101",
            "lessons": [{"id": "cells", "body": "Cells are small."}],
            "locale": "en-GB"
        }"#;

        let content: RawContent = serde_json::from_str(json).unwrap();
        assert_eq!(content.title, "Biology 101");
        assert_eq!(content.lessons.len(), 1);
        assert!(content.lessons[0].title.is_none());
        assert_eq!(content.extra["locale"], "en-GB");
    }

    #[test]
    fn test_audit_entry_serialization() {
        let entry = AuditEntry::course(
            AuditAction::Update,
            "biology101",
            serde_json::json!({ "version": 4 }),
        );

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["action"], "update");
        assert_eq!(json["subjectType"], "course");
        assert_eq!(json["subjectId"], "biology101");
        assert_eq!(json["data"]["version"], 4);
    }
}
