//! Course record as owned by the course repository

use crate::security::SourceCredentials;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Health of a course's content-source credentials
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceAuthState {
    #[default]
    Healthy,
    Degraded,
    Unreachable,
}

/// Opaque reference to a stored artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactLocation(String);

impl ArtifactLocation {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Summary of one successful publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedVersion {
    pub version: u64,
    pub published_at: DateTime<Utc>,
    pub artifact_location: ArtifactLocation,
}

/// The publishable unit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub app_name: String,

    /// 0 means never published
    #[serde(default)]
    pub version: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_location: Option<ArtifactLocation>,

    #[serde(default)]
    pub source_auth_state: SourceAuthState,

    pub credentials: SourceCredentials,

    /// Set by unpublish, cleared by the next successful publish
    #[serde(default)]
    pub withdrawn: bool,

    #[serde(default)]
    pub publish_history: Vec<PublishedVersion>,
}

impl Course {
    pub fn new(app_name: impl Into<String>, credentials: SourceCredentials) -> Self {
        Self {
            app_name: app_name.into(),
            version: 0,
            published_at: None,
            artifact_location: None,
            source_auth_state: SourceAuthState::Healthy,
            credentials,
            withdrawn: false,
            publish_history: Vec::new(),
        }
    }

    pub fn is_published(&self) -> bool {
        self.published_at.is_some() && !self.withdrawn
    }

    /// Version the next successful publish produces
    pub fn next_version(&self) -> u64 {
        self.version + 1
    }

    /// Copy of this record advanced to `version`
    ///
    /// Version, timestamp and location move together; the summary is appended
    /// to the history in the same step.
    pub fn published_as(
        &self,
        version: u64,
        published_at: DateTime<Utc>,
        location: ArtifactLocation,
    ) -> Self {
        let mut next = self.clone();
        next.version = version;
        next.published_at = Some(published_at);
        next.artifact_location = Some(location.clone());
        next.withdrawn = false;
        next.publish_history.push(PublishedVersion {
            version,
            published_at,
            artifact_location: location,
        });
        next
    }

    /// Copy of this record marked as withdrawn
    ///
    /// Keeps `version`, the last artifact location and the history.
    pub fn withdrawn(&self) -> Self {
        let mut next = self.clone();
        next.published_at = None;
        next.withdrawn = true;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course() -> Course {
        Course::new("biology101", SourceCredentials::new(None, "token-abcdefgh"))
    }

    #[test]
    fn test_new_course_is_unpublished() {
        let course = course();
        assert_eq!(course.version, 0);
        assert!(!course.is_published());
        assert_eq!(course.next_version(), 1);
        assert_eq!(course.source_auth_state, SourceAuthState::Healthy);
    }

    #[test]
    fn test_published_as_moves_fields_together() {
        let now = Utc::now();
        let location = ArtifactLocation::new("mem://biology101/v1.json");
        let published = course().published_as(1, now, location.clone());

        assert_eq!(published.version, 1);
        assert_eq!(published.published_at, Some(now));
        assert_eq!(published.artifact_location, Some(location.clone()));
        assert_eq!(published.publish_history.len(), 1);
        assert_eq!(published.publish_history[0].artifact_location, location);
        assert!(published.is_published());
    }

    #[test]
    fn test_withdrawn_keeps_version_and_history() {
        let published = course().published_as(
            3,
            Utc::now(),
            ArtifactLocation::new("mem://biology101/v3.json"),
        );
        let withdrawn = published.withdrawn();

        assert_eq!(withdrawn.version, 3);
        assert!(withdrawn.published_at.is_none());
        assert!(withdrawn.artifact_location.is_some());
        assert!(withdrawn.withdrawn);
        assert_eq!(withdrawn.publish_history.len(), 1);
        assert!(!withdrawn.is_published());
    }

    #[test]
    fn test_course_json_shape() {
        let json = serde_json::to_value(course()).unwrap();
        assert_eq!(json["appName"], "biology101");
        assert_eq!(json["sourceAuthState"], "healthy");
        assert!(json.get("publishedAt").is_none());

        let restored: Course = serde_json::from_value(json).unwrap();
        assert_eq!(restored.app_name, "biology101");
    }
}
