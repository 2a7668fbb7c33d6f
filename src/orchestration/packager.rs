//! Packaging of validated content into a deployable artifact

use crate::core::traits::{Lesson, RawContent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Manifest section of a packaged course
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactManifest {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub lesson_count: usize,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Deployable course package as written to the artifact store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseArtifact {
    pub app_name: String,
    pub version: u64,
    pub packaged_at: DateTime<Utc>,
    pub manifest: ArtifactManifest,
    pub lessons: Vec<Lesson>,
}

/// Packaged artifact ready for upload
#[derive(Debug, Clone)]
pub struct PackagedArtifact {
    pub destination: String,
    pub bytes: Vec<u8>,
}

/// Storage key for a course version
pub fn destination_for(app_name: &str, version: u64) -> String {
    format!("{app_name}/v{version}.json")
}

/// Assemble the artifact for `version` from validated content
pub fn package(
    app_name: &str,
    version: u64,
    content: RawContent,
) -> Result<PackagedArtifact, serde_json::Error> {
    let artifact = CourseArtifact {
        app_name: app_name.to_string(),
        version,
        packaged_at: Utc::now(),
        manifest: ArtifactManifest {
            title: content.title,
            description: content.description,
            lesson_count: content.lessons.len(),
            extra: content.extra,
        },
        lessons: content.lessons,
    };

    Ok(PackagedArtifact {
        destination: destination_for(app_name, version),
        bytes: serde_json::to_vec_pretty(&artifact)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_layout() {
        assert_eq!(destination_for("biology101", 4), "biology101/v4.json");
    }

    #[test]
    fn test_package_embeds_version_and_lessons() {
        let mut extra = serde_json::Map::new();
        extra.insert("locale".to_string(), serde_json::json!("en"));
        let content = RawContent {
            title: "Biology 101".to_string(),
            description: None,
            lessons: vec![Lesson {
                id: "cells".to_string(),
                title: None,
                body: "Cells.".to_string(),
            }],
            extra,
        };

        let packaged = package("biology101", 4, content).unwrap();
        assert_eq!(packaged.destination, "biology101/v4.json");

        let artifact: CourseArtifact = serde_json::from_slice(&packaged.bytes).unwrap();
        assert_eq!(artifact.app_name, "biology101");
        assert_eq!(artifact.version, 4);
        assert_eq!(artifact.manifest.lesson_count, 1);
        assert_eq!(artifact.manifest.extra["locale"], "en");
        assert_eq!(artifact.lessons[0].id, "cells");
    }
}
