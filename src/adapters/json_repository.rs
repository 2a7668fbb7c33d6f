//! Course repository stored as a single JSON file
//!
//! The file maps course keys to course records. Every save rewrites the
//! whole file through a temp file and a rename, so a reader never sees a
//! half-written record; saves are serialized by an async mutex.

use crate::core::course::Course;
use crate::core::error::AdapterError;
use crate::core::traits::CourseRepository;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

type CourseMap = BTreeMap<String, Course>;

pub struct JsonCourseRepository {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonCourseRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored courses, ordered by key
    pub async fn list(&self) -> Result<Vec<Course>, AdapterError> {
        Ok(self.read_all().await?.into_values().collect())
    }

    async fn read_all(&self) -> Result<CourseMap, AdapterError> {
        let data = match fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(CourseMap::new()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&data).map_err(|e| {
            AdapterError::Permanent(format!("{} is corrupt: {e}", self.path.display()))
        })
    }

    async fn write_all(&self, courses: &CourseMap) -> Result<(), AdapterError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).await?;
        }

        let json = serde_json::to_string_pretty(courses)
            .map_err(|e| AdapterError::Permanent(e.to_string()))?;

        let temp_file = self.path.with_extension("json.tmp");
        fs::write(&temp_file, json).await?;
        fs::rename(&temp_file, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl CourseRepository for JsonCourseRepository {
    async fn load(&self, app_name: &str) -> Result<Course, AdapterError> {
        self.read_all()
            .await?
            .remove(app_name)
            .ok_or_else(|| AdapterError::NotFound(app_name.to_string()))
    }

    async fn save(&self, course: &Course) -> Result<(), AdapterError> {
        let _guard = self.write_lock.lock().await;

        let mut courses = self.read_all().await?;
        courses.insert(course.app_name.clone(), course.clone());
        self.write_all(&courses).await?;

        debug!(app_name = %course.app_name, version = course.version, "course saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::course::ArtifactLocation;
    use crate::security::SourceCredentials;
    use chrono::Utc;
    use secrecy::ExposeSecret;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn course(app_name: &str) -> Course {
        Course::new(app_name, SourceCredentials::new(Some("main".to_string()), "token-abcdefgh"))
    }

    #[tokio::test]
    async fn test_missing_file_means_no_courses() {
        let temp_dir = TempDir::new().unwrap();
        let repository = JsonCourseRepository::new(temp_dir.path().join("courses.json"));

        let err = repository.load("biology101").await.unwrap_err();
        assert!(matches!(err, AdapterError::NotFound(_)));
        assert!(repository.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip_fields() {
        let temp_dir = TempDir::new().unwrap();
        let repository = JsonCourseRepository::new(temp_dir.path().join("data/courses.json"));

        let published = course("biology101").published_as(
            2,
            Utc::now(),
            ArtifactLocation::new("artifacts/biology101/v2.json"),
        );
        repository.save(&published).await.unwrap();

        let loaded = repository.load("biology101").await.unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.artifact_location, published.artifact_location);
        assert_eq!(loaded.credentials.space.as_deref(), Some("main"));
        assert_eq!(loaded.credentials.token().expose_secret(), "token-abcdefgh");
        assert!(!temp_dir.path().join("data/courses.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_concurrent_saves_keep_every_course() {
        let temp_dir = TempDir::new().unwrap();
        let repository = Arc::new(JsonCourseRepository::new(temp_dir.path().join("courses.json")));

        let mut tasks = Vec::new();
        for i in 0..8 {
            let repository = Arc::clone(&repository);
            tasks.push(tokio::spawn(async move {
                repository.save(&course(&format!("course{i}"))).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(repository.list().await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_permanent_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("courses.json");
        std::fs::write(&path, "not json").unwrap();

        let repository = JsonCourseRepository::new(path);
        let err = repository.load("biology101").await.unwrap_err();
        assert!(matches!(err, AdapterError::Permanent(_)));
    }
}
