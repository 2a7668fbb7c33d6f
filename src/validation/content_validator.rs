//! Content Validator - structural checks on fetched course content
//!
//! Errors block publishing; warnings are carried into the run's result.
//!
//! # Example
//!
//! ```
//! use course_publisher::core::{Lesson, RawContent};
//! use course_publisher::validation::ContentValidator;
//!
//! let content = RawContent {
//!     title: "Biology 101".to_string(),
//!     lessons: vec![Lesson {
//!         id: "cells".to_string(),
//!         title: Some("Cells".to_string()),
//!         body: "Cells are the unit of life.".to_string(),
//!     }],
//!     ..Default::default()
//! };
//!
//! let report = ContentValidator::new().validate(&content);
//! assert!(report.is_valid);
//! ```

use crate::core::traits::RawContent;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

static LESSON_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]*$").expect("lesson id pattern is valid"));

/// Result of content validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub lesson_count: usize,
}

/// Validator for raw course content
#[derive(Debug, Default, Clone)]
pub struct ContentValidator;

impl ContentValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, content: &RawContent) -> ContentReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if content.title.trim().is_empty() {
            errors.push("title: missing required field".to_string());
        }

        match &content.description {
            Some(description) if !description.trim().is_empty() => {}
            _ => warnings.push("description: missing recommended field".to_string()),
        }

        if content.lessons.is_empty() {
            errors.push("lessons: course has no lessons".to_string());
        }

        let mut seen = HashSet::new();
        for (index, lesson) in content.lessons.iter().enumerate() {
            if !LESSON_ID.is_match(&lesson.id) {
                errors.push(format!(
                    "lessons[{index}].id: {:?} must be lowercase alphanumeric with dashes",
                    lesson.id
                ));
            } else if !seen.insert(lesson.id.as_str()) {
                errors.push(format!("lessons[{index}].id: duplicate id {:?}", lesson.id));
            }

            if lesson.body.trim().is_empty() {
                errors.push(format!("lessons[{index}].body: empty lesson body"));
            }

            if lesson.title.as_deref().is_none_or(|t| t.trim().is_empty()) {
                warnings.push(format!("lessons[{index}].title: missing lesson title"));
            }
        }

        ContentReport {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            lesson_count: content.lessons.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::Lesson;

    fn lesson(id: &str, body: &str) -> Lesson {
        Lesson {
            id: id.to_string(),
            title: Some(format!("Lesson {id}")),
            body: body.to_string(),
        }
    }

    fn content(lessons: Vec<Lesson>) -> RawContent {
        RawContent {
            title: "Biology 101".to_string(),
            description: Some("Intro course".to_string()),
            lessons,
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_content() {
        let report = ContentValidator::new().validate(&content(vec![
            lesson("cells", "Cells."),
            lesson("dna-basics", "DNA."),
        ]));

        assert!(report.is_valid);
        assert!(report.errors.is_empty());
        assert!(report.warnings.is_empty());
        assert_eq!(report.lesson_count, 2);
    }

    #[test]
    fn test_missing_title_and_lessons() {
        let mut raw = content(vec![]);
        raw.title = "   ".to_string();

        let report = ContentValidator::new().validate(&raw);
        assert!(!report.is_valid);
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors[0].starts_with("title"));
        assert!(report.errors[1].starts_with("lessons"));
    }

    #[test]
    fn test_duplicate_and_malformed_ids() {
        let report = ContentValidator::new().validate(&content(vec![
            lesson("cells", "a"),
            lesson("cells", "b"),
            lesson("Bad Id", "c"),
        ]));

        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|e| e.contains("duplicate id")));
        assert!(report.errors.iter().any(|e| e.contains("lowercase alphanumeric")));
    }

    #[test]
    fn test_empty_body_is_error() {
        let report = ContentValidator::new().validate(&content(vec![lesson("cells", " ")]));
        assert!(!report.is_valid);
        assert!(report.errors[0].contains("empty lesson body"));
    }

    #[test]
    fn test_missing_description_and_titles_are_warnings() {
        let mut raw = content(vec![Lesson {
            id: "cells".to_string(),
            title: None,
            body: "Cells.".to_string(),
        }]);
        raw.description = None;

        let report = ContentValidator::new().validate(&raw);
        assert!(report.is_valid);
        assert_eq!(report.warnings.len(), 2);
    }
}
