//! Rule Runner - scheduled publishing of many courses
//!
//! The rule engine is just another caller of [`Publisher::publish`]. Courses
//! are published in parallel with a concurrency cap; busy and failed courses
//! both count as failed in the summary sent to the notifier.

use crate::core::config::RulesConfig;
use crate::core::status::PublishOutcome;
use crate::core::traits::Notifier;
use crate::orchestration::publisher::Publisher;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Per-course line of a rule run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    Applied { version: u64 },
    Failed { reason: String },
    Busy,
}

/// Rule run summary
#[derive(Debug, Clone, Default)]
pub struct RuleRunSummary {
    pub outcomes: Vec<(String, RuleOutcome)>,
    pub applied_count: usize,
    pub failed_count: usize,
}

impl RuleRunSummary {
    /// Human readable log, one line per course
    pub fn log(&self) -> String {
        let mut lines: Vec<String> = self
            .outcomes
            .iter()
            .map(|(app_name, outcome)| match outcome {
                RuleOutcome::Applied { version } => format!("{app_name}: published v{version}"),
                RuleOutcome::Failed { reason } => format!("{app_name}: failed - {reason}"),
                RuleOutcome::Busy => format!("{app_name}: skipped, another run in progress"),
            })
            .collect();
        lines.push(format!(
            "{} applied, {} failed",
            self.applied_count, self.failed_count
        ));
        lines.join("\n")
    }
}

pub struct RuleRunner {
    publisher: Publisher,
    notifier: Arc<dyn Notifier>,
    config: RulesConfig,
}

impl RuleRunner {
    pub fn new(publisher: Publisher, notifier: Arc<dyn Notifier>, config: RulesConfig) -> Self {
        Self {
            publisher,
            notifier,
            config,
        }
    }

    /// Publish every course in `app_names` and send the summary
    pub async fn run(&self, app_names: Vec<String>) -> RuleRunSummary {
        info!(
            courses = app_names.len(),
            max_concurrency = self.config.max_concurrency,
            "rule run started"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut tasks = Vec::new();

        for app_name in app_names {
            let semaphore = Arc::clone(&semaphore);
            let publisher = self.publisher.clone();
            let task_app_name = app_name.clone();

            let task = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                publisher.publish(&task_app_name).await
            });
            tasks.push((app_name, task));
        }

        let mut summary = RuleRunSummary::default();
        for (app_name, task) in tasks {
            let outcome = match task.await {
                Ok(PublishOutcome::Completed { result }) if result.succeeded => {
                    RuleOutcome::Applied {
                        version: result.version,
                    }
                }
                Ok(PublishOutcome::Completed { result }) => RuleOutcome::Failed {
                    reason: result
                        .errors
                        .first()
                        .map(|e| e.message.clone())
                        .unwrap_or_else(|| "unknown error".to_string()),
                },
                Ok(PublishOutcome::Busy { .. }) => RuleOutcome::Busy,
                Err(e) => RuleOutcome::Failed {
                    reason: format!("task failed: {e}"),
                },
            };

            match outcome {
                RuleOutcome::Applied { .. } => summary.applied_count += 1,
                _ => summary.failed_count += 1,
            }
            summary.outcomes.push((app_name, outcome));
        }

        let log = summary.log();
        if let Err(e) = self
            .notifier
            .send_summary(
                &self.config.recipients,
                &log,
                summary.applied_count,
                summary.failed_count,
            )
            .await
        {
            warn!(error = %e, "rule summary not delivered");
        }

        info!(
            applied = summary.applied_count,
            failed = summary.failed_count,
            "rule run finished"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        MemoryArtifactStore, MemoryAuditLog, MemoryContentSource, MemoryCourseRepository,
        MemoryNotifier, sample_content,
    };
    use crate::core::config::PublisherConfig;
    use crate::core::course::Course;
    use crate::security::SourceCredentials;

    async fn runner(courses: &[&str]) -> (RuleRunner, Arc<MemoryNotifier>) {
        let repository = Arc::new(MemoryCourseRepository::new());
        for app_name in courses {
            repository
                .insert(Course::new(*app_name, SourceCredentials::new(None, "token-abcdefgh")))
                .await;
        }

        let publisher = Publisher::new(
            Arc::new(MemoryContentSource::new(sample_content())),
            Arc::new(MemoryArtifactStore::new()),
            repository,
            Arc::new(MemoryAuditLog::new()),
            &PublisherConfig::default(),
        );
        let notifier = Arc::new(MemoryNotifier::new());
        let config = RulesConfig {
            max_concurrency: 2,
            recipients: vec!["ops@example.com".to_string()],
        };
        (RuleRunner::new(publisher, notifier.clone(), config), notifier)
    }

    #[tokio::test]
    async fn test_rule_run_counts_and_notifies() {
        let (runner, notifier) = runner(&["biology101", "chemistry101", "physics101"]).await;

        let summary = runner
            .run(vec![
                "biology101".to_string(),
                "chemistry101".to_string(),
                "physics101".to_string(),
                "unknown".to_string(),
            ])
            .await;

        assert_eq!(summary.applied_count, 3);
        assert_eq!(summary.failed_count, 1);
        assert_eq!(summary.outcomes[0].1, RuleOutcome::Applied { version: 1 });
        assert!(matches!(summary.outcomes[3].1, RuleOutcome::Failed { .. }));

        let sent = notifier.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipients, vec!["ops@example.com".to_string()]);
        assert_eq!(sent[0].applied_count, 3);
        assert_eq!(sent[0].failed_count, 1);
        assert!(sent[0].log.contains("biology101: published v1"));
        assert!(sent[0].log.contains("unknown: failed"));
    }

    #[test]
    fn test_summary_log_lists_busy_courses() {
        let summary = RuleRunSummary {
            outcomes: vec![("biology101".to_string(), RuleOutcome::Busy)],
            applied_count: 0,
            failed_count: 1,
        };

        let log = summary.log();
        assert!(log.contains("biology101: skipped"));
        assert!(log.ends_with("0 applied, 1 failed"));
    }
}
