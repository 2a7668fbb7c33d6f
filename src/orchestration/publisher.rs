//! Publisher - entry point for publish and unpublish requests
//!
//! Manages the request lifecycle around a pipeline run:
//! - Course lookup and de-duplication through the watcher
//! - Running the pipeline on its own task so a dropped caller never leaves
//!   a course locked
//! - Persisting source-auth health for failed runs
//! - Releasing the course and writing the audit entry

use crate::core::config::PublisherConfig;
use crate::core::course::{Course, SourceAuthState};
use crate::core::error::{AdapterError, PublishError};
use crate::core::phase::{Phase, PhaseTransition, RunMode};
use crate::core::status::{PublishOutcome, PublishResult, PublisherStatus};
use crate::core::traits::{
    ArtifactStore, AuditAction, AuditEntry, AuditLog, ContentSource, CourseRepository,
};
use crate::orchestration::pipeline::{PublishPipeline, RunReport};
use crate::orchestration::watcher::{Acquisition, PublisherWatcher, RunTicket};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Facade composing the watcher, the pipeline and the record keepers
#[derive(Clone)]
pub struct Publisher {
    watcher: Arc<PublisherWatcher>,
    pipeline: Arc<PublishPipeline>,
    repository: Arc<dyn CourseRepository>,
    audit: Arc<dyn AuditLog>,
}

impl Publisher {
    pub fn new(
        source: Arc<dyn ContentSource>,
        store: Arc<dyn ArtifactStore>,
        repository: Arc<dyn CourseRepository>,
        audit: Arc<dyn AuditLog>,
        config: &PublisherConfig,
    ) -> Self {
        let pipeline = PublishPipeline::new(source, store, Arc::clone(&repository), config);
        Self {
            watcher: Arc::new(PublisherWatcher::new()),
            pipeline: Arc::new(pipeline),
            repository,
            audit,
        }
    }

    /// Publish the current content of `app_name`
    ///
    /// Returns `Busy` with the in-flight status if the course is already
    /// being published or unpublished.
    pub async fn publish(&self, app_name: &str) -> PublishOutcome {
        self.execute(app_name, RunMode::Publish).await
    }

    /// Withdraw `app_name` from the live catalog
    ///
    /// An in-flight publish is asked to cancel and the caller receives
    /// `Busy`; unpublishing again once it has settled succeeds.
    pub async fn unpublish(&self, app_name: &str) -> PublishOutcome {
        self.execute(app_name, RunMode::Unpublish).await
    }

    /// Live status of a course; `None` if it was never run
    pub fn status(&self, app_name: &str) -> Option<PublisherStatus> {
        self.watcher.status(app_name)
    }

    /// Phase transitions of the current or most recent run
    pub fn history(&self, app_name: &str) -> Vec<PhaseTransition> {
        self.watcher.history(app_name)
    }

    async fn execute(&self, app_name: &str, mode: RunMode) -> PublishOutcome {
        if let Err(rejection) = self.load(app_name).await {
            return PublishOutcome::Completed {
                result: PublishResult::rejected(app_name, mode, 0, rejection.describe(Phase::Idle)),
            };
        }

        let ticket = match self.watcher.try_acquire(app_name, mode) {
            Acquisition::Acquired(ticket) => ticket,
            Acquisition::Busy(status) => {
                if mode == RunMode::Unpublish && self.watcher.cancel(app_name, RunMode::Publish) {
                    info!(app_name, "unpublish requested during publish; cancelling the run");
                }
                return PublishOutcome::Busy { status };
            }
        };

        let this = self.clone();
        let owned_name = app_name.to_string();
        let task = tokio::spawn(async move { this.run_acquired(owned_name, mode, ticket).await });

        match task.await {
            Ok(result) => PublishOutcome::Completed { result },
            Err(e) => {
                error!(app_name, error = %e, "publish task did not complete");
                let aborted = PublishError::Internal {
                    app_name: app_name.to_string(),
                    message: e.to_string(),
                };
                PublishOutcome::Completed {
                    result: PublishResult::rejected(app_name, mode, 0, aborted.describe(Phase::Failed)),
                }
            }
        }
    }

    /// Everything after the course was acquired; always releases the ticket
    async fn run_acquired(&self, app_name: String, mode: RunMode, ticket: RunTicket) -> PublishResult {
        let ticket = Arc::new(ticket);

        // Re-read under the lock so the run starts from the latest record
        let course = match self.load(&app_name).await {
            Ok(course) => course,
            Err(rejection) => {
                let result = PublishResult::rejected(&app_name, mode, 0, rejection.describe(Phase::Idle));
                self.watcher.release(&app_name, &ticket, result.clone());
                return result;
            }
        };
        let previous_health = course.source_auth_state;
        let attempted_version = match mode {
            RunMode::Publish => course.next_version(),
            RunMode::Unpublish => course.version,
        };

        let pipeline = Arc::clone(&self.pipeline);
        let watcher = Arc::clone(&self.watcher);
        let run_ticket = Arc::clone(&ticket);
        let run = tokio::spawn(async move { pipeline.run(course, mode, &watcher, &run_ticket).await });

        let report = match run.await {
            Ok(report) => report,
            Err(e) => {
                error!(app_name = %app_name, error = %e, "pipeline task aborted");
                let aborted = PublishError::Internal {
                    app_name: app_name.clone(),
                    message: e.to_string(),
                };
                let phase = self
                    .watcher
                    .status(&app_name)
                    .map(|status| status.phase)
                    .unwrap_or(Phase::Idle);
                RunReport {
                    result: PublishResult::rejected(
                        &app_name,
                        mode,
                        attempted_version,
                        aborted.describe(phase),
                    ),
                    source_auth_state: None,
                }
            }
        };

        if !report.result.succeeded {
            if let Some(health) = report.source_auth_state.filter(|h| *h != previous_health) {
                self.persist_health(&app_name, health).await;
            }
        }

        let status = self.watcher.release(&app_name, &ticket, report.result.clone());
        info!(
            app_name = %app_name,
            ?mode,
            phase = %status.phase,
            version = report.result.version,
            duration_ms = report.result.duration_ms(),
            "run finished"
        );

        self.audit(&report.result, &ticket).await;
        report.result
    }

    async fn load(&self, app_name: &str) -> Result<Course, PublishError> {
        self.repository.load(app_name).await.map_err(|e| match e {
            AdapterError::NotFound(_) => PublishError::NotFound {
                app_name: app_name.to_string(),
            },
            other => PublishError::RepositoryUnavailable {
                app_name: app_name.to_string(),
                message: other.to_string(),
            },
        })
    }

    /// Record credential health observed by a failed run
    async fn persist_health(&self, app_name: &str, health: SourceAuthState) {
        let saved = match self.repository.load(app_name).await {
            Ok(mut course) => {
                course.source_auth_state = health;
                self.repository.save(&course).await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = saved {
            warn!(app_name, ?health, error = %e, "could not record source health");
        }
    }

    async fn audit(&self, result: &PublishResult, ticket: &RunTicket) {
        let action = match result.mode {
            RunMode::Publish => AuditAction::Publish,
            RunMode::Unpublish => AuditAction::Update,
        };
        let codes: Vec<&str> = result.errors.iter().map(|e| e.code.as_str()).collect();
        let data = serde_json::json!({
            "runId": ticket.run_id(),
            "mode": result.mode,
            "version": result.version,
            "succeeded": result.succeeded,
            "errors": codes,
        });

        if let Err(e) = self
            .audit
            .record(AuditEntry::course(action, &result.app_name, data))
            .await
        {
            warn!(app_name = %result.app_name, error = %e, "audit entry not written");
        }
    }
}
