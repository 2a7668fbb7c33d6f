//! Publish Pipeline - drives one course through its phase sequence
//!
//! Publish: Fetching → Validating → Packaging → Uploading → Finalizing → Done
//! Unpublish: Validating → Finalizing → Done
//!
//! Every phase is entered through `RunContext::enter`, which checks for
//! cancellation and reports the transition to the watcher before any work
//! of the phase starts. The terminal phase is settled by the watcher when
//! the facade releases the run. Finalizing is the only phase that writes
//! the course record.

use crate::core::config::{PhaseTimeouts, PublisherConfig};
use crate::core::course::{ArtifactLocation, Course, SourceAuthState};
use crate::core::error::{AdapterError, ErrorDescriptor, PublishError};
use crate::core::phase::{Phase, RunMode};
use crate::core::retry::{Attempted, RetryManager};
use crate::core::status::PublishResult;
use crate::core::traits::{ArtifactStore, ContentSource, CourseRepository, RawContent};
use crate::orchestration::packager::{self, PackagedArtifact};
use crate::orchestration::watcher::{PublisherWatcher, RunTicket};
use crate::validation::ContentValidator;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Finished run plus what it learned about the content source
#[derive(Debug, Clone)]
pub struct RunReport {
    pub result: PublishResult,
    /// Credential health observed while fetching; `None` if no fetch happened
    pub source_auth_state: Option<SourceAuthState>,
}

/// Phase state machine for publish and unpublish runs
pub struct PublishPipeline {
    source: Arc<dyn ContentSource>,
    store: Arc<dyn ArtifactStore>,
    repository: Arc<dyn CourseRepository>,
    validator: ContentValidator,
    fetch_retry: RetryManager,
    upload_retry: RetryManager,
    unpublish_retry: RetryManager,
    timeouts: PhaseTimeouts,
}

/// Mutable state of one run
struct RunContext<'a> {
    app_name: &'a str,
    watcher: &'a PublisherWatcher,
    ticket: &'a RunTicket,
    phase: Phase,
    warnings: Vec<String>,
    errors: Vec<ErrorDescriptor>,
    /// Artifact this run created or may have partially created
    written: Option<ArtifactLocation>,
    source_auth_state: Option<SourceAuthState>,
    started_at: DateTime<Utc>,
}

impl<'a> RunContext<'a> {
    fn new(app_name: &'a str, watcher: &'a PublisherWatcher, ticket: &'a RunTicket) -> Self {
        Self {
            app_name,
            watcher,
            ticket,
            phase: Phase::Idle,
            warnings: Vec::new(),
            errors: Vec::new(),
            written: None,
            source_auth_state: None,
            started_at: Utc::now(),
        }
    }

    /// Move to `phase` unless the run was cancelled
    fn enter(&mut self, phase: Phase) -> Result<(), PublishError> {
        if self.ticket.cancellation().is_cancelled() {
            return Err(PublishError::Cancelled {
                app_name: self.app_name.to_string(),
                phase,
            });
        }
        self.report(phase);
        Ok(())
    }

    fn report(&mut self, phase: Phase) {
        self.watcher.update(self.app_name, self.ticket, phase);
        self.phase = phase;
        info!(app_name = self.app_name, %phase, "entered phase");
    }

    fn finish(self, mode: RunMode, succeeded: bool, version: u64) -> RunReport {
        RunReport {
            result: PublishResult {
                app_name: self.app_name.to_string(),
                mode,
                succeeded,
                version,
                warnings: self.warnings,
                errors: self.errors,
                started_at: self.started_at,
                finished_at: Utc::now(),
            },
            source_auth_state: self.source_auth_state,
        }
    }
}

impl PublishPipeline {
    pub fn new(
        source: Arc<dyn ContentSource>,
        store: Arc<dyn ArtifactStore>,
        repository: Arc<dyn CourseRepository>,
        config: &PublisherConfig,
    ) -> Self {
        Self {
            source,
            store,
            repository,
            validator: ContentValidator::new(),
            fetch_retry: RetryManager::new(config.fetch.retry.clone()),
            upload_retry: RetryManager::new(config.upload.retry.clone()),
            unpublish_retry: RetryManager::new(config.unpublish.retry.clone()),
            timeouts: config.timeouts_ms.clone(),
        }
    }

    /// Execute one run for `course`
    ///
    /// The caller must hold `ticket` for the course. Failures never escape as
    /// `Err`; they end the run and are listed in the result's errors.
    pub async fn run(
        &self,
        course: Course,
        mode: RunMode,
        watcher: &PublisherWatcher,
        ticket: &RunTicket,
    ) -> RunReport {
        let mut ctx = RunContext::new(&course.app_name, watcher, ticket);

        let (outcome, version) = match mode {
            RunMode::Publish => {
                let version = course.next_version();
                (self.publish(&course, version, &mut ctx).await, version)
            }
            RunMode::Unpublish => (self.unpublish(&course, &mut ctx).await, course.version),
        };

        let succeeded = match outcome {
            Ok(()) => {
                info!(app_name = %course.app_name, ?mode, version, "run succeeded");
                true
            }
            Err(error) => {
                self.fail(&mut ctx, error).await;
                false
            }
        };

        ctx.finish(mode, succeeded, version)
    }

    async fn publish(
        &self,
        course: &Course,
        version: u64,
        ctx: &mut RunContext<'_>,
    ) -> Result<(), PublishError> {
        ctx.enter(Phase::Fetching)?;
        let content = self.fetch(course, ctx).await?;

        ctx.enter(Phase::Validating)?;
        let report = self.validator.validate(&content);
        ctx.warnings.extend(report.warnings);
        if !report.is_valid {
            return Err(PublishError::ValidationFailed {
                app_name: course.app_name.clone(),
                issues: report.errors,
            });
        }

        ctx.enter(Phase::Packaging)?;
        let packaged = packager::package(&course.app_name, version, content).map_err(|e| {
            PublishError::PackagingFailed {
                app_name: course.app_name.clone(),
                message: e.to_string(),
            }
        })?;

        ctx.enter(Phase::Uploading)?;
        let location = self.upload(&course.app_name, packaged, ctx).await?;

        ctx.enter(Phase::Finalizing)?;
        let mut published = course.published_as(version, Utc::now(), location.clone());
        if let Some(state) = ctx.source_auth_state {
            published.source_auth_state = state;
        }

        match with_budget(self.timeouts.finalize, self.repository.save(&published)).await {
            Ok(()) => Ok(()),
            Err(e) => Err(PublishError::FinalizeFailed {
                app_name: course.app_name.clone(),
                message: e.to_string(),
                orphaned_artifact: Some(location.to_string()),
            }),
        }
    }

    async fn unpublish(&self, course: &Course, ctx: &mut RunContext<'_>) -> Result<(), PublishError> {
        ctx.enter(Phase::Validating)?;
        if course.published_at.is_none() {
            ctx.warnings
                .push(format!("{} is not published; nothing to withdraw", course.app_name));
            return Ok(());
        }

        ctx.enter(Phase::Finalizing)?;
        let withdrawn = &course.withdrawn();
        let repository = &self.repository;
        let budget = self.timeouts.finalize;

        self.unpublish_retry
            .retry(move || with_budget(budget, repository.save(withdrawn)))
            .await
            .map(|_| ())
            .map_err(|Attempted { value, attempts }| PublishError::FinalizeFailed {
                app_name: course.app_name.clone(),
                message: format!("{value} (after {attempts} attempt(s))"),
                orphaned_artifact: None,
            })
    }

    async fn fetch(&self, course: &Course, ctx: &mut RunContext<'_>) -> Result<RawContent, PublishError> {
        let source = &self.source;
        let app_name = course.app_name.as_str();
        let credentials = &course.credentials;
        let budget = self.timeouts.fetch;

        let outcome = self
            .fetch_retry
            .retry(move || with_budget(budget, source.fetch(app_name, credentials)))
            .await;

        match outcome {
            Ok(Attempted { value, attempts }) => {
                if attempts > 1 {
                    ctx.warnings
                        .push(format!("content source needed {attempts} attempts"));
                    ctx.source_auth_state = Some(SourceAuthState::Degraded);
                } else {
                    ctx.source_auth_state = Some(SourceAuthState::Healthy);
                }
                Ok(value)
            }
            Err(Attempted { value, attempts }) => {
                ctx.source_auth_state = Some(SourceAuthState::Unreachable);
                Err(PublishError::SourceUnavailable {
                    app_name: app_name.to_string(),
                    attempts,
                    message: value.to_string(),
                })
            }
        }
    }

    async fn upload(
        &self,
        app_name: &str,
        packaged: PackagedArtifact,
        ctx: &mut RunContext<'_>,
    ) -> Result<ArtifactLocation, PublishError> {
        let store = &self.store;
        let destination = packaged.destination.as_str();
        let bytes = &packaged.bytes;
        let budget = self.timeouts.upload;

        let outcome = self
            .upload_retry
            .retry(move || with_budget(budget, store.upload(bytes.clone(), destination)))
            .await;

        match outcome {
            Ok(Attempted { value, attempts }) => {
                if attempts > 1 {
                    ctx.warnings
                        .push(format!("artifact upload needed {attempts} attempts"));
                }
                ctx.written = Some(value.clone());
                Ok(value)
            }
            Err(Attempted { value, attempts }) => {
                ctx.written = Some(self.store.locate(destination));
                Err(PublishError::UploadFailed {
                    app_name: app_name.to_string(),
                    attempts,
                    message: value.to_string(),
                })
            }
        }
    }

    /// Record `failure` and undo the upload when it calls for a rollback
    async fn fail(&self, ctx: &mut RunContext<'_>, failure: PublishError) {
        let failed_in = ctx.phase;
        let rolls_back = matches!(
            failure,
            PublishError::Cancelled { .. } | PublishError::UploadFailed { .. }
        );

        if let PublishError::FinalizeFailed {
            orphaned_artifact: Some(location),
            ..
        } = &failure
        {
            error!(app_name = ctx.app_name, %location, "artifact stored but course record not updated");
        } else {
            warn!(app_name = ctx.app_name, phase = %failed_in, code = failure.code(), "run failed");
        }
        ctx.errors.push(failure.describe(failed_in));

        if !rolls_back {
            return;
        }

        ctx.report(Phase::RollingBack);
        let Some(location) = ctx.written.take() else {
            return;
        };

        match with_budget(self.timeouts.rollback, self.store.delete(&location)).await {
            Ok(()) => info!(app_name = ctx.app_name, %location, "artifact removed"),
            Err(e) => {
                let rollback = PublishError::RollbackFailed {
                    app_name: ctx.app_name.to_string(),
                    location: location.to_string(),
                    message: e.to_string(),
                };
                error!(app_name = ctx.app_name, %location, "rollback failed");
                ctx.errors.push(rollback.describe(Phase::RollingBack));
            }
        }
    }
}

/// Run a collaborator call within `budget`; an elapsed budget is a transient failure
async fn with_budget<T, F>(budget: Duration, call: F) -> Result<T, AdapterError>
where
    F: Future<Output = Result<T, AdapterError>>,
{
    timeout(budget, call)
        .await
        .unwrap_or(Err(AdapterError::Timeout(budget)))
}
