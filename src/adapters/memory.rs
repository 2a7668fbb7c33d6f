//! In-memory collaborators
//!
//! Used by the test suites and by the CLI when no content source is
//! configured. Each adapter can be scripted to fail, so every failure path
//! of the pipeline can be driven without real I/O.

use crate::core::course::{ArtifactLocation, Course};
use crate::core::error::AdapterError;
use crate::core::traits::{
    ArtifactStore, AuditEntry, AuditLog, ContentSource, CourseRepository, Lesson, Notifier,
    RawContent,
};
use crate::security::SourceCredentials;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Small valid course used by the demo CLI and tests
pub fn sample_content() -> RawContent {
    RawContent {
        title: "Biology 101".to_string(),
        description: Some("Introduction to cells and organisms".to_string()),
        lessons: vec![
            Lesson {
                id: "cells".to_string(),
                title: Some("Cells".to_string()),
                body: "Every organism is made of cells.".to_string(),
            },
            Lesson {
                id: "dna".to_string(),
                title: Some("DNA".to_string()),
                body: "DNA carries genetic information.".to_string(),
            },
        ],
        extra: serde_json::Map::new(),
    }
}

// ============================================================================
// Content source
// ============================================================================

/// Pauses one fetch until the test lets it continue
#[derive(Debug, Default)]
pub struct FetchGate {
    entered: Notify,
    release: Notify,
}

impl FetchGate {
    /// Wait until a fetch is parked at the gate
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the parked fetch continue
    pub fn open(&self) {
        self.release.notify_one();
    }
}

/// Content source returning a fixed payload
pub struct MemoryContentSource {
    content: Mutex<RawContent>,
    failures: Mutex<VecDeque<AdapterError>>,
    stalls: Mutex<VecDeque<Duration>>,
    gate: Mutex<Option<Arc<FetchGate>>>,
    calls: AtomicU32,
}

impl MemoryContentSource {
    pub fn new(content: RawContent) -> Self {
        Self {
            content: Mutex::new(content),
            failures: Mutex::new(VecDeque::new()),
            stalls: Mutex::new(VecDeque::new()),
            gate: Mutex::new(None),
            calls: AtomicU32::new(0),
        }
    }

    pub async fn set_content(&self, content: RawContent) {
        *self.content.lock().await = content;
    }

    /// Make the next `count` fetches fail with `error`
    pub async fn fail_next(&self, count: usize, error: AdapterError) {
        let mut failures = self.failures.lock().await;
        failures.extend(std::iter::repeat_n(error, count));
    }

    /// Make the next `count` fetches take `delay` before answering
    pub async fn stall_next(&self, count: usize, delay: Duration) {
        let mut stalls = self.stalls.lock().await;
        stalls.extend(std::iter::repeat_n(delay, count));
    }

    /// Park the next fetch until [`FetchGate::open`] is called
    pub async fn gate(&self) -> Arc<FetchGate> {
        let gate = Arc::new(FetchGate::default());
        *self.gate.lock().await = Some(Arc::clone(&gate));
        gate
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for MemoryContentSource {
    async fn fetch(
        &self,
        _app_name: &str,
        _credentials: &SourceCredentials,
    ) -> Result<RawContent, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate.lock().await.take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let stall = self.stalls.lock().await.pop_front();
        if let Some(delay) = stall {
            sleep(delay).await;
        }

        if let Some(error) = self.failures.lock().await.pop_front() {
            return Err(error);
        }
        Ok(self.content.lock().await.clone())
    }
}

// ============================================================================
// Artifact store
// ============================================================================

#[derive(Debug, Default)]
struct UploadScript {
    failures: u32,
    /// Failed uploads still leave their bytes behind
    partial: bool,
    cancel: Option<CancellationToken>,
    fail_deletes: bool,
}

/// Artifact store keeping objects in a map under `mem://` locations
#[derive(Default)]
pub struct MemoryArtifactStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    script: Mutex<UploadScript>,
    upload_calls: AtomicU32,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` uploads fail transiently
    pub async fn fail_uploads(&self, count: u32, partial: bool) {
        let mut script = self.script.lock().await;
        script.failures = count;
        script.partial = partial;
    }

    /// Trip `token` while the next upload is in progress
    pub async fn cancel_on_upload(&self, token: CancellationToken) {
        self.script.lock().await.cancel = Some(token);
    }

    pub async fn fail_deletes(&self, fail: bool) {
        self.script.lock().await.fail_deletes = fail;
    }

    pub async fn contains(&self, destination: &str) -> bool {
        self.objects.lock().await.contains_key(destination)
    }

    pub async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn upload_calls(&self) -> u32 {
        self.upload_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn upload(&self, bytes: Vec<u8>, destination: &str) -> Result<ArtifactLocation, AdapterError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);

        let mut script = self.script.lock().await;
        if let Some(token) = script.cancel.take() {
            token.cancel();
        }
        if script.failures > 0 {
            script.failures -= 1;
            if script.partial {
                self.objects
                    .lock()
                    .await
                    .insert(destination.to_string(), bytes);
            }
            return Err(AdapterError::Transient("storage unavailable".to_string()));
        }
        drop(script);

        self.objects
            .lock()
            .await
            .insert(destination.to_string(), bytes);
        Ok(self.locate(destination))
    }

    async fn delete(&self, location: &ArtifactLocation) -> Result<(), AdapterError> {
        if self.script.lock().await.fail_deletes {
            return Err(AdapterError::Transient("storage unavailable".to_string()));
        }
        let key = location
            .as_str()
            .strip_prefix("mem://")
            .unwrap_or(location.as_str());
        self.objects.lock().await.remove(key);
        Ok(())
    }

    fn locate(&self, destination: &str) -> ArtifactLocation {
        ArtifactLocation::new(format!("mem://{destination}"))
    }
}

// ============================================================================
// Course repository
// ============================================================================

/// Course repository backed by a map
#[derive(Default)]
pub struct MemoryCourseRepository {
    courses: Mutex<HashMap<String, Course>>,
    save_failures: Mutex<u32>,
    save_stall: Mutex<Option<Duration>>,
    save_calls: AtomicU32,
}

impl MemoryCourseRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, course: Course) {
        self.courses
            .lock()
            .await
            .insert(course.app_name.clone(), course);
    }

    pub async fn get(&self, app_name: &str) -> Option<Course> {
        self.courses.lock().await.get(app_name).cloned()
    }

    /// Make the next `count` saves fail transiently
    pub async fn fail_saves(&self, count: u32) {
        *self.save_failures.lock().await = count;
    }

    /// Make every save take `delay` before it lands
    pub async fn stall_saves(&self, delay: Duration) {
        *self.save_stall.lock().await = Some(delay);
    }

    pub fn save_calls(&self) -> u32 {
        self.save_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CourseRepository for MemoryCourseRepository {
    async fn load(&self, app_name: &str) -> Result<Course, AdapterError> {
        self.get(app_name)
            .await
            .ok_or_else(|| AdapterError::NotFound(app_name.to_string()))
    }

    async fn save(&self, course: &Course) -> Result<(), AdapterError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);

        let mut failures = self.save_failures.lock().await;
        if *failures > 0 {
            *failures -= 1;
            return Err(AdapterError::Transient("database unavailable".to_string()));
        }
        drop(failures);

        let stall = *self.save_stall.lock().await;
        if let Some(delay) = stall {
            sleep(delay).await;
        }

        self.insert(course.clone()).await;
        Ok(())
    }
}

// ============================================================================
// Audit log and notifier
// ============================================================================

#[derive(Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<(), AdapterError> {
        self.entries.lock().await.push(entry);
        Ok(())
    }
}

/// One summary captured by [`MemoryNotifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentSummary {
    pub recipients: Vec<String>,
    pub log: String,
    pub applied_count: usize,
    pub failed_count: usize,
}

#[derive(Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<SentSummary>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<SentSummary> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send_summary(
        &self,
        recipients: &[String],
        log: &str,
        applied_count: usize,
        failed_count: usize,
    ) -> Result<(), AdapterError> {
        self.sent.lock().await.push(SentSummary {
            recipients: recipients.to_vec(),
            log: log.to_string(),
            applied_count,
            failed_count,
        });
        Ok(())
    }
}
