//! Configuration structures for course-publisher
//!
//! Every retry count, backoff and phase budget the pipeline uses is a
//! field here with a default, so deployments tune them without code
//! changes.

use crate::core::error::PublishError;
use crate::core::retry::{RetryOptions, millis};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PublisherConfig {
    #[serde(deserialize_with = "fetch_retry")]
    pub fetch: PhaseRetryConfig,
    #[serde(deserialize_with = "upload_retry")]
    pub upload: PhaseRetryConfig,
    #[serde(deserialize_with = "unpublish_retry")]
    pub unpublish: PhaseRetryConfig,
    pub timeouts_ms: PhaseTimeouts,
    pub storage: StorageConfig,
    pub content_source: ContentSourceConfig,
    pub rules: RulesConfig,
}

/// Retry settings for one phase
///
/// Deserialized as an override: fields missing from the file keep the
/// defaults of the phase they belong to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseRetryConfig {
    pub retry: RetryOptions,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PhaseRetryOverride {
    retry: RetryOverride,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RetryOverride {
    max_attempts: Option<u32>,
    initial_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    backoff_multiplier: Option<f64>,
}

impl PhaseRetryOverride {
    fn apply(self, base: PhaseRetryConfig) -> PhaseRetryConfig {
        let RetryOverride {
            max_attempts,
            initial_delay_ms,
            max_delay_ms,
            backoff_multiplier,
        } = self.retry;
        let base = base.retry;

        PhaseRetryConfig {
            retry: RetryOptions {
                max_attempts: max_attempts.unwrap_or(base.max_attempts),
                initial_delay: initial_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(base.initial_delay),
                max_delay: max_delay_ms.map(Duration::from_millis).unwrap_or(base.max_delay),
                backoff_multiplier: backoff_multiplier.unwrap_or(base.backoff_multiplier),
            },
        }
    }
}

fn fetch_retry<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PhaseRetryConfig, D::Error> {
    Ok(PhaseRetryOverride::deserialize(deserializer)?.apply(PhaseRetryConfig::fetch_default()))
}

fn upload_retry<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PhaseRetryConfig, D::Error> {
    Ok(PhaseRetryOverride::deserialize(deserializer)?.apply(PhaseRetryConfig::upload_default()))
}

fn unpublish_retry<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<PhaseRetryConfig, D::Error> {
    Ok(PhaseRetryOverride::deserialize(deserializer)?
        .apply(PhaseRetryConfig::unpublish_default()))
}

/// Per-attempt budgets for phases that perform I/O
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhaseTimeouts {
    #[serde(with = "millis")]
    pub fetch: Duration,
    #[serde(with = "millis")]
    pub upload: Duration,
    #[serde(with = "millis")]
    pub finalize: Duration,
    #[serde(with = "millis")]
    pub rollback: Duration,
}

impl Default for PhaseTimeouts {
    fn default() -> Self {
        Self {
            fetch: Duration::from_secs(30),
            upload: Duration::from_secs(60),
            finalize: Duration::from_secs(15),
            rollback: Duration::from_secs(15),
        }
    }
}

/// Where the file-backed adapters keep their data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    pub artifact_dir: PathBuf,
    pub courses_file: PathBuf,
    pub audit_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from(".course-publisher/artifacts"),
            courses_file: PathBuf::from(".course-publisher/courses.json"),
            audit_file: PathBuf::from(".course-publisher/audit.jsonl"),
        }
    }
}

/// Headless content source endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentSourceConfig {
    /// Base URL; courses are fetched from `{baseUrl}/courses/{appName}`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Scheduled rule-testing invocation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RulesConfig {
    pub max_concurrency: usize,
    pub recipients: Vec<String>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            recipients: Vec::new(),
        }
    }
}

impl PhaseRetryConfig {
    pub fn fetch_default() -> Self {
        Self {
            retry: RetryOptions::new(3, Duration::from_millis(500), Duration::from_secs(5)),
        }
    }

    pub fn upload_default() -> Self {
        Self {
            retry: RetryOptions::new(3, Duration::from_secs(1), Duration::from_secs(10)),
        }
    }

    pub fn unpublish_default() -> Self {
        Self {
            retry: RetryOptions::new(3, Duration::from_millis(200), Duration::from_secs(2)),
        }
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            fetch: PhaseRetryConfig::fetch_default(),
            upload: PhaseRetryConfig::upload_default(),
            unpublish: PhaseRetryConfig::unpublish_default(),
            timeouts_ms: PhaseTimeouts::default(),
            storage: StorageConfig::default(),
            content_source: ContentSourceConfig::default(),
            rules: RulesConfig::default(),
        }
    }
}

impl PublisherConfig {
    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), PublishError> {
        for (name, phase) in [
            ("fetch", &self.fetch),
            ("upload", &self.upload),
            ("unpublish", &self.unpublish),
        ] {
            let retry = &phase.retry;
            if retry.max_attempts == 0 {
                return Err(PublishError::Config(format!(
                    "{name}.retry.maxAttempts must be at least 1"
                )));
            }
            if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
                return Err(PublishError::Config(format!(
                    "{name}.retry.backoffMultiplier must be a finite number of at least 1.0"
                )));
            }
            if retry.max_delay < retry.initial_delay {
                return Err(PublishError::Config(format!(
                    "{name}.retry.maxDelayMs must not be below initialDelayMs"
                )));
            }
        }

        for (name, budget) in [
            ("fetch", self.timeouts_ms.fetch),
            ("upload", self.timeouts_ms.upload),
            ("finalize", self.timeouts_ms.finalize),
            ("rollback", self.timeouts_ms.rollback),
        ] {
            if budget.is_zero() {
                return Err(PublishError::Config(format!("timeoutsMs.{name} must be positive")));
            }
        }

        if self.rules.max_concurrency == 0 {
            return Err(PublishError::Config(
                "rules.maxConcurrency must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
