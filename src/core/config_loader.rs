//! Configuration file loader for course-publisher
//!
//! Priority (high to low):
//! 1. Environment overrides (`COURSE_PUBLISHER_*`)
//! 2. Configuration file (`--config` path or `./course-publisher.yaml`)
//! 3. Default values

use super::config::PublisherConfig;
use crate::core::error::PublishError;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::fs;
use tracing::debug;

/// Configuration file name looked up in the working directory
pub const CONFIG_FILENAME: &str = "course-publisher.yaml";

/// `${VAR_NAME}` references inside the configuration file
static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("env var pattern is valid")
});

/// Configuration load options
#[derive(Debug, Clone, Default)]
pub struct ConfigLoadOptions {
    /// Explicit configuration file; a missing explicit file is an error
    pub config_path: Option<PathBuf>,

    /// Directory searched for [`CONFIG_FILENAME`] when no path is given
    pub working_dir: PathBuf,

    /// Environment variables
    pub env: HashMap<String, String>,
}

impl ConfigLoadOptions {
    /// Options reading the real process environment
    pub fn from_process(config_path: Option<PathBuf>) -> Self {
        Self {
            config_path,
            working_dir: PathBuf::from("."),
            env: std::env::vars().collect(),
        }
    }
}

/// Configuration file loader
pub struct ConfigLoader;

impl ConfigLoader {
    pub async fn load(options: ConfigLoadOptions) -> Result<PublisherConfig, PublishError> {
        let mut config = match &options.config_path {
            Some(path) => Self::load_file(path, &options.env).await?.ok_or_else(|| {
                PublishError::Config(format!("config file not found: {}", path.display()))
            })?,
            None => {
                let path = options.working_dir.join(CONFIG_FILENAME);
                Self::load_file(&path, &options.env).await?.unwrap_or_default()
            }
        };

        Self::apply_env_overrides(&mut config, &options.env)?;
        config.validate()?;

        Ok(config)
    }

    /// Parse a YAML file after expanding `${VAR}` references
    async fn load_file(
        path: &Path,
        env: &HashMap<String, String>,
    ) -> Result<Option<PublisherConfig>, PublishError> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            return Ok(None);
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            PublishError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let expanded = Self::expand_env_vars(&content, env)?;

        let config: PublisherConfig = serde_yaml::from_str(&expanded).map_err(|e| {
            PublishError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;

        debug!(path = %path.display(), "loaded configuration file");
        Ok(Some(config))
    }

    /// Replace every `${VAR}` with its value; unknown variables are an error
    fn expand_env_vars(
        content: &str,
        env: &HashMap<String, String>,
    ) -> Result<String, PublishError> {
        let missing: Vec<&str> = ENV_VAR_PATTERN
            .captures_iter(content)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str())
            .filter(|name| !env.contains_key(*name))
            .collect();

        if let Some(name) = missing.first() {
            return Err(PublishError::Config(format!(
                "environment variable {name} referenced in configuration is not set"
            )));
        }

        Ok(ENV_VAR_PATTERN
            .replace_all(content, |caps: &regex::Captures| {
                env.get(&caps[1]).cloned().unwrap_or_default()
            })
            .into_owned())
    }

    fn apply_env_overrides(
        config: &mut PublisherConfig,
        env: &HashMap<String, String>,
    ) -> Result<(), PublishError> {
        if let Some(url) = env.get("COURSE_PUBLISHER_CONTENT_URL") {
            config.content_source.base_url = Some(url.clone());
        }

        if let Some(dir) = env.get("COURSE_PUBLISHER_ARTIFACT_DIR") {
            config.storage.artifact_dir = PathBuf::from(dir);
        }

        if let Some(attempts) = env.get("COURSE_PUBLISHER_FETCH_ATTEMPTS") {
            config.fetch.retry.max_attempts =
                Self::parse_attempts("COURSE_PUBLISHER_FETCH_ATTEMPTS", attempts)?;
        }

        if let Some(attempts) = env.get("COURSE_PUBLISHER_UPLOAD_ATTEMPTS") {
            config.upload.retry.max_attempts =
                Self::parse_attempts("COURSE_PUBLISHER_UPLOAD_ATTEMPTS", attempts)?;
        }

        Ok(())
    }

    fn parse_attempts(name: &str, value: &str) -> Result<u32, PublishError> {
        value
            .trim()
            .parse()
            .map_err(|_| PublishError::Config(format!("{name} must be a positive integer, got {value:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn options(dir: &TempDir, env: &[(&str, &str)]) -> ConfigLoadOptions {
        ConfigLoadOptions {
            config_path: None,
            working_dir: dir.path().to_path_buf(),
            env: env
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_load_defaults_without_file() {
        let temp_dir = TempDir::new().unwrap();

        let config = ConfigLoader::load(options(&temp_dir, &[])).await.unwrap();
        assert_eq!(config, PublisherConfig::default());
    }

    #[tokio::test]
    async fn test_load_project_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(CONFIG_FILENAME),
            "upload:\n  retry:\n    maxAttempts: 7\n    initialDelayMs: 10\n    maxDelayMs: 20\n    backoffMultiplier: 2.0\n",
        )
        .unwrap();

        let config = ConfigLoader::load(options(&temp_dir, &[])).await.unwrap();
        assert_eq!(config.upload.retry.max_attempts, 7);
        assert_eq!(config.upload.retry.max_delay, Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_explicit_missing_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut opts = options(&temp_dir, &[]);
        opts.config_path = Some(temp_dir.path().join("nope.yaml"));

        let error = ConfigLoader::load(opts).await.unwrap_err();
        assert_eq!(error.code(), "CONFIG_ERROR");
    }

    #[tokio::test]
    async fn test_env_var_expansion() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(CONFIG_FILENAME),
            "contentSource:\n  baseUrl: ${CMS_URL}/api\n",
        )
        .unwrap();

        let config = ConfigLoader::load(options(&temp_dir, &[("CMS_URL", "https://cms.test")]))
            .await
            .unwrap();
        assert_eq!(
            config.content_source.base_url.as_deref(),
            Some("https://cms.test/api")
        );
    }

    #[tokio::test]
    async fn test_unset_env_var_is_error() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(CONFIG_FILENAME),
            "contentSource:\n  baseUrl: ${MISSING_URL}\n",
        )
        .unwrap();

        let error = ConfigLoader::load(options(&temp_dir, &[])).await.unwrap_err();
        assert!(error.to_string().contains("MISSING_URL"));
    }

    #[tokio::test]
    async fn test_env_overrides_win_over_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(CONFIG_FILENAME),
            "contentSource:\n  baseUrl: https://from-file\n",
        )
        .unwrap();

        let config = ConfigLoader::load(options(
            &temp_dir,
            &[
                ("COURSE_PUBLISHER_CONTENT_URL", "https://from-env"),
                ("COURSE_PUBLISHER_FETCH_ATTEMPTS", "6"),
            ],
        ))
        .await
        .unwrap();

        assert_eq!(config.content_source.base_url.as_deref(), Some("https://from-env"));
        assert_eq!(config.fetch.retry.max_attempts, 6);
    }

    #[tokio::test]
    async fn test_invalid_override_is_rejected() {
        let temp_dir = TempDir::new().unwrap();

        let bad = ConfigLoader::load(options(&temp_dir, &[("COURSE_PUBLISHER_UPLOAD_ATTEMPTS", "many")])).await;
        assert!(bad.is_err());

        let zero = ConfigLoader::load(options(&temp_dir, &[("COURSE_PUBLISHER_UPLOAD_ATTEMPTS", "0")])).await;
        assert!(zero.is_err());
    }
}
