//! Content source backed by a headless CMS over HTTP
//!
//! `GET {baseUrl}/courses/{appName}` with the course's bearer token. When
//! the credentials name a content space it is sent as the `space` query
//! parameter.

use crate::core::error::AdapterError;
use crate::core::traits::{ContentSource, RawContent};
use crate::security::SourceCredentials;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use secrecy::ExposeSecret;
use tracing::{debug, warn};

pub struct HttpContentSource {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpContentSource {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("course-publisher/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Self::with_client(client, base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("content source URL cannot carry a path: {base_url}");
        }
        Ok(Self { client, base_url })
    }

    /// `{baseUrl}/courses/{appName}`, with the key escaped as one path segment
    pub fn course_url(&self, app_name: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("courses").push(app_name);
        }
        url
    }
}

/// Map an HTTP status to the retry class of the failure
fn classify_status(status: StatusCode, app_name: &str) -> AdapterError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            AdapterError::Permanent(format!("content source rejected credentials ({status})"))
        }
        StatusCode::NOT_FOUND => AdapterError::NotFound(format!("no content for {app_name}")),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            AdapterError::Transient(format!("content source throttled ({status})"))
        }
        s if s.is_server_error() => {
            AdapterError::Transient(format!("content source unavailable ({status})"))
        }
        _ => AdapterError::Permanent(format!("unexpected response ({status})")),
    }
}

#[async_trait]
impl ContentSource for HttpContentSource {
    async fn fetch(
        &self,
        app_name: &str,
        credentials: &SourceCredentials,
    ) -> Result<RawContent, AdapterError> {
        let url = self.course_url(app_name);
        let mut request = self.client.get(url).header("Accept", "application/json");
        if credentials.has_token() {
            request = request.bearer_auth(credentials.token().expose_secret());
        }
        if let Some(space) = &credentials.space {
            request = request.query(&[("space", space)]);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| AdapterError::Transient(format!("content source request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            warn!(app_name, %status, "content source returned non-success status");
            return Err(classify_status(status, app_name));
        }

        let content: RawContent = resp
            .json()
            .await
            .map_err(|e| AdapterError::Permanent(format!("malformed course payload: {e}")))?;

        debug!(app_name, lessons = content.lessons.len(), "content fetched");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Retryable;

    #[test]
    fn test_course_url_trims_trailing_slash() {
        let source = HttpContentSource::new("https://cms.example.com/api/").unwrap();
        assert_eq!(
            source.course_url("biology101").as_str(),
            "https://cms.example.com/api/courses/biology101"
        );
    }

    #[test]
    fn test_course_key_stays_one_path_segment() {
        let source = HttpContentSource::new("https://cms.example.com/api").unwrap();
        let url = source.course_url("../admin?drop=1#x");

        assert_eq!(url.host_str(), Some("cms.example.com"));
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
        assert_eq!(
            url.path_segments().unwrap().collect::<Vec<_>>(),
            vec!["api", "courses", "..%2Fadmin%3Fdrop=1%23x"]
        );
    }

    #[test]
    fn test_rejects_unusable_base_url() {
        assert!(HttpContentSource::new("not a url").is_err());
        assert!(HttpContentSource::new("mailto:ops@example.com").is_err());
    }

    #[test]
    fn test_auth_failures_are_permanent() {
        assert!(!classify_status(StatusCode::UNAUTHORIZED, "bio").is_retryable());
        assert!(!classify_status(StatusCode::FORBIDDEN, "bio").is_retryable());
        assert!(!classify_status(StatusCode::BAD_REQUEST, "bio").is_retryable());
    }

    #[test]
    fn test_server_errors_are_transient() {
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, "bio").is_retryable());
        assert!(classify_status(StatusCode::BAD_GATEWAY, "bio").is_retryable());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "bio").is_retryable());
    }

    #[test]
    fn test_missing_course_is_not_found() {
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, "bio"),
            AdapterError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_connection_failure_is_transient() {
        // Nothing listens on port 9 of the loopback interface
        let source = HttpContentSource::new("http://127.0.0.1:9").unwrap();
        let credentials = SourceCredentials::new(None, "token-abcdefgh");

        let err = source.fetch("biology101", &credentials).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
