//! Content-source credentials with masked diagnostics
//!
//! Tokens are held in a `SecretString` so they never show up in `Debug`
//! output or logs. They are exposed only when an adapter builds a request
//! and when the course record is written to its store.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::env;

/// Environment variable read by [`SourceCredentials::from_env`] when no name is given
pub const DEFAULT_TOKEN_VAR: &str = "COURSE_SOURCE_TOKEN";

/// Credentials a course uses against the headless content source
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCredentials {
    /// Content space or project identifier on the source side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<String>,

    #[serde(serialize_with = "expose_token", deserialize_with = "wrap_token")]
    token: SecretString,
}

impl SourceCredentials {
    pub fn new(space: Option<String>, token: impl Into<String>) -> Self {
        let token: String = token.into();
        Self {
            space,
            token: SecretString::new(token.into_boxed_str()),
        }
    }

    /// Read the token from an environment variable
    ///
    /// Returns `None` if the variable is unset or empty.
    pub fn from_env(space: Option<String>, var: Option<&str>) -> Option<Self> {
        let value = env::var(var.unwrap_or(DEFAULT_TOKEN_VAR)).ok()?;
        if value.trim().is_empty() {
            return None;
        }
        Some(Self::new(space, value))
    }

    pub fn token(&self) -> &SecretString {
        &self.token
    }

    pub fn has_token(&self) -> bool {
        !self.token.expose_secret().trim().is_empty()
    }

    /// Token rendered safe for display
    pub fn masked(&self) -> String {
        mask_token(self.token.expose_secret())
    }
}

impl Clone for SourceCredentials {
    fn clone(&self) -> Self {
        Self {
            space: self.space.clone(),
            token: SecretString::new(self.token.expose_secret().into()),
        }
    }
}

/// Mask a token, keeping the first and last four characters
///
/// Tokens of eight characters or fewer are fully masked.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}{}", head, "*".repeat(chars.len() - 8), tail)
}

fn expose_token<S: Serializer>(token: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(token.expose_secret())
}

fn wrap_token<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SecretString, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(SecretString::new(raw.into()))
}
