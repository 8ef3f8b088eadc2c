use std::env::VarError;
use std::fmt;

use secrecy::SecretString;

pub const API_KEY_ENV: &str = "AIRTABLE_API_KEY";
pub const PERSONAL_TOKEN_ENV: &str = "AIRTABLE_PERSONAL_TOKEN";
pub const CACHE_TOKEN_ENV: &str = "AIRTABLE_CACHE_TOKEN";

/// Airtable secrets.
///
/// Locally read from `.env` via dotenvy, otherwise from the process
/// environment. Each secret is optional here; clients reject calls that need
/// a missing one.
#[derive(Clone, Default)]
pub struct Credentials {
    /// Records API key.
    pub api_key: Option<SecretString>,
    /// Personal access token, needed by the webhooks API.
    pub personal_token: Option<SecretString>,
    /// Enables reads through the cache proxy.
    pub cache_token: Option<SecretString>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field(
                "personal_token",
                &self.personal_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "cache_token",
                &self.cache_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(SecretString::from(api_key.into())),
            ..Self::default()
        }
    }

    pub fn with_personal_token(mut self, token: impl Into<String>) -> Self {
        self.personal_token = Some(SecretString::from(token.into()));
        self
    }

    pub fn with_cache_token(mut self, token: impl Into<String>) -> Self {
        self.cache_token = Some(SecretString::from(token.into()));
        self
    }

    /// Load credentials from the environment. Empty values count as unset.
    pub fn from_env() -> Result<Self, CredentialsError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => tracing::debug!("no .env file"),
            Err(e) => return Err(CredentialsError::DotEnv { source: e }),
        }

        let credentials = Self {
            api_key: optional_env(API_KEY_ENV)?,
            personal_token: optional_env(PERSONAL_TOKEN_ENV)?,
            cache_token: optional_env(CACHE_TOKEN_ENV)?,
        };

        tracing::debug!(
            api_key = credentials.api_key.is_some(),
            personal_token = credentials.personal_token.is_some(),
            cache_token = credentials.cache_token.is_some(),
            "credentials loaded",
        );
        Ok(credentials)
    }
}

fn optional_env(key: &str) -> Result<Option<SecretString>, CredentialsError> {
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(SecretString::from(value))),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(CredentialsError::NotUnicode(key.to_owned())),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("failed to read .env file")]
    DotEnv { source: dotenvy::Error },

    #[error("environment variable {0} is not valid UTF-8")]
    NotUnicode(String),
}
