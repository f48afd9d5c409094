//! Client configuration
//!
//! Defaults target a local ksqlDB server. `from_env` overlays values from
//! `KSQLDB_URL`, `KSQLDB_USERNAME`, `KSQLDB_PASSWORD` and `KSQLDB_CONNECT_TIMEOUT_MS`.

use crate::error::{KsqlError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

pub const ENV_URL: &str = "KSQLDB_URL";
pub const ENV_USERNAME: &str = "KSQLDB_USERNAME";
pub const ENV_PASSWORD: &str = "KSQLDB_PASSWORD";
pub const ENV_CONNECT_TIMEOUT_MS: &str = "KSQLDB_CONNECT_TIMEOUT_MS";

/// ksqlDB client configuration
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Basic auth user name
    #[serde(default)]
    pub username: Option<String>,
    /// Basic auth password
    #[serde(default)]
    pub password: Option<String>,
    /// Connect timeout (milliseconds). Push queries have no overall timeout.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Speak HTTP/2 without upgrade negotiation
    #[serde(default)]
    pub http2_prior_knowledge: bool,
}

fn default_base_url() -> String {
    "http://localhost:8088".to_string()
}

fn default_connect_timeout() -> u64 {
    30000
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &redacted(self.password.as_deref()))
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("http2_prior_knowledge", &self.http2_prior_knowledge)
            .finish()
    }
}

/// Debug stand-in for a secret
pub(crate) fn redacted(secret: Option<&str>) -> Option<&'static str> {
    secret.map(|_| "<redacted>")
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            username: None,
            password: None,
            connect_timeout_ms: default_connect_timeout(),
            http2_prior_knowledge: false,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Defaults overlaid with the `KSQLDB_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var(ENV_URL) {
            config.base_url = url;
        }
        if let Ok(username) = std::env::var(ENV_USERNAME) {
            config.username = Some(username);
        }
        if let Ok(password) = std::env::var(ENV_PASSWORD) {
            config.password = Some(password);
        }
        if let Ok(timeout) = std::env::var(ENV_CONNECT_TIMEOUT_MS) {
            config.connect_timeout_ms = timeout.trim().parse().map_err(|_| {
                KsqlError::Config(format!(
                    "{} must be a number of milliseconds, got {:?}",
                    ENV_CONNECT_TIMEOUT_MS, timeout
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_http2_prior_knowledge(mut self, enabled: bool) -> Self {
        self.http2_prior_knowledge = enabled;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Parsed base URL. Only `http` and `https` are accepted.
    pub fn url(&self) -> Result<Url> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            KsqlError::Config(format!("invalid base url {:?}: {}", self.base_url, e))
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(KsqlError::Config(format!(
                "unsupported url scheme {:?} in {:?}",
                other, self.base_url
            ))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.url()?;
        if self.password.is_some() && self.username.is_none() {
            return Err(KsqlError::Config("password given without a username".to_string()));
        }
        Ok(())
    }
}
