use std::path::Path;
use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

/// Default per-call budget for backend requests. Generation stages are slow.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Default backend route that executes one video stage
pub const DEFAULT_STAGE_ROUTE: &str = "video";

/// Environment variable holding the backend base URL
pub const BACKEND_URL_ENV: &str = "BOT_URL";

/// Environment variable enabling error detail in proxy responses
pub const DEBUG_PROXY_ENV: &str = "DEBUG_PROXY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid backend URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Failed to read env file: {0}")]
    EnvFile(#[from] dotenvy::Error),
}

impl ConfigError {
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigError::InvalidBaseUrl { .. } => "invalid_base_url",
            ConfigError::EnvFile(_) => "env_file",
        }
    }
}

// ============================================================================
// Pure configuration value (read-only for the lifetime of the process)
// ============================================================================

/// Backend connection settings shared by the proxy and the orchestrator
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL, always ending in `/` so relative joins keep its path
    base_url: Option<Url>,
    /// Expose upstream failure detail in error results
    pub debug: bool,
    /// Per-call timeout for forwarded requests
    pub timeout: Duration,
    /// Backend route for video stage execution
    pub stage_route: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            debug: false,
            timeout: DEFAULT_TIMEOUT,
            stage_route: DEFAULT_STAGE_ROUTE.to_string(),
        }
    }
}

impl BackendConfig {
    /// Build a config from a raw base URL. `None` or an empty string leaves
    /// the backend unconfigured.
    pub fn new(raw_base_url: Option<&str>) -> Result<Self, ConfigError> {
        let base_url = match raw_base_url.map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(parse_base_url(raw)?),
            _ => None,
        };

        Ok(Self {
            base_url,
            ..Self::default()
        })
    }

    /// Config with no backend; every forward fails with `backend_not_configured`
    pub fn unconfigured() -> Self {
        Self::default()
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_stage_route(mut self, route: impl Into<String>) -> Self {
        self.stage_route = route.into();
        self
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }
}

/// Parse and normalize a backend base URL.
///
/// Only absolute `http`/`https` URLs are accepted. Query and fragment are
/// dropped and the path gets a trailing slash, so `Url::join` treats it as a
/// directory instead of replacing its last segment.
pub fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    let mut url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid("scheme must be http or https"));
    }
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(invalid("URL has no host"));
    }

    url.set_query(None);
    url.set_fragment(None);
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

/// Interpret a flag value the way the frontend did (`DEBUG_PROXY=1`)
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

// ============================================================================
// I/O wrappers
// ============================================================================

/// Load a `.env` file into the process environment
pub fn load_env_file(path: &Path) -> Result<(), ConfigError> {
    dotenvy::from_path(path)?;
    Ok(())
}
