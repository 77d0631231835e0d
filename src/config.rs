//! Configuration types for iq-fetcher
//!
//! Settings come from the process environment (optionally seeded from a
//! `.env` file) and can be overridden from the command line. Everything is
//! validated once, before any request is made.

use crate::error::{Error, Result};
use std::{collections::HashMap, fmt, path::Path, path::PathBuf, str::FromStr, time::Duration};

/// Default location of the `.env` file, relative to the working directory
pub const DEFAULT_ENV_FILE: &str = "config/.env";

/// Run configuration for a single batch fetch
#[derive(Clone)]
pub struct Config {
    /// Base URL of the IQ Server (e.g. "https://iq.example.com")
    pub server_url: String,

    /// Username for HTTP Basic authentication
    pub username: String,

    /// Password for HTTP Basic authentication
    pub password: String,

    /// Restrict the run to a single organization (None = all organizations)
    pub organization_id: Option<String>,

    /// Root directory for fetched reports (default: "raw_reports")
    pub output_dir: PathBuf,

    /// Number of concurrent fetch workers (default: 8)
    pub num_workers: usize,

    /// Timeout applied to every individual HTTP request (default: 30 seconds)
    pub request_timeout: Duration,

    /// Retry policy for transient request failures
    pub retry: RetryConfig,
}

// Hand-written so the password never reaches logs
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("server_url", &self.server_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("organization_id", &self.organization_id)
            .field("output_dir", &self.output_dir)
            .field("num_workers", &self.num_workers)
            .field("request_timeout", &self.request_timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt (default: 3)
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 500 ms)
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 10 seconds)
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Command-line overrides applied on top of environment settings
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Replaces `IQ_SERVER_URL`
    pub server_url: Option<String>,
    /// Replaces `ORGANIZATION_ID`
    pub organization_id: Option<String>,
    /// Replaces `OUTPUT_DIR`
    pub output_dir: Option<PathBuf>,
    /// Replaces `NUM_WORKERS`
    pub num_workers: Option<usize>,
}

impl Config {
    /// Load configuration from `env_file` (if present) and the process environment,
    /// apply command-line overrides and validate.
    ///
    /// Variables already set in the environment take precedence over the file.
    pub fn load(env_file: &Path, overrides: &ConfigOverrides) -> Result<Self> {
        match load_env_file(env_file) {
            Ok(true) => tracing::debug!(path = %env_file.display(), "Loaded environment file"),
            Ok(false) => tracing::debug!(path = %env_file.display(), "No environment file found"),
            Err(e) => tracing::warn!(error = %e, "Skipping environment file"),
        }
        Self::from_env_with(overrides)
    }

    /// Read the process environment, apply `overrides` and validate
    ///
    /// For callers that already seeded the environment with [`load_env_file`].
    pub fn from_env_with(overrides: &ConfigOverrides) -> Result<Self> {
        let mut config = Self::from_env()?;
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Read settings from the process environment without validating them
    ///
    /// Variable names match case-insensitively.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars_os().filter_map(|(key, value)| {
            Some((key.into_string().ok()?, value.into_string().ok()?))
        }))
    }

    /// Read settings from name/value pairs, matching names case-insensitively
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars = fold_keys(vars);
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    /// Read settings through `lookup`, which maps a variable name to its value
    ///
    /// Required settings that are missing and values that fail to parse are
    /// reported as [`Error::Config`] naming the variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required =
            |key: &str| get(key).ok_or_else(|| Error::config(format!("{key} is not set"), key));

        let defaults = RetryConfig::default();
        let retry = RetryConfig {
            max_attempts: parse_or(&get, "RETRY_MAX_ATTEMPTS", defaults.max_attempts)?,
            initial_delay: Duration::from_millis(parse_or(
                &get,
                "RETRY_INITIAL_DELAY_MS",
                duration_ms(defaults.initial_delay),
            )?),
            max_delay: Duration::from_millis(parse_or(
                &get,
                "RETRY_MAX_DELAY_MS",
                duration_ms(defaults.max_delay),
            )?),
            backoff_multiplier: parse_or(
                &get,
                "RETRY_BACKOFF_MULTIPLIER",
                defaults.backoff_multiplier,
            )?,
            jitter: parse_or(&get, "RETRY_JITTER", defaults.jitter)?,
        };

        Ok(Self {
            server_url: required("IQ_SERVER_URL")?,
            username: required("IQ_USERNAME")?,
            password: required("IQ_PASSWORD")?,
            organization_id: get("ORGANIZATION_ID").map(|id| id.trim().to_string()),
            output_dir: get("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_output_dir),
            num_workers: parse_or(&get, "NUM_WORKERS", default_num_workers())?,
            request_timeout: Duration::from_secs(parse_or(
                &get,
                "REQUEST_TIMEOUT_SECS",
                default_request_timeout().as_secs(),
            )?),
            retry,
        })
    }

    /// Apply command-line overrides
    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(url) = &overrides.server_url {
            self.server_url = url.clone();
        }
        if let Some(org) = &overrides.organization_id {
            let org = org.trim();
            self.organization_id = (!org.is_empty()).then(|| org.to_string());
        }
        if let Some(dir) = &overrides.output_dir {
            self.output_dir = dir.clone();
        }
        if let Some(workers) = overrides.num_workers {
            self.num_workers = workers;
        }
    }

    /// Check invariants that the rest of the crate relies on
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.server_url).map_err(|e| {
            Error::config(
                format!("IQ_SERVER_URL is not a valid URL: {e}"),
                "IQ_SERVER_URL",
            )
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::config(
                format!("IQ_SERVER_URL must use http or https, got {}", url.scheme()),
                "IQ_SERVER_URL",
            ));
        }
        if self.username.trim().is_empty() {
            return Err(Error::config("credentials must not be empty", "IQ_USERNAME"));
        }
        if self.password.trim().is_empty() {
            return Err(Error::config("credentials must not be empty", "IQ_PASSWORD"));
        }
        if self.num_workers < 1 {
            return Err(Error::config("NUM_WORKERS must be at least 1", "NUM_WORKERS"));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::config(
                "REQUEST_TIMEOUT_SECS must be at least 1",
                "REQUEST_TIMEOUT_SECS",
            ));
        }
        let multiplier = self.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(Error::config(
                "RETRY_BACKOFF_MULTIPLIER must be a finite number of at least 1.0",
                "RETRY_BACKOFF_MULTIPLIER",
            ));
        }
        Ok(())
    }
}

/// Seed the process environment from a `.env` file, never overriding existing variables
///
/// Returns `Ok(false)` when the file does not exist.
pub fn load_env_file(path: &Path) -> Result<bool> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(true),
        Err(e) if e.not_found() => Ok(false),
        Err(e) => Err(Error::Config {
            message: format!("failed to read {}: {e}", path.display()),
            key: None,
        }),
    }
}

/// Look up one process environment variable by case-insensitive name
pub fn env_var(key: &str) -> Option<String> {
    std::env::vars_os().find_map(|(name, value)| {
        let name = name.into_string().ok()?;
        name.eq_ignore_ascii_case(key)
            .then(|| value.into_string().ok())
            .flatten()
    })
}

/// Upper-case every name; for names differing only in case the exact upper-case one wins
fn fold_keys<I>(vars: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut folded = HashMap::new();
    for (key, value) in vars {
        let upper = key.to_ascii_uppercase();
        if key == upper {
            folded.insert(upper, value);
        } else {
            folded.entry(upper).or_insert(value);
        }
    }
    folded
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::config(format!("{key}={raw:?} is invalid: {e}"), key)),
        None => Ok(default),
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("raw_reports")
}

fn default_num_workers() -> usize {
    8
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}
