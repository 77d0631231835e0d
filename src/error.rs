//! Error types for iq-fetcher
//!
//! This module provides the error taxonomy used by every component:
//! - Configuration errors (fatal, the run never starts)
//! - Authentication errors (fatal, remaining dispatch is aborted)
//! - Transport and HTTP errors (classified as retryable or terminal)
//! - Filesystem errors carrying the concrete path that failed

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for iq-fetcher operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for iq-fetcher
///
/// Each variant includes contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The setting that caused the error (e.g., "IQ_SERVER_URL")
        key: Option<String>,
    },

    /// The server rejected the credentials (401) or the account lacks access (403)
    #[error("authentication failed with HTTP {status} for {url}")]
    Authentication {
        /// HTTP status returned by the server
        status: u16,
        /// The request URL
        url: String,
    },

    /// The requested resource does not exist (404, or no report has been produced yet)
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other non-success HTTP status
    #[error("HTTP {status} for {url}")]
    Http {
        /// HTTP status returned by the server
        status: u16,
        /// The request URL
        url: String,
    },

    /// Network, DNS, TLS or timeout failure
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Response body could not be decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem operation failed (permission denied, disk full, ...)
    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        /// The path the operation was acting on
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A URL could not be built from the configured server address
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a setting
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Shorthand for a filesystem error at `path`
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// True when the server reported that the resource does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// True for credential/permission failures, after which no request can succeed
    pub fn is_authentication(&self) -> bool {
        matches!(self, Error::Authentication { .. })
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Authentication { status, .. } | Error::Http { status, .. } => Some(*status),
            Error::NotFound(_) => Some(404),
            Error::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
