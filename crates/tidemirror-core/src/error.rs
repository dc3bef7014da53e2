//! Error types for mirror fetching.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use tidemirror_types::ConfigError;

static CROSS_ORIGIN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bcors\b|cross-origin|access-control-allow-origin")
        .expect("Cross-origin regex is valid")
});

/// Coarse category of a failed network attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    Connect,
    Timeout,
    /// Blocked by cross-origin policy; the mirror likely needs the proxy
    CrossOrigin,
    Body,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::CrossOrigin => "cross-origin",
            TransportErrorKind::Body => "body",
            TransportErrorKind::Other => "transport",
        };
        f.write_str(name)
    }
}

/// A network-level failure for one attempt. Always recoverable by trying the next mirror.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} error: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// Build from a free-form message, recognising cross-origin failures by their text.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = if CROSS_ORIGIN_PATTERN.is_match(&message) {
            TransportErrorKind::CrossOrigin
        } else {
            TransportErrorKind::Other
        };
        Self { kind, message }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            TransportErrorKind::Timeout,
            format!("no response within {}ms", after.as_millis()),
        )
    }

    pub fn is_cross_origin(&self) -> bool {
        self.kind == TransportErrorKind::CrossOrigin
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        // Text check first: browser fetch backends report CORS failures as generic request errors.
        let message = e.to_string();
        if CROSS_ORIGIN_PATTERN.is_match(&message) {
            return Self::new(TransportErrorKind::CrossOrigin, message);
        }
        let kind = if e.is_timeout() {
            TransportErrorKind::Timeout
        } else if e.is_connect() {
            TransportErrorKind::Connect
        } else if e.is_body() || e.is_decode() {
            TransportErrorKind::Body
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, message)
    }
}

/// Errors surfaced to callers of the mirror client.
///
/// Per-mirror failures never appear here directly; they are retried against
/// the next mirror and only total exhaustion is reported.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FetchError {
    /// The caller's URL could not be parsed or resolved against a mirror.
    #[error("Cannot resolve URL '{url}': {reason}")]
    UnresolvableUrl { url: String, reason: String },

    /// No target with a positive weight and a valid base URL is registered.
    #[error("No valid targets for {scope}")]
    NoValidTargets { scope: String },

    /// Every attempt failed without producing any response.
    #[error("All {attempts} mirror attempts failed")]
    AllTargetsFailed { attempts: usize },

    /// The last failure was a cross-origin block; the mirror needs the proxy.
    #[error("Proxy configuration error: {message}")]
    ProxyConfiguration { message: String },

    /// Last transport failure, re-raised after all mirrors were exhausted.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Reading a response body failed after it was handed to the caller.
    #[error("Failed to read response body: {0}")]
    Body(String),

    /// Response body is not the JSON shape the caller asked for.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Static configuration is unusable.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for mirror fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;
