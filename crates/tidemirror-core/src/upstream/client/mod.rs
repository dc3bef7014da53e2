mod request_executor;

#[cfg(test)]
mod tests;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tidemirror_types::{ConfigError, MirrorConfig, ProtocolVersion, Region};
use url::Url;

use super::classifier::ResponseValidator;
use super::proxy_decider::ProxyDecider;
use super::registry::TargetRegistry;
use super::response::MirrorResponse;
use super::selector::{RandomSource, ThreadRandom};
use super::transport::{ReqwestTransport, Transport};
use crate::error::{FetchResult, TransportErrorKind};

/// Per-call options for [`MirrorClient::fetch`].
#[derive(Clone, Default)]
pub struct FetchOptions {
    pub version: ProtocolVersion,
    /// Quality tier to keep when failing over to a mirror of another version
    pub preferred_quality: Option<String>,
    pub region: Region,
    pub validator: Option<Arc<dyn ResponseValidator>>,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    /// Overrides the configured per-attempt deadline
    pub attempt_timeout: Option<Duration>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    pub fn preferred_quality(mut self, quality: impl Into<String>) -> Self {
        self.preferred_quality = Some(quality.into());
        self
    }

    pub fn region(mut self, region: Region) -> Self {
        self.region = region;
        self
    }

    pub fn validator(mut self, validator: Arc<dyn ResponseValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOptions")
            .field("version", &self.version)
            .field("preferred_quality", &self.preferred_quality)
            .field("region", &self.region)
            .field("validator", &self.validator.is_some())
            .field("method", &self.method)
            .field("headers", &self.headers.len())
            .field("body", &self.body.as_ref().map(|b| b.len()))
            .field("attempt_timeout", &self.attempt_timeout)
            .finish()
    }
}

/// How a single attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Accepted,
    HttpError(StatusCode),
    DisguisedError,
    Invalid,
    Transport(TransportErrorKind),
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Accepted => f.write_str("accepted"),
            AttemptOutcome::HttpError(status) => write!(f, "http {}", status.as_u16()),
            AttemptOutcome::DisguisedError => f.write_str("disguised error"),
            AttemptOutcome::Invalid => f.write_str("rejected by validator"),
            AttemptOutcome::Transport(kind) => write!(f, "{} error", kind),
        }
    }
}

/// Record of one network try. Lives only as long as the call's report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    /// Mirror name; `None` for an unmanaged single request
    pub target: Option<String>,
    pub url: Url,
    pub outcome: AttemptOutcome,
}

/// The response a call settled on, with every attempt that led to it.
#[derive(Debug)]
pub struct FetchReport {
    pub response: MirrorResponse,
    /// Classification of `response`; anything but `Accepted` means the mirrors
    /// were exhausted and this is the most useful failure obtained.
    pub outcome: AttemptOutcome,
    pub attempts: Vec<Attempt>,
}

/// Resilient fetcher over the mirror pool.
///
/// Each call walks an attempt order (primary for canonical paths, one weighted
/// pick, then the rest of the pool) strictly one request at a time and returns
/// the first accepted response. Calls share only the read-only registry.
pub struct MirrorClient {
    registry: Arc<TargetRegistry>,
    proxy: ProxyDecider,
    transport: Arc<dyn Transport>,
    random: Arc<dyn RandomSource>,
    attempt_timeout: Duration,
    min_attempts: usize,
    client_header: (HeaderName, HeaderValue),
}

impl MirrorClient {
    /// Client over the reqwest transport with default settings.
    pub fn from_config(config: &MirrorConfig) -> FetchResult<Self> {
        let transport = ReqwestTransport::with_defaults()?;
        Self::new(config, Arc::new(transport))
    }

    pub fn new(config: &MirrorConfig, transport: Arc<dyn Transport>) -> FetchResult<Self> {
        let registry = Arc::new(TargetRegistry::from_config(config));
        Self::with_registry(registry, config, transport)
    }

    /// Build over an existing registry (e.g. [`super::registry::DEFAULT_REGISTRY`]);
    /// `config.targets` is ignored.
    pub fn with_registry(
        registry: Arc<TargetRegistry>,
        config: &MirrorConfig,
        transport: Arc<dyn Transport>,
    ) -> FetchResult<Self> {
        config.fetch.check()?;
        let proxy = ProxyDecider::new(&config.proxy, Arc::clone(&registry))?;

        let header_name = HeaderName::from_bytes(config.fetch.client_header_name.as_bytes())
            .map_err(|e| ConfigError::validation("fetch.client_header_name", e.to_string()))?;
        let header_value = HeaderValue::from_str(&config.fetch.client_header_value)
            .map_err(|e| ConfigError::validation("fetch.client_header_value", e.to_string()))?;

        Ok(Self {
            registry,
            proxy,
            transport,
            random: Arc::new(ThreadRandom),
            attempt_timeout: Duration::from_secs(config.fetch.attempt_timeout_secs),
            min_attempts: config.fetch.min_attempts,
            client_header: (header_name, header_value),
        })
    }

    /// Replace the random source used for weighted picks.
    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    pub fn registry(&self) -> &Arc<TargetRegistry> {
        &self.registry
    }

    pub fn proxy(&self) -> &ProxyDecider {
        &self.proxy
    }

    /// Fetch `url` from the mirror pool.
    ///
    /// Returns the first accepted response. If every attempt fails but at least
    /// one produced a response, the most informative one is returned
    /// (validator-rejected, then disguised error, then HTTP error). Only when no
    /// response was obtained at all is an error raised.
    pub async fn fetch(&self, url: &str, options: FetchOptions) -> FetchResult<MirrorResponse> {
        Ok(self.fetch_with_report(url, options).await?.response)
    }

    pub async fn fetch_with_report(
        &self,
        url: &str,
        options: FetchOptions,
    ) -> FetchResult<FetchReport> {
        request_executor::execute(self, url, &options).await
    }
}
