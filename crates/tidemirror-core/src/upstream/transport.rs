//! The network seam: one concrete HTTP request per attempt.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method};
use std::time::Duration;
use url::Url;

use crate::error::{FetchError, FetchResult, TransportError};

pub const DEFAULT_USER_AGENT: &str = concat!("tidemirror/", env!("CARGO_PKG_VERSION"));

/// A fully resolved request for a single mirror attempt.
#[derive(Debug, Clone)]
pub struct AttemptRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: AttemptRequest) -> Result<reqwest::Response, TransportError>;
}

/// Production transport over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Accepts a pre-built client so callers control TLS and proxy settings.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn with_defaults() -> FetchResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|e| FetchError::Transport(TransportError::from(e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: AttemptRequest) -> Result<reqwest::Response, TransportError> {
        let mut builder =
            self.client.request(request.method, request.url).headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        Ok(builder.send().await?)
    }
}
