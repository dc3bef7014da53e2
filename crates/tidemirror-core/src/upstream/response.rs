//! Responses returned by the mirror client.

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::fmt;
use url::Url;

use crate::error::{FetchError, FetchResult, TransportError};

enum ResponseBody {
    Buffered(Bytes),
    Streaming(reqwest::Response),
}

/// An HTTP response from one mirror attempt.
///
/// JSON bodies (and any body a validator needs to see) are read into memory
/// up front so they can be inspected without consuming what the caller gets.
/// Everything else is passed through as a stream.
pub struct MirrorResponse {
    status: StatusCode,
    headers: HeaderMap,
    url: Url,
    target: Option<String>,
    body: ResponseBody,
}

impl MirrorResponse {
    pub(crate) async fn from_reqwest(
        response: reqwest::Response,
        url: Url,
        target: Option<String>,
        force_buffer: bool,
    ) -> Result<Self, TransportError> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = if force_buffer || is_json(&headers) {
            ResponseBody::Buffered(response.bytes().await?)
        } else {
            ResponseBody::Streaming(response)
        };
        Ok(Self { status, headers, url, target, body })
    }

    /// Fully buffered response; handy for callers composing their own pipelines.
    pub fn buffered(status: StatusCode, headers: HeaderMap, url: Url, body: impl Into<Bytes>) -> Self {
        Self { status, headers, url, target: None, body: ResponseBody::Buffered(body.into()) }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// URL the request was sent to (the proxy URL when proxied).
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Name of the mirror that served this response, if it came from one.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    pub fn is_json(&self) -> bool {
        is_json(&self.headers)
    }

    /// Body bytes when already in memory; `None` for pass-through streams.
    pub fn body_bytes(&self) -> Option<&Bytes> {
        match &self.body {
            ResponseBody::Buffered(bytes) => Some(bytes),
            ResponseBody::Streaming(_) => None,
        }
    }

    /// Buffered body parsed as JSON, without consuming the response.
    pub fn json_value(&self) -> Option<serde_json::Value> {
        self.body_bytes().and_then(|bytes| serde_json::from_slice(bytes).ok())
    }

    pub async fn bytes(self) -> FetchResult<Bytes> {
        match self.body {
            ResponseBody::Buffered(bytes) => Ok(bytes),
            ResponseBody::Streaming(response) => {
                response.bytes().await.map_err(|e| FetchError::Body(e.to_string()))
            },
        }
    }

    pub async fn text(self) -> FetchResult<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn json<T: DeserializeOwned>(self) -> FetchResult<T> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn bytes_stream(self) -> BoxStream<'static, Result<Bytes, TransportError>> {
        match self.body {
            ResponseBody::Buffered(bytes) => stream::once(async move { Ok(bytes) }).boxed(),
            ResponseBody::Streaming(response) => {
                response.bytes_stream().map_err(TransportError::from).boxed()
            },
        }
    }
}

impl fmt::Debug for MirrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirrorResponse")
            .field("status", &self.status)
            .field("url", &self.url.as_str())
            .field("target", &self.target)
            .field("buffered", &self.body_bytes().map(|b| b.len()))
            .finish()
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/json"))
}
