//! Routing of cross-origin-restricted mirrors through the same-origin proxy.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::sync::Arc;
use tidemirror_types::{ConfigError, ProxySettings, Target};
use url::Url;

use super::registry::TargetRegistry;

/// Characters left unescaped by JavaScript's `encodeURIComponent`.
pub(crate) const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// True when `url` shares `target`'s origin and sits at or under its base path.
pub fn matches_target(url: &Url, target: &Target) -> bool {
    if url.origin() != target.origin() {
        return false;
    }
    let base = target.base_path().trim_end_matches('/');
    if base.is_empty() {
        return true;
    }
    url.path().strip_prefix(base).is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

pub struct ProxyDecider {
    enabled: bool,
    endpoint: Url,
    registry: Arc<TargetRegistry>,
}

impl ProxyDecider {
    pub fn new(settings: &ProxySettings, registry: Arc<TargetRegistry>) -> Result<Self, ConfigError> {
        let endpoint = Url::parse(&settings.endpoint)
            .map_err(|e| ConfigError::validation("proxy.endpoint", e.to_string()))?;
        tracing::debug!(enabled = settings.enabled, endpoint = %endpoint, "Proxy decider configured");
        Ok(Self { enabled: settings.enabled, endpoint, registry })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the registered target addressed by `url` must go through the proxy.
    pub fn is_proxy_target(&self, url: &Url) -> bool {
        self.registry.target_for_url(url).is_some_and(|target| target.requires_proxy)
    }

    /// `{endpoint}?url=<encoded url>` for proxied targets, otherwise `url` itself.
    pub fn wrap(&self, url: &Url) -> Url {
        if !self.enabled || !self.is_proxy_target(url) {
            return url.clone();
        }
        let mut wrapped = self.endpoint.clone();
        let encoded = utf8_percent_encode(url.as_str(), URI_COMPONENT);
        wrapped.set_query(Some(&format!("url={}", encoded)));
        wrapped
    }
}
