use std::collections::HashSet;
use std::time::Duration;
use tidemirror_types::{ProtocolVersion, Target};
use url::Url;

use super::{Attempt, AttemptOutcome, FetchOptions, FetchReport, MirrorClient};
use crate::error::{FetchError, FetchResult, TransportError};
use crate::upstream::canonical::prefers_canonical;
use crate::upstream::classifier::{classify, Classification};
use crate::upstream::registry::TargetRegistry;
use crate::upstream::response::MirrorResponse;
use crate::upstream::rewrite::{combine, rewrite};
use crate::upstream::selector::{select, RandomSource, WeightedTarget};
use crate::upstream::transport::{AttemptRequest, Transport};

fn unresolvable(url: &str, reason: impl Into<String>) -> FetchError {
    FetchError::UnresolvableUrl { url: url.to_string(), reason: reason.into() }
}

/// Parse the caller's URL. Relative references resolve onto the primary v2 mirror;
/// scheme-relative ones (`//host/path`) take its scheme.
pub(super) fn resolve_url(raw: &str, registry: &TargetRegistry) -> FetchResult<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(unresolvable(raw, "empty URL"));
    }

    if trimmed.starts_with("//") {
        let primary = registry.primary_target(ProtocolVersion::V2);
        let scheme = primary.as_ref().map_or("https", |primary| primary.base_url.scheme());
        return match Url::parse(&format!("{}:{}", scheme, trimmed)) {
            Ok(url) if url.has_host() => Ok(url),
            Ok(_) => Err(unresolvable(raw, "scheme-relative URL without a host")),
            Err(e) => Err(unresolvable(raw, e.to_string())),
        };
    }

    match Url::parse(trimmed) {
        Ok(url) if url.cannot_be_a_base() => Err(unresolvable(raw, "not a hierarchical URL")),
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let primary = registry
                .primary_target(ProtocolVersion::V2)
                .ok_or_else(|| unresolvable(raw, "relative URL with no v2 mirror to resolve against"))?;

            let (rest, fragment) = match trimmed.split_once('#') {
                Some((rest, fragment)) => (rest, Some(fragment)),
                None => (trimmed, None),
            };
            let (path, query) = match rest.split_once('?') {
                Some((path, query)) => (path, Some(query)),
                None => (rest, None),
            };

            let mut url = primary.base_url.clone();
            url.set_path(&combine(primary.base_path(), path));
            url.set_query(query);
            url.set_fragment(fragment);
            Ok(url)
        },
        Err(e) => Err(unresolvable(raw, e.to_string())),
    }
}

/// Ordered, de-duplicated list of mirrors to try.
///
/// Canonical lookups start at the primary mirror, then one weighted pick,
/// then the whole weighted pool in registration order.
pub(super) fn build_attempt_order(
    url: &Url,
    version: ProtocolVersion,
    registry: &TargetRegistry,
    weighted: &[WeightedTarget],
    random: &dyn RandomSource,
) -> Vec<Target> {
    let primary = registry.primary_target(version);
    let mut candidates: Vec<Target> = Vec::with_capacity(weighted.len() + 2);

    if prefers_canonical(url) {
        candidates.extend(primary.clone());
    }
    candidates.extend(select(weighted, random).cloned());
    candidates.extend(weighted.iter().map(|w| w.target.clone()));

    let mut seen = HashSet::new();
    let mut order: Vec<Target> =
        candidates.into_iter().filter(|t| seen.insert(t.name.clone())).collect();

    if order.is_empty() {
        order.extend(primary);
    }
    order
}

async fn send_attempt(
    transport: &dyn Transport,
    request: AttemptRequest,
    target: Option<String>,
    force_buffer: bool,
) -> Result<MirrorResponse, TransportError> {
    let url = request.url.clone();
    let response = transport.send(request).await?;
    MirrorResponse::from_reqwest(response, url, target, force_buffer).await
}

async fn send_with_deadline(
    transport: &dyn Transport,
    request: AttemptRequest,
    target: Option<String>,
    force_buffer: bool,
    deadline: Duration,
) -> Result<MirrorResponse, TransportError> {
    match tokio::time::timeout(deadline, send_attempt(transport, request, target, force_buffer))
        .await
    {
        Ok(result) => result,
        Err(_) => Err(TransportError::timeout(deadline)),
    }
}

fn proxy_configuration_error(error: &TransportError) -> FetchError {
    FetchError::ProxyConfiguration {
        message: format!(
            "mirror request blocked by cross-origin policy ({}); enable proxy.enabled and mark \
             the mirror requires_proxy",
            error.message
        ),
    }
}

/// Most informative failures seen during one call, by category.
#[derive(Default)]
struct AttemptLedger {
    attempts: Vec<Attempt>,
    last_error: Option<TransportError>,
    last_http_error: Option<MirrorResponse>,
    last_disguised: Option<MirrorResponse>,
    last_invalid: Option<MirrorResponse>,
}

impl AttemptLedger {
    fn record(&mut self, target: &Target, url: Url, outcome: AttemptOutcome) {
        self.attempts.push(Attempt { target: Some(target.name.clone()), url, outcome });
    }

    /// Resolve an exhausted call: invalid, then disguised, then HTTP error
    /// responses are returned; otherwise the last transport error is raised.
    fn exhausted(self, total_attempts: usize) -> FetchResult<FetchReport> {
        let attempts = self.attempts;
        let settled = [
            (self.last_invalid, AttemptOutcome::Invalid),
            (self.last_disguised, AttemptOutcome::DisguisedError),
        ]
        .into_iter()
        .find_map(|(response, outcome)| response.map(|r| (r, outcome)))
        .or_else(|| {
            self.last_http_error.map(|r| {
                let status = r.status();
                (r, AttemptOutcome::HttpError(status))
            })
        });

        if let Some((response, outcome)) = settled {
            tracing::error!(
                attempts = total_attempts,
                outcome = %outcome,
                "All mirror attempts failed, returning best failed response"
            );
            return Ok(FetchReport { response, outcome, attempts });
        }

        match self.last_error {
            Some(error) => {
                tracing::error!(attempts = total_attempts, error = %error, "All mirror attempts failed");
                if error.is_cross_origin() {
                    Err(proxy_configuration_error(&error))
                } else {
                    Err(FetchError::Transport(error))
                }
            },
            None => Err(FetchError::AllTargetsFailed { attempts: total_attempts }),
        }
    }
}

pub(super) async fn execute(
    client: &MirrorClient,
    raw_url: &str,
    options: &FetchOptions,
) -> FetchResult<FetchReport> {
    let url = resolve_url(raw_url, &client.registry)?;
    let deadline = options.attempt_timeout.unwrap_or(client.attempt_timeout);

    let Some(origin) = client.registry.target_for_url(&url).cloned() else {
        return execute_unmanaged(client, url, options, deadline).await;
    };

    let weighted = client.registry.weighted_in(options.version, options.region)?;
    let order = build_attempt_order(
        &url,
        options.version,
        &client.registry,
        &weighted,
        client.random.as_ref(),
    );
    if order.is_empty() {
        return Err(FetchError::NoValidTargets { scope: options.version.to_string() });
    }

    let total_attempts = client.min_attempts.max(order.len());
    let force_buffer = options.validator.is_some();
    let mut ledger = AttemptLedger::default();

    tracing::debug!(
        origin = %origin.name,
        order = ?order.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
        total_attempts,
        "Starting mirror fetch"
    );

    for attempt in 0..total_attempts {
        let target = &order[attempt % order.len()];
        let rewritten = rewrite(&url, &origin, target, options.preferred_quality.as_deref());
        let request_url = client.proxy.wrap(&rewritten);

        let mut headers = options.headers.clone();
        if target.is_custom() {
            let (name, value) = &client.client_header;
            headers.insert(name.clone(), value.clone());
        }

        tracing::debug!(
            mirror = %target.name,
            url = %request_url,
            "Mirror attempt {}/{}",
            attempt + 1,
            total_attempts
        );

        let request = AttemptRequest {
            method: options.method.clone(),
            url: request_url.clone(),
            headers,
            body: options.body.clone(),
        };
        let sent = send_with_deadline(
            client.transport.as_ref(),
            request,
            Some(target.name.clone()),
            force_buffer,
            deadline,
        )
        .await;

        let response = match sent {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(mirror = %target.name, error = %error, "Mirror request failed");
                ledger.record(target, request_url, AttemptOutcome::Transport(error.kind));
                ledger.last_error = Some(error);
                continue;
            },
        };

        match classify(&response, options.validator.as_deref()).await {
            Classification::Accept => {
                if attempt > 0 {
                    tracing::info!(
                        mirror = %target.name,
                        status = %response.status(),
                        "Mirror fallback succeeded at attempt {}/{}",
                        attempt + 1,
                        total_attempts
                    );
                } else {
                    tracing::debug!(mirror = %target.name, status = %response.status(), "Mirror request succeeded");
                }
                ledger.record(target, request_url, AttemptOutcome::Accepted);
                return Ok(FetchReport {
                    response,
                    outcome: AttemptOutcome::Accepted,
                    attempts: ledger.attempts,
                });
            },
            Classification::HttpError => {
                let status = response.status();
                tracing::warn!(mirror = %target.name, status = %status, "Mirror returned error status, trying next");
                ledger.record(target, request_url, AttemptOutcome::HttpError(status));
                ledger.last_http_error = Some(response);
            },
            Classification::DisguisedError => {
                tracing::warn!(mirror = %target.name, "Mirror returned an error envelope, trying next");
                ledger.record(target, request_url, AttemptOutcome::DisguisedError);
                ledger.last_disguised = Some(response);
            },
            Classification::Invalid => {
                tracing::warn!(mirror = %target.name, "Mirror response rejected by validator, trying next");
                ledger.record(target, request_url, AttemptOutcome::Invalid);
                ledger.last_invalid = Some(response);
            },
        }
    }

    ledger.exhausted(total_attempts)
}

/// A URL outside the mirror pool gets exactly one request, proxied if needed.
async fn execute_unmanaged(
    client: &MirrorClient,
    url: Url,
    options: &FetchOptions,
    deadline: Duration,
) -> FetchResult<FetchReport> {
    let request_url = client.proxy.wrap(&url);
    tracing::debug!(url = %request_url, "URL matches no registered mirror, sending single request");

    let request = AttemptRequest {
        method: options.method.clone(),
        url: request_url.clone(),
        headers: options.headers.clone(),
        body: options.body.clone(),
    };
    let sent = send_with_deadline(
        client.transport.as_ref(),
        request,
        None,
        options.validator.is_some(),
        deadline,
    )
    .await;

    match sent {
        Ok(response) => {
            let outcome = if response.status().is_success() {
                AttemptOutcome::Accepted
            } else {
                AttemptOutcome::HttpError(response.status())
            };
            let attempts = vec![Attempt { target: None, url: request_url, outcome }];
            Ok(FetchReport { response, outcome, attempts })
        },
        Err(error) if error.is_cross_origin() => Err(proxy_configuration_error(&error)),
        Err(error) => Err(FetchError::Transport(error)),
    }
}
