//! Deciding whether a mirror response is usable.
//!
//! Some mirrors answer `200 OK` with a JSON error envelope instead of a proper
//! error status. Those are treated as failures so the next mirror is tried.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::{Arc, LazyLock};

use super::response::MirrorResponse;

static FAILURE_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)token|invalid|unauthorized").expect("Failure message regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Accept,
    /// 2xx with a JSON error envelope
    DisguisedError,
    /// 2xx, not an envelope, but the caller's validator said no
    Invalid,
    /// Non-2xx status
    HttpError,
}

/// Caller-supplied check on a response beyond its status code.
#[async_trait]
pub trait ResponseValidator: Send + Sync {
    async fn validate(&self, response: &MirrorResponse) -> bool;
}

/// Adapter for synchronous closures.
pub struct FnValidator<F>(F);

#[async_trait]
impl<F> ResponseValidator for FnValidator<F>
where
    F: Fn(&MirrorResponse) -> bool + Send + Sync,
{
    async fn validate(&self, response: &MirrorResponse) -> bool {
        (self.0)(response)
    }
}

pub fn validate_fn<F>(check: F) -> Arc<dyn ResponseValidator>
where
    F: Fn(&MirrorResponse) -> bool + Send + Sync + 'static,
{
    Arc::new(FnValidator(check))
}

/// Accepts JSON bodies whose `field` is a non-empty string, e.g. a stream `url`.
#[derive(Debug, Clone)]
pub struct RequireJsonField(pub String);

#[async_trait]
impl ResponseValidator for RequireJsonField {
    async fn validate(&self, response: &MirrorResponse) -> bool {
        response
            .json_value()
            .and_then(|body| body.get(&self.0).and_then(Value::as_str).map(|s| !s.is_empty()))
            .unwrap_or(false)
    }
}

/// Narrow shape of a mirror error envelope. Any JSON object parses; the fields
/// decide whether it signals failure.
#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    status: Option<Value>,
    #[serde(default, rename = "subStatus")]
    sub_status: Option<Value>,
    #[serde(default, rename = "userMessage")]
    user_message: Option<Value>,
    #[serde(default)]
    detail: Option<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EnvelopeBody {
    // Tried first: a struct would otherwise accept a JSON array positionally.
    Batch(Vec<Value>),
    Single(ErrorEnvelope),
}

impl ErrorEnvelope {
    fn signals_failure(&self) -> bool {
        let failing_code = |v: &Option<Value>| status_code(v).is_some_and(|code| code >= 400);
        let failing_text = |v: &Option<Value>| {
            v.as_ref().and_then(Value::as_str).is_some_and(|text| FAILURE_MESSAGE.is_match(text))
        };
        failing_code(&self.status)
            || failing_code(&self.sub_status)
            || failing_text(&self.user_message)
            || failing_text(&self.detail)
    }
}

/// Numeric status from a number or numeric string.
fn status_code(value: &Option<Value>) -> Option<i64> {
    match value.as_ref()? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// True when `body` is an error envelope (or an array containing one).
///
/// Bodies that do not parse as JSON objects or arrays are not envelopes.
pub fn is_disguised_error(body: &[u8]) -> bool {
    match serde_json::from_slice::<EnvelopeBody>(body) {
        Ok(EnvelopeBody::Single(envelope)) => envelope.signals_failure(),
        Ok(EnvelopeBody::Batch(items)) => items
            .into_iter()
            .filter(Value::is_object)
            .filter_map(|item| serde_json::from_value::<ErrorEnvelope>(item).ok())
            .any(|envelope| envelope.signals_failure()),
        Err(_) => false,
    }
}

pub async fn classify(
    response: &MirrorResponse,
    validator: Option<&dyn ResponseValidator>,
) -> Classification {
    if !response.status().is_success() {
        return Classification::HttpError;
    }

    if response.is_json() {
        if let Some(body) = response.body_bytes() {
            if is_disguised_error(body) {
                return Classification::DisguisedError;
            }
        }
    }

    if let Some(validator) = validator {
        if !validator.validate(response).await {
            return Classification::Invalid;
        }
    }

    Classification::Accept
}
