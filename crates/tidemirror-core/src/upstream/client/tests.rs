use super::request_executor::{build_attempt_order, resolve_url};
use super::{AttemptOutcome, FetchOptions, MirrorClient};
use crate::error::{FetchError, TransportError, TransportErrorKind};
use crate::upstream::classifier::RequireJsonField;
use crate::upstream::registry::TargetRegistry;
use crate::upstream::selector::tests::{target, SequenceRandom};
use crate::upstream::transport::{AttemptRequest, Transport};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tidemirror_types::{
    ConfigError, MirrorConfig, ProtocolVersion, ProxySettings, TargetConfig, TargetKind,
};
use url::Url;

enum Step {
    Respond { status: u16, content_type: &'static str, body: String },
    Fail(&'static str),
    Hang,
}

fn json(status: u16, body: &str) -> Step {
    Step::Respond { status, content_type: "application/json", body: body.to_string() }
}

/// Plays back a fixed script of outcomes and records every request it sees.
struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    seen: Mutex<Vec<AttemptRequest>>,
}

impl ScriptedTransport {
    fn new(script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self { script: Mutex::new(script.into()), seen: Mutex::new(Vec::new()) })
    }

    fn seen_urls(&self) -> Vec<String> {
        self.seen.lock().iter().map(|r| r.url.to_string()).collect()
    }

    fn seen(&self) -> Vec<AttemptRequest> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: AttemptRequest) -> Result<reqwest::Response, TransportError> {
        self.seen.lock().push(request);
        let step = self.script.lock().pop_front();
        match step {
            Some(Step::Respond { status, content_type, body }) => {
                let response = http::Response::builder()
                    .status(status)
                    .header(CONTENT_TYPE, content_type)
                    .body(body)
                    .expect("valid response");
                Ok(reqwest::Response::from(response))
            },
            Some(Step::Fail(message)) => Err(TransportError::from_message(message)),
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(TransportError::from_message("hung request finished"))
            },
            None => Err(TransportError::from_message("script exhausted")),
        }
    }
}

fn pair() -> Vec<TargetConfig> {
    vec![
        TargetConfig::new("a", "https://a.example/base", 30),
        TargetConfig::new("b", "https://b.example/api", 10),
    ]
}

fn client_with(
    config: MirrorConfig,
    transport: Arc<ScriptedTransport>,
    draws: Vec<u64>,
) -> MirrorClient {
    MirrorClient::new(&config, transport)
        .expect("client builds")
        .with_random(Arc::new(SequenceRandom::new(draws)))
}

fn client(
    targets: Vec<TargetConfig>,
    transport: Arc<ScriptedTransport>,
    draws: Vec<u64>,
) -> MirrorClient {
    client_with(MirrorConfig { targets, ..Default::default() }, transport, draws)
}

#[tokio::test]
async fn test_failover_to_second_mirror() {
    let transport = ScriptedTransport::new(vec![
        json(500, r#"{"error": "boom"}"#),
        json(200, r#"{"items": [1, 2]}"#),
    ]);
    let client = client(pair(), transport.clone(), vec![0]);

    let report = client
        .fetch_with_report("https://a.example/base/search/?s=test", FetchOptions::new())
        .await
        .expect("fallback succeeds");

    assert_eq!(report.outcome, AttemptOutcome::Accepted);
    assert_eq!(report.response.status(), StatusCode::OK);
    assert_eq!(report.response.target(), Some("b"));
    assert_eq!(
        transport.seen_urls(),
        vec![
            "https://a.example/base/search/?s=test".to_string(),
            "https://b.example/api/search/?s=test".to_string(),
        ]
    );
    assert_eq!(report.attempts.len(), 2);
    assert_eq!(report.attempts[0].outcome, AttemptOutcome::HttpError(StatusCode::INTERNAL_SERVER_ERROR));
}

#[tokio::test]
async fn test_single_mirror_gets_attempt_floor() {
    let transport =
        ScriptedTransport::new(vec![json(503, "{}"), json(503, "{}"), json(503, "{}")]);
    let client = client(
        vec![TargetConfig::new("only", "https://only.example", 10)],
        transport.clone(),
        vec![],
    );

    let report = client
        .fetch_with_report("https://only.example/track/?id=1", FetchOptions::new())
        .await
        .expect("last HTTP error is returned");

    assert_eq!(report.response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(report.outcome, AttemptOutcome::HttpError(StatusCode::SERVICE_UNAVAILABLE));
    let urls = transport.seen_urls();
    assert_eq!(urls.len(), 3);
    assert!(urls.iter().all(|u| u == "https://only.example/track/?id=1"));
}

#[tokio::test]
async fn test_floor_cycles_through_order() {
    let transport = ScriptedTransport::new(vec![json(500, "{}"), json(500, "{}"), json(500, "{}")]);
    let client = client(pair(), transport.clone(), vec![0]);

    let _ = client.fetch("https://a.example/base/track/", FetchOptions::new()).await;

    let urls = transport.seen_urls();
    assert_eq!(urls.len(), 3);
    assert!(urls[0].starts_with("https://a.example/"));
    assert!(urls[1].starts_with("https://b.example/"));
    assert!(urls[2].starts_with("https://a.example/"));
}

#[tokio::test]
async fn test_invalid_response_preferred_on_exhaustion() {
    let transport = ScriptedTransport::new(vec![
        json(200, r#"{"items": []}"#),
        json(500, "{}"),
        Step::Fail("connection refused"),
    ]);
    let targets = vec![
        TargetConfig::new("a", "https://a.example", 10),
        TargetConfig::new("b", "https://b.example", 10),
        TargetConfig::new("c", "https://c.example", 10),
    ];
    let client = client(targets, transport, vec![0]);
    let options = FetchOptions::new().validator(Arc::new(RequireJsonField("url".to_string())));

    let report = client
        .fetch_with_report("https://a.example/track/?id=1", options)
        .await
        .expect("invalid response is returned");

    assert_eq!(report.outcome, AttemptOutcome::Invalid);
    assert_eq!(report.response.status(), StatusCode::OK);
    assert_eq!(report.response.target(), Some("a"));
    let outcomes: Vec<_> = report.attempts.iter().map(|a| a.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            AttemptOutcome::Invalid,
            AttemptOutcome::HttpError(StatusCode::INTERNAL_SERVER_ERROR),
            AttemptOutcome::Transport(TransportErrorKind::Other),
        ]
    );
}

#[tokio::test]
async fn test_disguised_error_preferred_over_http_error() {
    let transport = ScriptedTransport::new(vec![
        json(500, "{}"),
        json(200, r#"{"status": 401, "userMessage": "Invalid token"}"#),
        Step::Fail("connection reset"),
    ]);
    let client = client(pair(), transport, vec![0]);

    let report = client
        .fetch_with_report("https://a.example/base/track/", FetchOptions::new())
        .await
        .expect("disguised error is returned");

    assert_eq!(report.outcome, AttemptOutcome::DisguisedError);
    assert_eq!(report.response.target(), Some("b"));
}

#[tokio::test]
async fn test_transport_failures_raise_last_error() {
    let transport = ScriptedTransport::new(vec![
        Step::Fail("connection refused"),
        Step::Fail("connection refused"),
        Step::Fail("dns failure"),
    ]);
    let client = client(pair(), transport, vec![0]);

    let err = client
        .fetch("https://a.example/base/track/", FetchOptions::new())
        .await
        .expect_err("no response obtained");

    match err {
        FetchError::Transport(error) => assert_eq!(error.message, "dns failure"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_cross_origin_becomes_proxy_configuration_error() {
    let transport = ScriptedTransport::new(vec![
        Step::Fail("blocked by CORS policy"),
        Step::Fail("blocked by CORS policy"),
        Step::Fail("blocked by CORS policy"),
    ]);
    let client = client(pair(), transport, vec![0]);

    let err = client
        .fetch("https://a.example/base/track/", FetchOptions::new())
        .await
        .expect_err("cross-origin failure");

    assert!(matches!(err, FetchError::ProxyConfiguration { .. }), "got {err:?}");
    assert!(err.to_string().contains("requires_proxy"));
}

#[tokio::test]
async fn test_canonical_path_tries_primary_first() {
    let transport = ScriptedTransport::new(vec![json(200, r#"{"id": 1}"#)]);
    let targets = vec![
        TargetConfig::new("primary", "https://p.example", 1),
        TargetConfig::new("heavy", "https://h.example", 99),
    ];
    let client = client(targets, transport.clone(), vec![50]);

    let response = client
        .fetch("https://h.example/album/?id=1", FetchOptions::new())
        .await
        .expect("primary answers");

    assert_eq!(response.target(), Some("primary"));
    assert_eq!(transport.seen_urls(), vec!["https://p.example/album/?id=1".to_string()]);
}

#[tokio::test]
async fn test_client_header_only_for_custom_mirrors() {
    let transport = ScriptedTransport::new(vec![json(500, "{}"), json(200, "{}")]);
    let targets = vec![
        TargetConfig::new("official", "https://o.example", 10),
        TargetConfig::new("custom", "https://c.example", 10).kind(TargetKind::Custom),
    ];
    let client = client(targets, transport.clone(), vec![0]);

    client.fetch("https://o.example/track/", FetchOptions::new()).await.expect("custom answers");

    let seen = transport.seen();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].headers.get("x-client").is_none());
    let value = seen[1].headers.get("x-client").expect("client header present");
    assert!(value.to_str().expect("ascii").starts_with("tidemirror/"));
}

#[tokio::test]
async fn test_quality_hint_applied_across_versions() {
    let transport = ScriptedTransport::new(vec![json(500, "{}"), json(200, "{}")]);
    let targets = vec![
        TargetConfig::new("legacy", "https://legacy.example/v1", 25).version(ProtocolVersion::V1),
        TargetConfig::new("modern", "https://modern.example", 10),
    ];
    let client = client(targets, transport.clone(), vec![0]);
    let options =
        FetchOptions::new().version(ProtocolVersion::V1).preferred_quality("LOSSLESS");

    client
        .fetch("https://legacy.example/v1/track/?id=7&quality=HIGH", options)
        .await
        .expect("modern answers");

    assert_eq!(
        transport.seen_urls(),
        vec![
            "https://legacy.example/v1/track/?id=7&quality=HIGH".to_string(),
            "https://modern.example/track/?id=7&quality=LOSSLESS".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_proxied_mirror_is_wrapped() {
    let transport = ScriptedTransport::new(vec![json(500, "{}"), json(200, "{}")]);
    let config = MirrorConfig {
        targets: vec![
            TargetConfig::new("a", "https://a.example/base", 30),
            TargetConfig::new("b", "https://b.example/api", 10).requires_proxy(true),
        ],
        proxy: ProxySettings { enabled: true, ..Default::default() },
        ..Default::default()
    };
    let client = client_with(config, transport.clone(), vec![0]);

    let response = client
        .fetch("https://a.example/base/search/?s=test", FetchOptions::new())
        .await
        .expect("proxied mirror answers");

    let urls = transport.seen_urls();
    assert_eq!(urls[0], "https://a.example/base/search/?s=test");
    assert_eq!(
        urls[1],
        "http://127.0.0.1:8045/api/proxy?url=https%3A%2F%2Fb.example%2Fapi%2Fsearch%2F%3Fs%3Dtest"
    );
    assert_eq!(response.target(), Some("b"));
}

#[tokio::test]
async fn test_hung_attempt_times_out_and_continues() {
    let transport = ScriptedTransport::new(vec![Step::Hang, json(200, r#"{"ok": true}"#)]);
    let client = client(pair(), transport, vec![0]);
    let options = FetchOptions::new().attempt_timeout(Duration::from_millis(50));

    let report = client
        .fetch_with_report("https://a.example/base/track/", options)
        .await
        .expect("second mirror answers");

    assert_eq!(report.outcome, AttemptOutcome::Accepted);
    assert_eq!(report.attempts[0].outcome, AttemptOutcome::Transport(TransportErrorKind::Timeout));
}

#[tokio::test]
async fn test_unregistered_url_gets_single_request() {
    let transport = ScriptedTransport::new(vec![Step::Respond {
        status: 500,
        content_type: "audio/flac",
        body: String::new(),
    }]);
    let client = client(pair(), transport.clone(), vec![]);

    let report = client
        .fetch_with_report("https://cdn.example/audio.flac", FetchOptions::new())
        .await
        .expect("single response passed through");

    assert_eq!(report.response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(report.attempts[0].target, None);
    assert_eq!(transport.seen_urls().len(), 1);
}

#[tokio::test]
async fn test_relative_url_resolves_onto_primary() {
    let transport = ScriptedTransport::new(vec![json(200, "{}")]);
    let client = client(pair(), transport.clone(), vec![0]);

    client.fetch("/search/?s=x", FetchOptions::new()).await.expect("resolved");

    assert_eq!(transport.seen_urls(), vec!["https://a.example/base/search/?s=x".to_string()]);
}

#[tokio::test]
async fn test_unresolvable_url_sends_nothing() {
    let transport = ScriptedTransport::new(vec![]);
    let client = client(pair(), transport.clone(), vec![]);

    let err = client.fetch("http://[::1", FetchOptions::new()).await.expect_err("bad URL");
    assert!(matches!(err, FetchError::UnresolvableUrl { .. }), "got {err:?}");

    let err = client.fetch("mailto:someone@example.com", FetchOptions::new()).await.expect_err("opaque URL");
    assert!(matches!(err, FetchError::UnresolvableUrl { .. }), "got {err:?}");

    assert!(transport.seen_urls().is_empty());
}

#[tokio::test]
async fn test_no_targets_for_version() {
    let transport = ScriptedTransport::new(vec![]);
    let client = client(
        vec![TargetConfig::new("legacy", "https://legacy.example", 10).version(ProtocolVersion::V1)],
        transport,
        vec![],
    );

    let err = client
        .fetch("https://legacy.example/track/", FetchOptions::new())
        .await
        .expect_err("no v2 mirrors");
    assert!(matches!(err, FetchError::NoValidTargets { .. }), "got {err:?}");
}

#[test]
fn test_attempt_order_dedupes_weighted_pick() {
    let registry = TargetRegistry::from_targets(vec![
        target("a", "https://a.example", 10),
        target("b", "https://b.example", 10),
        target("c", "https://c.example", 10),
    ]);
    let weighted = registry.weighted(ProtocolVersion::V2).expect("weighted");
    let url = Url::parse("https://a.example/track/").expect("test URL");

    let order = build_attempt_order(
        &url,
        ProtocolVersion::V2,
        &registry,
        weighted,
        &SequenceRandom::new([15]),
    );

    let names: Vec<_> = order.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["b", "a", "c"]);
}

#[test]
fn test_attempt_order_canonical_then_pick() {
    let registry = TargetRegistry::from_targets(vec![
        target("a", "https://a.example", 10),
        target("b", "https://b.example", 10),
        target("c", "https://c.example", 10),
    ]);
    let weighted = registry.weighted(ProtocolVersion::V2).expect("weighted");
    let url = Url::parse("https://c.example/artist/?id=3").expect("test URL");

    let order = build_attempt_order(
        &url,
        ProtocolVersion::V2,
        &registry,
        weighted,
        &SequenceRandom::new([25]),
    );

    let names: Vec<_> = order.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["a", "c", "b"]);
}

#[test]
fn test_resolve_url_keeps_absolute_urls() {
    let registry = TargetRegistry::from_targets(vec![target("a", "https://a.example/base", 10)]);
    let url = resolve_url("https://elsewhere.example/x?y=1#z", &registry).expect("absolute");
    assert_eq!(url.as_str(), "https://elsewhere.example/x?y=1#z");

    let url = resolve_url("track/?id=1#top", &registry).expect("relative");
    assert_eq!(url.as_str(), "https://a.example/base/track/?id=1#top");
}

#[test]
fn test_resolve_url_scheme_relative_takes_primary_scheme() {
    let registry = TargetRegistry::from_targets(vec![target("a", "http://a.example/base", 10)]);
    let url = resolve_url("//cdn.example/x?y=1", &registry).expect("scheme-relative");
    assert_eq!(url.as_str(), "http://cdn.example/x?y=1");

    let empty = TargetRegistry::from_targets(vec![]);
    let url = resolve_url("//cdn.example/x", &empty).expect("defaults to https");
    assert_eq!(url.as_str(), "https://cdn.example/x");

    assert!(matches!(
        resolve_url("//", &registry),
        Err(FetchError::UnresolvableUrl { .. })
    ));
}

#[tokio::test]
async fn test_cross_origin_failure_falls_through_to_next_mirror() {
    let transport = ScriptedTransport::new(vec![
        Step::Fail("blocked by CORS policy"),
        json(200, r#"{"id": 1}"#),
    ]);
    let client = client(pair(), transport.clone(), vec![0]);

    let report = client
        .fetch_with_report("https://a.example/base/track/?id=1", FetchOptions::new())
        .await
        .expect("second mirror answers");

    assert_eq!(report.outcome, AttemptOutcome::Accepted);
    assert_eq!(report.response.target(), Some("b"));
    let outcomes: Vec<_> = report.attempts.iter().map(|a| a.outcome).collect();
    assert_eq!(
        outcomes,
        vec![AttemptOutcome::Transport(TransportErrorKind::CrossOrigin), AttemptOutcome::Accepted]
    );
    assert_eq!(transport.seen_urls().len(), 2);
}

#[tokio::test]
async fn test_zero_attempt_timeout_rejected_at_construction() {
    let mut config = MirrorConfig { targets: pair(), ..Default::default() };
    config.fetch.attempt_timeout_secs = 0;

    let err = MirrorClient::new(&config, ScriptedTransport::new(vec![]))
        .err()
        .expect("invalid fetch settings");
    match err {
        FetchError::Config(ConfigError::Validation { field, .. }) => {
            assert_eq!(field, "fetch.attempt_timeout_secs");
        },
        other => panic!("unexpected error: {other:?}"),
    }
}
