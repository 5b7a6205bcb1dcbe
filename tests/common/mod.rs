// tests/common/mod.rs
//
// Shared helpers for the integration tests: scripted sources and a router
// built around them, driven in-process via tower::ServiceExt::oneshot.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    extract::ConnectInfo,
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt as _;

use indicator_crosscheck::{
    api, DualSourceCoordinator, ExtractionError, IndicatorReading, IndicatorSource, ReadingSource,
    RetryPolicy, ServiceConfig, SourceExtraction, SourceKind,
};

pub const KEY: &str = "test-key";
const BODY_LIMIT: usize = 1024 * 1024;

#[derive(Clone)]
pub enum Step {
    Ok(IndicatorReading),
    Fail(&'static str),
}

/// Source that replays a script of results, then repeats `fallback` forever.
pub struct ScriptedSource {
    kind: SourceKind,
    delay: Duration,
    steps: Mutex<VecDeque<Step>>,
    fallback: Step,
    calls: AtomicU32,
}

impl ScriptedSource {
    pub fn new(kind: SourceKind, fallback: Step) -> Self {
        Self {
            kind,
            delay: Duration::ZERO,
            steps: Mutex::new(VecDeque::new()),
            fallback,
            calls: AtomicU32::new(0),
        }
    }

    pub fn then(self, step: Step) -> Self {
        self.steps.lock().unwrap().push_back(step);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndicatorSource for ScriptedSource {
    async fn extract(&self) -> Result<SourceExtraction, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match step {
            Step::Ok(reading) => Ok(SourceExtraction::new(
                reading,
                self.delay.as_millis() as u64,
            )),
            Step::Fail(msg) => Err(ExtractionError::SourceUnavailable(msg.to_string())),
        }
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

pub fn page_reading(p: f64, r: f64, l: f64) -> IndicatorReading {
    IndicatorReading::new(ReadingSource::Webhook, Some(p), Some(r), Some(l))
}

pub fn feed_reading(l: f64) -> IndicatorReading {
    IndicatorReading::new(ReadingSource::TelegramBot, None, None, Some(l))
}

/// The live page snapshot used throughout the tests.
pub fn live_page() -> Step {
    Step::Ok(page_reading(2_110_192.0, 752_040_501.0, 30_463_309.0))
}

pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        api_key: Some(KEY.to_string()),
        retry_delay_ms: 0,
        ..ServiceConfig::default()
    }
}

/// Single attempts, no backoff: keeps HTTP tests fast.
pub fn coordinator(
    page: Arc<ScriptedSource>,
    feed: Arc<ScriptedSource>,
) -> DualSourceCoordinator {
    DualSourceCoordinator::new(page, feed).with_policies(RetryPolicy::once(), RetryPolicy::once())
}

pub fn app(page: Arc<ScriptedSource>, feed: Arc<ScriptedSource>, cfg: &ServiceConfig) -> Router {
    api::router(api::AppState::new(coordinator(page, feed), cfg))
}

pub async fn get_with(
    app: &Router,
    uri: &str,
    headers: &[(&str, &str)],
) -> (StatusCode, HeaderMap, Value) {
    get_from(app, uri, None, headers).await
}

/// GET as if the connection came from `peer` (what `ConnectInfo` carries
/// when the server is bound with connect info).
pub async fn get_from(
    app: &Router,
    uri: &str,
    peer: Option<SocketAddr>,
    headers: &[(&str, &str)],
) -> (StatusCode, HeaderMap, Value) {
    let mut req = Request::builder().method("GET").uri(uri);
    for (k, v) in headers {
        req = req.header(*k, *v);
    }
    if let Some(peer) = peer {
        req = req.extension(ConnectInfo(peer));
    }
    let resp = app
        .clone()
        .oneshot(req.body(Body::empty()).expect("build request"))
        .await
        .expect("router response");

    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, json)
}

/// GET with the test API key.
pub async fn get_authed(app: &Router, uri: &str) -> (StatusCode, Value) {
    let auth = format!("Bearer {KEY}");
    let (status, _, json) = get_with(app, uri, &[("authorization", auth.as_str())]).await;
    (status, json)
}
