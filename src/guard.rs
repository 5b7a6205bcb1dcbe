//! Request guards for the `/api` surface: bearer-key authentication and a
//! per-client rate limit.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{
    clock::{Clock, DefaultClock},
    DefaultKeyedRateLimiter, Quota, RateLimiter as GovernorRateLimiter,
};
use metrics::counter;
use serde_json::json;
use subtle::ConstantTimeEq;
use tracing::warn;

/// Paths that are never counted against a client's window.
const EXEMPT_PATHS: &[&str] = &["/health"];

// Idle client keys are pruned once the map grows past this many.
const SWEEP_THRESHOLD: usize = 10_000;

fn reject(status: StatusCode, reason: &'static str, message: &str) -> Response {
    counter!("requests_rejected_total", "reason" => reason).increment(1);
    (status, Json(json!({ "success": false, "error": message }))).into_response()
}

/// Configured service key; `None` means the server was deployed without one.
pub type ApiKey = Option<Arc<str>>;

/// `Authorization: Bearer <key>` check.
pub async fn require_api_key(State(expected): State<ApiKey>, req: Request, next: Next) -> Response {
    let Some(raw) = req.headers().get(header::AUTHORIZATION) else {
        warn!(path = %req.uri().path(), "request without Authorization header");
        return reject(
            StatusCode::UNAUTHORIZED,
            "missing_auth",
            "Missing Authorization header",
        );
    };
    let Some(presented) = raw.to_str().ok().and_then(|v| v.strip_prefix("Bearer ")) else {
        return reject(
            StatusCode::UNAUTHORIZED,
            "bad_scheme",
            "Authorization header must use Bearer scheme",
        );
    };
    let Some(expected) = expected else {
        tracing::error!("SERVICE_API_KEY is not configured");
        return reject(
            StatusCode::INTERNAL_SERVER_ERROR,
            "no_key_configured",
            "Server configuration error",
        );
    };
    let matches: bool = presented.trim().as_bytes().ct_eq(expected.as_bytes()).into();
    if !matches {
        warn!(path = %req.uri().path(), "invalid API key");
        return reject(StatusCode::FORBIDDEN, "invalid_key", "Invalid API key");
    }
    next.run(req).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after: Duration },
}

type KeyedLimiter = DefaultKeyedRateLimiter<String>;

/// Per-client GCRA limiter: bursts of up to `max_requests`, one request
/// replenished every `window / max_requests`.
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    trust_forwarded_for: bool,
    inner: KeyedLimiter,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        let burst = NonZeroU32::new(max_requests).unwrap_or(NonZeroU32::MIN);
        let period = (window / burst.get()).max(Duration::from_millis(1));
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);
        Self {
            window,
            max_requests: burst.get(),
            trust_forwarded_for: false,
            inner: GovernorRateLimiter::keyed(quota),
        }
    }

    /// Key clients by the first `X-Forwarded-For` hop. Only safe behind a
    /// proxy that overwrites the header.
    pub fn trust_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn trusts_forwarded_for(&self) -> bool {
        self.trust_forwarded_for
    }

    pub fn check(&self, client: &str) -> RateDecision {
        if self.inner.len() > SWEEP_THRESHOLD {
            self.inner.retain_recent();
        }
        match self.inner.check_key(&client.to_string()) {
            Ok(_) => RateDecision::Allowed,
            Err(not_until) => RateDecision::Limited {
                retry_after: not_until.wait_time_from(DefaultClock::default().now()),
            },
        }
    }
}

/// Peer address, or the first `X-Forwarded-For` hop when the proxy is
/// trusted, else `unknown`.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded_for: bool) -> String {
    let forwarded = trust_forwarded_for
        .then(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        })
        .flatten();
    forwarded
        .or_else(|| peer.map(|p| p.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    if EXEMPT_PATHS.contains(&req.uri().path()) {
        return next.run(req).await;
    }

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_key(req.headers(), peer, limiter.trusts_forwarded_for());

    match limiter.check(&client) {
        RateDecision::Allowed => next.run(req).await,
        RateDecision::Limited { retry_after } => {
            let secs = (retry_after.as_millis().div_ceil(1_000) as u64).max(1);
            warn!(%client, retry_after_secs = secs, "rate limit exceeded");
            counter!("requests_rejected_total", "reason" => "rate_limited").increment(1);
            let mut resp = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "success": false,
                    "error": "Too many requests from this IP, please try again later",
                    "retry_after_secs": secs,
                })),
            )
                .into_response();
            resp.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
            resp
        }
    }
}
