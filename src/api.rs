use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use metrics::counter;
use serde_json::{json, Value};
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::cache::ResultCache;
use crate::config::ServiceConfig;
use crate::coordinator::DualSourceCoordinator;
use crate::guard::{self, ApiKey, RateLimiter};
use crate::indicators::SourceKind;
use crate::outcome::ExtractionOutcome;
use crate::validation::PublishedResult;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<DualSourceCoordinator>,
    /// Last successful dual result.
    pub dual_cache: Arc<ResultCache<PublishedResult>>,
    /// Last successful page-only outcome.
    pub page_cache: Arc<ResultCache<ExtractionOutcome>>,
    pub limiter: Arc<RateLimiter>,
    pub api_key: ApiKey,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(coordinator: DualSourceCoordinator, cfg: &ServiceConfig) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            dual_cache: Arc::new(ResultCache::new(cfg.cache_ttl())),
            page_cache: Arc::new(ResultCache::new(cfg.cache_ttl())),
            limiter: Arc::new(
                RateLimiter::new(cfg.rate_limit_window(), cfg.rate_limit_max_requests)
                    .trust_forwarded_for(cfg.trust_forwarded_for),
            ),
            api_key: cfg.api_key.as_deref().map(Arc::from),
            started_at: Instant::now(),
        }
    }
}

/// Full service router: public health, guarded `/api`, JSON 404 and 500.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/scrape-page", get(scrape_page))
        // name used by existing callers
        .route("/scrape-bitnest", get(scrape_page))
        .route("/scrape-telegram", get(scrape_telegram))
        .route("/scrape-dual", get(scrape_dual))
        .route_layer(middleware::from_fn_with_state(
            state.api_key.clone(),
            guard::require_api_key,
        ));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            state.limiter.clone(),
            guard::rate_limit,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

fn panic_response(_: Box<dyn std::any::Any + Send + 'static>) -> Response {
    tracing::error!("handler panicked");
    internal_error()
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "success": false, "error": "Internal server error" })),
    )
        .into_response()
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "error": "Endpoint not found" })),
    )
        .into_response()
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let cache_valid = state.dual_cache.is_valid();
    Json(json!({
        "status": "healthy",
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "cache_valid": cache_valid,
        "cache_age_ms": state.dual_cache.age_ms(),
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

/// Outcome JSON with `metadata.cached` (and `cache_age_ms` on a hit).
fn outcome_body(outcome: &ExtractionOutcome, cache_age_ms: Option<u64>) -> Response {
    let mut body = match serde_json::to_value(outcome) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize outcome");
            return internal_error();
        }
    };
    if let Some(meta) = body.get_mut("metadata").and_then(Value::as_object_mut) {
        meta.insert("cached".into(), Value::from(cache_age_ms.is_some()));
        if let Some(age) = cache_age_ms {
            meta.insert("cache_age_ms".into(), Value::from(age));
        }
    }
    Json(body).into_response()
}

async fn scrape_page(State(state): State<AppState>) -> Response {
    info!("page extraction requested");

    if let Some((hit, age)) = state.page_cache.get_with_age() {
        let age = age.as_millis() as u64;
        counter!("indicator_cache_hits_total", "cache" => "page").increment(1);
        info!(cache_age_ms = age, "returning cached page data");
        return outcome_body(&hit, Some(age));
    }
    counter!("indicator_cache_misses_total", "cache" => "page").increment(1);

    let outcome = state.coordinator.extract_one(SourceKind::Webhook).await;
    if outcome.is_success() {
        state.page_cache.set(outcome.clone());
        info!(
            extraction_time_ms = outcome.extraction_time_ms(),
            "page extraction successful - data cached"
        );
    } else {
        warn!(error = ?outcome.error(), "page extraction failed - returning fallback data");
    }
    outcome_body(&outcome, None)
}

async fn scrape_telegram(State(state): State<AppState>) -> Response {
    info!("telegram extraction requested");
    let outcome = state.coordinator.extract_one(SourceKind::Telegram).await;
    if outcome.is_success() {
        info!(
            extraction_time_ms = outcome.extraction_time_ms(),
            "telegram extraction successful"
        );
    } else {
        warn!(error = ?outcome.error(), "telegram extraction failed");
    }
    outcome_body(&outcome, None)
}

async fn scrape_dual(State(state): State<AppState>) -> Json<PublishedResult> {
    info!("dual-source extraction requested");

    if let Some((hit, age)) = state.dual_cache.get_with_age() {
        let age = age.as_millis() as u64;
        counter!("indicator_cache_hits_total", "cache" => "dual").increment(1);
        info!(cache_age_ms = age, "returning cached dual-source result");
        return Json(hit.served_from_cache(age));
    }
    counter!("indicator_cache_misses_total", "cache" => "dual").increment(1);

    let result = state.coordinator.run_dual().await;
    if result.success {
        state.dual_cache.set(result.clone());
    }
    info!(
        validation_status = %result.validation.status,
        sources_used = ?result.validation.sources_used,
        total_time_ms = result.metadata.total_request_time_ms,
        "dual-source extraction completed"
    );
    Json(result)
}
