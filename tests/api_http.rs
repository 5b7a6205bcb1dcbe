// tests/api_http.rs
//
// HTTP-level tests for the public Router without opening sockets.
//
// Covered:
// - GET /health (public, shape)
// - bearer auth on /api/* (401 / 401 / 500 / 403)
// - single-source endpoints (success and fallback shapes)
// - GET /api/scrape-dual shape
// - JSON 404

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;

use common::{app, feed_reading, get_authed, get_with, live_page, test_config, ScriptedSource, Step};
use indicator_crosscheck::{ServiceConfig, SourceKind};

fn default_app() -> axum::Router {
    let page = Arc::new(ScriptedSource::new(SourceKind::Webhook, live_page()));
    let feed = Arc::new(ScriptedSource::new(
        SourceKind::Telegram,
        Step::Ok(feed_reading(30_300_000.0)),
    ));
    app(page, feed, &test_config())
}

#[tokio::test]
async fn health_is_public_and_reports_cache() {
    let app = default_app();
    let (status, _, v) = get_with(&app, "/health", &[]).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["status"], json!("healthy"));
    assert_eq!(v["cache_valid"], json!(false));
    assert_eq!(v["cache_age_ms"], json!(null));
    assert!(v["uptime_seconds"].is_u64());
    assert!(v["timestamp"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn missing_authorization_is_401() {
    let app = default_app();
    let (status, _, v) = get_with(&app, "/api/scrape-dual", &[]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(v, json!({"success": false, "error": "Missing Authorization header"}));
}

#[tokio::test]
async fn non_bearer_scheme_is_401() {
    let app = default_app();
    let (status, _, v) =
        get_with(&app, "/api/scrape-dual", &[("authorization", "Basic dGVzdDp0ZXN0")]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(v["error"], json!("Authorization header must use Bearer scheme"));
}

#[tokio::test]
async fn wrong_key_is_403() {
    let app = default_app();
    let (status, _, v) =
        get_with(&app, "/api/scrape-page", &[("authorization", "Bearer nope")]).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(v["error"], json!("Invalid API key"));
}

#[tokio::test]
async fn keys_sharing_a_prefix_are_rejected() {
    let app = default_app();
    for presented in ["Bearer test-ke", "Bearer test-key2", "Bearer test-kez"] {
        let (status, _, _) = get_with(&app, "/api/scrape-page", &[("authorization", presented)]).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{presented}");
    }
    let (status, _, _) =
        get_with(&app, "/api/scrape-page", &[("authorization", "Bearer  test-key ")]).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unconfigured_key_is_500() {
    let page = Arc::new(ScriptedSource::new(SourceKind::Webhook, live_page()));
    let feed = Arc::new(ScriptedSource::new(SourceKind::Telegram, Step::Fail("down")));
    let cfg = ServiceConfig {
        api_key: None,
        ..test_config()
    };
    let app = app(page.clone(), feed, &cfg);

    let (status, _, v) =
        get_with(&app, "/api/scrape-page", &[("authorization", "Bearer anything")]).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(v["error"], json!("Server configuration error"));
    assert_eq!(page.calls(), 0, "handler must not run");
}

#[tokio::test]
async fn unknown_route_is_json_404() {
    let app = default_app();
    let (status, _, v) = get_with(&app, "/api/does-not-exist", &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(v, json!({"success": false, "error": "Endpoint not found"}));

    let (status, _, _) = get_with(&app, "/nope", &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn scrape_page_success_shape() {
    let app = default_app();
    let (status, v) = get_authed(&app, "/api/scrape-page").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["success"], json!(true));
    assert_eq!(v["data"]["participants"], json!(2_110_192));
    assert_eq!(v["data"]["revenues"], json!(752_040_501));
    assert_eq!(v["data"]["source"], json!("webhook"));
    assert_eq!(v["metadata"]["attempts"], json!(1));
    assert_eq!(v["metadata"]["cached"], json!(false));
    assert!(v["metadata"]["extraction_time_ms"].is_u64());
}

#[tokio::test]
async fn scrape_page_failure_carries_fallback() {
    let page = Arc::new(ScriptedSource::new(
        SourceKind::Webhook,
        Step::Fail("navigation timeout"),
    ));
    let feed = Arc::new(ScriptedSource::new(SourceKind::Telegram, Step::Fail("down")));
    let app = app(page, feed, &test_config());

    let (status, v) = get_authed(&app, "/api/scrape-bitnest").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["success"], json!(false));
    assert_eq!(v["error"], json!("navigation timeout"));
    assert_eq!(v["fallback_data"]["source"], json!("fallback"));
    assert_eq!(v["fallback_data"]["liquidity"], json!(30_463_309));
    assert_eq!(
        v["fallback_data"]["timestamp"],
        json!("2025-10-30T21:20:00.000Z")
    );
}

#[tokio::test]
async fn scrape_telegram_returns_feed_reading() {
    let app = default_app();
    let (status, v) = get_authed(&app, "/api/scrape-telegram").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["success"], json!(true));
    assert_eq!(v["data"]["liquidity"], json!(30_300_000));
    assert_eq!(v["data"]["participants"], json!(null));
    assert_eq!(v["data"]["source"], json!("telegram_bot"));
}

#[tokio::test]
async fn scrape_dual_reports_critical_for_liquidity_only_feed() {
    let app = default_app();
    let (status, v) = get_authed(&app, "/api/scrape-dual").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["success"], json!(true));
    assert_eq!(v["validation"]["status"], json!("CRITICAL"));
    assert_eq!(v["validation"]["divergence"]["participants_pct"], json!(100));
    assert_eq!(v["validation"]["divergence"]["liquidity_pct"], json!(0.54));
    assert_eq!(v["validation"]["sources_used"], json!(["webhook", "telegram"]));
    assert_eq!(v["data"]["source"], json!("webhook_primary_critical"));
    assert_eq!(v["data"]["participants"], json!(2_110_192));
    assert_eq!(v["validation"]["telegram_data"]["liquidity"], json!(30_300_000));
    assert_eq!(v["metadata"]["cached"], json!(false));
    assert!(v["metadata"]["total_request_time_ms"].is_u64());
    assert!(v["validation"]["recommendation"]
        .as_str()
        .unwrap()
        .starts_with("CRITICAL: Significant divergence detected (max 100.00%)"));
}
