//! Indicator cross-check service: binary entrypoint
//! Boots the Axum HTTP server, wiring configuration, sources, caches and middleware.

use std::net::SocketAddr;

use anyhow::Context;
use axum::Router;
use shuttle_runtime::CustomError;

use indicator_crosscheck::{api, build_coordinator, init_tracing, metrics::Metrics, ServiceConfig};

/// Serves the router with the peer address attached to every request, so
/// the rate limiter can key on `ConnectInfo<SocketAddr>`.
struct CrosscheckService(Router);

#[async_trait::async_trait]
impl shuttle_runtime::Service for CrosscheckService {
    async fn bind(self, addr: SocketAddr) -> Result<(), shuttle_runtime::Error> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(CustomError::new)?;
        axum::serve(
            listener,
            self.0.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(CustomError::new)?;
        Ok(())
    }
}

#[shuttle_runtime::main]
async fn axum() -> Result<CrosscheckService, shuttle_runtime::Error> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = ServiceConfig::load().context("loading service config")?;
    tracing::info!(
        cache_ttl_ms = cfg.cache_ttl_ms,
        max_retries = cfg.max_retries,
        telegram_max_attempts = cfg.telegram_max_attempts,
        api_key_set = cfg.api_key.is_some(),
        trust_forwarded_for = cfg.trust_forwarded_for,
        "configuration loaded"
    );

    let coordinator = build_coordinator(&cfg).context("building sources")?;
    coordinator.connect_all().await;

    let state = api::AppState::new(coordinator, &cfg);
    let mut router = api::router(state);

    match Metrics::init(cfg.cache_ttl_ms) {
        Ok(m) => router = router.merge(m.router()),
        Err(e) => tracing::warn!(error = %e, "prometheus recorder not installed"),
    }

    tracing::info!("indicator cross-check service started");
    Ok(CrosscheckService(router))
}
