// src/lib.rs
// Public library surface for the service binary, the helper binary and integration tests.

pub mod api;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod guard;
pub mod indicators;
pub mod ingest;
pub mod metrics;
pub mod outcome;
pub mod retry;
pub mod validation;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::cache::ResultCache;
pub use crate::config::ServiceConfig;
pub use crate::coordinator::{DualExtraction, DualSourceCoordinator};
pub use crate::error::ExtractionError;
pub use crate::indicators::{IndicatorReading, ReadingSource, SourceExtraction, SourceKind};
pub use crate::ingest::providers::{PageSource, TelegramBotSource};
pub use crate::ingest::IndicatorSource;
pub use crate::outcome::ExtractionOutcome;
pub use crate::retry::{run_with_retry, RetryPolicy};
pub use crate::validation::{reconcile, PublishedResult, ValidationStatus};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber: `RUST_LOG` filter, compact text by default,
/// JSON lines with `LOG_FORMAT=json`. A subscriber that is already installed
/// (the deployment runtime may bring one) is left in place.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("indicator_crosscheck=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if result.is_err() {
        tracing::debug!("global tracing subscriber already installed");
    }
}

/// Build the page and feed sources plus the coordinator from configuration.
pub fn build_coordinator(cfg: &ServiceConfig) -> anyhow::Result<DualSourceCoordinator> {
    let page = PageSource::from_url(cfg.page_url.clone(), cfg.fetch_timeout())?;
    let feed = TelegramBotSource::http(
        cfg.telegram_bot_token.clone(),
        cfg.telegram_chat_id.clone(),
        cfg.fetch_timeout(),
    )?
    .with_message_limit(cfg.telegram_message_limit);

    Ok(
        DualSourceCoordinator::new(std::sync::Arc::new(page), std::sync::Arc::new(feed))
            .with_policies(cfg.retry_policy(), cfg.telegram_retry_policy()),
    )
}
