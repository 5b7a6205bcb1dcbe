use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

static DESCRIBED: OnceCell<()> = OnceCell::new();

/// Register help texts once per process.
pub fn ensure_metrics_described() {
    DESCRIBED.get_or_init(|| {
        describe_counter!(
            "extraction_attempts_total",
            "Extraction attempts started, per source"
        );
        describe_counter!(
            "extraction_failures_total",
            "Extraction attempts that failed, per source"
        );
        describe_counter!(
            "extraction_exhausted_total",
            "Extractions that used up every retry, per source"
        );
        describe_counter!(
            "validation_status_total",
            "Cross-validation results by status"
        );
        describe_counter!("indicator_cache_hits_total", "Result cache hits");
        describe_counter!("indicator_cache_misses_total", "Result cache misses");
        describe_counter!(
            "requests_rejected_total",
            "Requests rejected by auth or rate limiting"
        );
        describe_histogram!(
            "validation_max_divergence_pct",
            Unit::Percent,
            "Largest per-indicator divergence between the sources"
        );
        describe_histogram!(
            "dual_extraction_ms",
            Unit::Milliseconds,
            "Wall-clock time of one dual extraction"
        );
        describe_histogram!(
            "page_extraction_ms",
            Unit::Milliseconds,
            "Time to fetch and parse the page once"
        );
        describe_gauge!(
            "indicator_cache_ttl_ms",
            Unit::Milliseconds,
            "Configured result cache TTL"
        );
    });
}

impl Metrics {
    /// Install the Prometheus recorder and publish the cache TTL gauge.
    pub fn init(ttl_ms: u64) -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        ensure_metrics_described();

        // Absolute TTL, no sliding refresh
        gauge!("indicator_cache_ttl_ms").set(ttl_ms as f64);

        Ok(Self { handle })
    }

    /// Router exposing `/metrics` in the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
