//! # Dual-Source Coordinator
//! Runs the page and feed extractions side by side, each behind its own retry
//! policy, and waits for both to settle before reconciling.
//!
//! Both futures are polled on the calling task (`tokio::join!`); a backoff
//! sleep in one never holds up the other. A panicking source is contained to
//! its own attempt and reported as a failure.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use metrics::histogram;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::error::ExtractionError;
use crate::indicators::SourceKind;
use crate::ingest::types::IndicatorSource;
use crate::outcome::ExtractionOutcome;
use crate::retry::{run_with_retry, RetryObserver, RetryPolicy, TelemetryObserver};
use crate::validation::{reconcile, PublishedResult};

/// Both settled outcomes of one dual run.
#[derive(Debug, Clone)]
pub struct DualExtraction {
    pub primary: ExtractionOutcome,
    pub secondary: ExtractionOutcome,
    /// Wall-clock time until both settled.
    pub elapsed: Duration,
}

pub struct DualSourceCoordinator {
    primary: Arc<dyn IndicatorSource>,
    secondary: Arc<dyn IndicatorSource>,
    primary_policy: RetryPolicy,
    secondary_policy: RetryPolicy,
    observer: Arc<dyn RetryObserver>,
}

impl DualSourceCoordinator {
    /// `primary` is the page source, `secondary` the feed.
    pub fn new(primary: Arc<dyn IndicatorSource>, secondary: Arc<dyn IndicatorSource>) -> Self {
        Self {
            primary,
            secondary,
            primary_policy: RetryPolicy::default(),
            secondary_policy: RetryPolicy::once(),
            observer: Arc::new(TelemetryObserver),
        }
    }

    pub fn with_policies(mut self, primary: RetryPolicy, secondary: RetryPolicy) -> Self {
        self.primary_policy = primary;
        self.secondary_policy = secondary;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn primary_policy(&self) -> RetryPolicy {
        self.primary_policy
    }

    pub fn secondary_policy(&self) -> RetryPolicy {
        self.secondary_policy
    }

    /// Connect both sources. Failures are logged; a source that cannot
    /// connect now will try again lazily on extraction.
    pub async fn connect_all(&self) {
        for source in [&self.primary, &self.secondary] {
            match source.connect().await {
                Ok(()) => info!(source = source.name(), "source ready"),
                Err(e) => warn!(source = source.name(), error = %e, "source failed to connect"),
            }
        }
    }

    pub async fn disconnect_all(&self) {
        self.primary.disconnect().await;
        self.secondary.disconnect().await;
    }

    async fn orchestrated(
        &self,
        source: &Arc<dyn IndicatorSource>,
        policy: RetryPolicy,
    ) -> ExtractionOutcome {
        let kind = source.kind();
        run_with_retry(kind, policy, self.observer.as_ref(), || {
            let source = Arc::clone(source);
            async move {
                match AssertUnwindSafe(source.extract()).catch_unwind().await {
                    Ok(result) => result,
                    Err(payload) => {
                        let message = panic_message(payload.as_ref(), kind);
                        error!(%kind, panic = %message, "source panicked during extraction");
                        Err(ExtractionError::Panicked(message))
                    }
                }
            }
        })
        .await
    }

    /// Both extractions concurrently; returns once both have settled.
    pub async fn extract_dual(&self) -> DualExtraction {
        let t0 = Instant::now();
        info!("starting dual-source extraction");

        let (primary, secondary) = tokio::join!(
            self.orchestrated(&self.primary, self.primary_policy),
            self.orchestrated(&self.secondary, self.secondary_policy),
        );

        let elapsed = t0.elapsed();
        histogram!("dual_extraction_ms").record(elapsed.as_millis() as f64);
        info!(
            elapsed_ms = elapsed.as_millis() as u64,
            primary_ok = primary.is_success(),
            secondary_ok = secondary.is_success(),
            "dual-source extraction settled"
        );

        DualExtraction {
            primary,
            secondary,
            elapsed,
        }
    }

    /// Dual extraction followed by reconciliation.
    pub async fn run_dual(&self) -> PublishedResult {
        let t0 = Instant::now();
        let dual = self.extract_dual().await;
        let mut result = reconcile(&dual.primary, &dual.secondary);
        result.metadata.extraction_time_ms = dual.elapsed.as_millis() as u64;
        result.metadata.total_request_time_ms = Some(t0.elapsed().as_millis() as u64);
        result
    }

    /// Orchestrated extraction of a single source.
    pub async fn extract_one(&self, kind: SourceKind) -> ExtractionOutcome {
        if self.primary.kind() == kind {
            self.orchestrated(&self.primary, self.primary_policy).await
        } else if self.secondary.kind() == kind {
            self.orchestrated(&self.secondary, self.secondary_policy).await
        } else {
            ExtractionOutcome::failure(kind, format!("No {} source configured", kind.label()), 0)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send), kind: SourceKind) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        format!("{} extraction failed", kind.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{IndicatorReading, ReadingSource, SourceExtraction};
    use crate::validation::ValidationStatus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    enum Script {
        Ok(f64),
        Fail,
        Panic,
    }

    struct Scripted {
        kind: SourceKind,
        delay: Duration,
        script: Script,
        calls: AtomicU32,
        finished_at: Mutex<Option<Instant>>,
    }

    impl Scripted {
        fn new(kind: SourceKind, delay_ms: u64, script: Script) -> Arc<Self> {
            Arc::new(Self {
                kind,
                delay: Duration::from_millis(delay_ms),
                script,
                calls: AtomicU32::new(0),
                finished_at: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl IndicatorSource for Scripted {
        async fn extract(&self) -> Result<SourceExtraction, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            *self.finished_at.lock().unwrap() = Some(Instant::now());
            let tag = match self.kind {
                SourceKind::Webhook => ReadingSource::Webhook,
                SourceKind::Telegram => ReadingSource::TelegramBot,
            };
            match self.script {
                Script::Ok(v) => Ok(SourceExtraction::new(
                    IndicatorReading::new(tag, Some(v), Some(v), Some(v)),
                    self.delay.as_millis() as u64,
                )),
                Script::Fail => Err(ExtractionError::SourceUnavailable("scripted failure".into())),
                Script::Panic => panic!("source exploded"),
            }
        }

        fn kind(&self) -> SourceKind {
            self.kind
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failing_primary_does_not_delay_secondary() {
        let a = Scripted::new(SourceKind::Webhook, 50, Script::Fail);
        let b = Scripted::new(SourceKind::Telegram, 100, Script::Ok(42.0));
        let coord = DualSourceCoordinator::new(a.clone(), b.clone()).with_policies(
            RetryPolicy::new(3, Duration::from_millis(2_000)),
            RetryPolicy::once(),
        );

        let t0 = Instant::now();
        let result = coord.run_dual().await;

        assert_eq!(result.status(), ValidationStatus::SingleSource);
        assert_eq!(result.data.as_ref().unwrap().participants, Some(42.0));
        assert_eq!(a.calls.load(Ordering::SeqCst), 3);
        let b_done = b.finished_at.lock().unwrap().unwrap();
        assert_eq!(b_done - t0, Duration::from_millis(100));
        // A: 3 x 50ms of work plus 2s + 4s of backoff
        assert!(result.metadata.extraction_time_ms >= 6_150);
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_is_the_slower_source_not_the_sum() {
        let a = Scripted::new(SourceKind::Webhook, 300, Script::Ok(10.0));
        let b = Scripted::new(SourceKind::Telegram, 500, Script::Ok(10.0));
        let coord = DualSourceCoordinator::new(a, b);

        let dual = coord.extract_dual().await;
        assert!(dual.primary.is_success() && dual.secondary.is_success());
        assert!(dual.elapsed >= Duration::from_millis(500));
        assert!(dual.elapsed < Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_source_is_normalized_to_failure() {
        let a = Scripted::new(SourceKind::Webhook, 10, Script::Ok(10.0));
        let b = Scripted::new(SourceKind::Telegram, 10, Script::Panic);
        let coord = DualSourceCoordinator::new(a, b);

        let dual = coord.extract_dual().await;
        assert!(dual.primary.is_success());
        assert_eq!(dual.secondary.error(), Some("source exploded"));
        assert_eq!(dual.secondary.source(), SourceKind::Telegram);
    }

    #[tokio::test(start_paused = true)]
    async fn extract_one_picks_by_kind() {
        let a = Scripted::new(SourceKind::Webhook, 10, Script::Ok(1.0));
        let b = Scripted::new(SourceKind::Telegram, 10, Script::Ok(2.0));
        let coord = DualSourceCoordinator::new(a.clone(), b.clone());

        let out = coord.extract_one(SourceKind::Telegram).await;
        assert_eq!(out.reading().unwrap().participants, Some(2.0));
        assert_eq!(a.calls.load(Ordering::SeqCst), 0);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn non_string_panic_payload_gets_default_message() {
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(
            panic_message(payload.as_ref(), SourceKind::Webhook),
            "Webhook extraction failed"
        );
    }
}
