//! # Retry Orchestrator
//! Bounded, strictly sequential retries with linear backoff around one
//! source's extraction.
//!
//! Attempt `n` that fails is followed by a sleep of `base_delay * n` (when
//! attempts remain). Exhaustion yields a `Failure` that carries the bundled
//! fallback reading, so callers always have something to show.
//!
//! Every step is reported to a [`RetryObserver`]; observers see events but
//! cannot change the outcome.

use std::future::Future;
use std::time::{Duration, Instant};

use metrics::counter;
use tracing::{error, info, warn};

use crate::error::ExtractionError;
use crate::indicators::{fallback_reading, SourceExtraction, SourceKind};
use crate::outcome::ExtractionOutcome;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// A single attempt, no backoff.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// At least one attempt is always made.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Linear backoff after the failed `attempt` (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Observable steps of one orchestrated extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryEvent {
    AttemptStarted {
        source: SourceKind,
        attempt: u32,
        max_attempts: u32,
    },
    AttemptFailed {
        source: SourceKind,
        attempt: u32,
        error: String,
    },
    BackoffScheduled {
        source: SourceKind,
        attempt: u32,
        delay: Duration,
    },
    Succeeded {
        source: SourceKind,
        attempt: u32,
        elapsed: Duration,
    },
    Exhausted {
        source: SourceKind,
        attempts: u32,
        last_error: String,
    },
}

pub trait RetryObserver: Send + Sync {
    fn on_event(&self, event: &RetryEvent);
}

/// Default observer: structured logs plus Prometheus counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryObserver;

impl RetryObserver for TelemetryObserver {
    fn on_event(&self, event: &RetryEvent) {
        match event {
            RetryEvent::AttemptStarted {
                source,
                attempt,
                max_attempts,
            } => {
                info!(%source, attempt, max_attempts, "extraction attempt {attempt}/{max_attempts}");
                counter!("extraction_attempts_total", "source" => source.as_str()).increment(1);
            }
            RetryEvent::AttemptFailed {
                source,
                attempt,
                error,
            } => {
                warn!(%source, attempt, error = %error, "extraction attempt failed");
                counter!("extraction_failures_total", "source" => source.as_str()).increment(1);
            }
            RetryEvent::BackoffScheduled {
                source,
                attempt,
                delay,
            } => {
                warn!(
                    %source,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "attempt {attempt} failed, retrying in {}ms",
                    delay.as_millis()
                );
            }
            RetryEvent::Succeeded {
                source,
                attempt,
                elapsed,
            } => {
                info!(
                    %source,
                    attempt,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "extraction succeeded"
                );
            }
            RetryEvent::Exhausted {
                source,
                attempts,
                last_error,
            } => {
                error!(%source, attempts, last_error = %last_error, "all retry attempts exhausted");
                counter!("extraction_exhausted_total", "source" => source.as_str()).increment(1);
            }
        }
    }
}

struct RetryState {
    attempt: u32,
    last_error: Option<String>,
}

/// Run `operation` up to `policy.attempts()` times, one attempt at a time.
///
/// Never returns an error: a source that keeps failing ends in
/// `ExtractionOutcome::Failure` with the fallback reading attached.
pub async fn run_with_retry<F, Fut>(
    source: SourceKind,
    policy: RetryPolicy,
    observer: &dyn RetryObserver,
    mut operation: F,
) -> ExtractionOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<SourceExtraction, ExtractionError>>,
{
    let max_attempts = policy.attempts();
    let started = Instant::now();
    let mut state = RetryState {
        attempt: 0,
        last_error: None,
    };

    while state.attempt < max_attempts {
        state.attempt += 1;
        let attempt = state.attempt;
        observer.on_event(&RetryEvent::AttemptStarted {
            source,
            attempt,
            max_attempts,
        });

        match operation().await {
            Ok(extraction) => {
                observer.on_event(&RetryEvent::Succeeded {
                    source,
                    attempt,
                    elapsed: started.elapsed(),
                });
                return ExtractionOutcome::Success {
                    source,
                    extraction,
                    attempts: attempt,
                };
            }
            Err(e) => {
                let message = e.to_string();
                observer.on_event(&RetryEvent::AttemptFailed {
                    source,
                    attempt,
                    error: message.clone(),
                });
                state.last_error = Some(message);

                if attempt < max_attempts {
                    let delay = policy.backoff_after(attempt);
                    observer.on_event(&RetryEvent::BackoffScheduled {
                        source,
                        attempt,
                        delay,
                    });
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    let last_error = state
        .last_error
        .unwrap_or_else(|| "All retry attempts failed".to_string());
    observer.on_event(&RetryEvent::Exhausted {
        source,
        attempts: max_attempts,
        last_error: last_error.clone(),
    });

    ExtractionOutcome::Failure {
        source,
        error: last_error,
        fallback_data: Some(fallback_reading()),
        attempts: max_attempts,
    }
}
