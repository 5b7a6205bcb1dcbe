//! # Cross-Validation Engine
//! Pure logic that maps `(primary outcome, secondary outcome)` → `PublishedResult`.
//! No I/O besides logs and counters.
//!
//! Policy: when both sources answered, the largest per-indicator divergence
//! decides the trust level. Agreement publishes the mean; disagreement
//! publishes the primary reading tagged with its severity. One answer is
//! published as-is, none is a failure.

use std::time::Instant;

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize, Serializer};
use tracing::{error, info, warn};

use crate::indicators::{Indicator, IndicatorReading, ReadingSource, SourceKind};
use crate::outcome::ExtractionOutcome;

/// Below this (strictly) both sources are considered in agreement.
pub const VERIFIED_THRESHOLD_PCT: f64 = 1.0;
/// Below this (strictly) the divergence is moderate.
pub const WARNING_THRESHOLD_PCT: f64 = 5.0;
/// Reported for an indicator that one side does not carry.
pub const MISSING_DIVERGENCE_PCT: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Verified,
    Warning,
    Critical,
    SingleSource,
    Failed,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Verified => "VERIFIED",
            ValidationStatus::Warning => "WARNING",
            ValidationStatus::Critical => "CRITICAL",
            ValidationStatus::SingleSource => "SINGLE_SOURCE",
            ValidationStatus::Failed => "FAILED",
        }
    }

    /// Half-open bands: `[0,1)` verified, `[1,5)` warning, `[5,∞)` critical.
    pub fn from_max_divergence(max_pct: f64) -> Self {
        if max_pct < VERIFIED_THRESHOLD_PCT {
            ValidationStatus::Verified
        } else if max_pct < WARNING_THRESHOLD_PCT {
            ValidationStatus::Warning
        } else {
            ValidationStatus::Critical
        }
    }
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Relative divergence in percent of the larger value, two decimals.
pub fn divergence(a: Option<f64>, b: Option<f64>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) if a > 0.0 && b > 0.0 => {
            let max = a.max(b);
            let min = a.min(b);
            round2((max - min) / max * 100.0)
        }
        _ => MISSING_DIVERGENCE_PCT,
    }
}

fn serialize_pct<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
    if v.fract() == 0.0 {
        s.serialize_i64(*v as i64)
    } else {
        s.serialize_f64(*v)
    }
}

fn serialize_opt_pct<S: Serializer>(v: &Option<f64>, s: S) -> Result<S::Ok, S::Error> {
    match v {
        Some(v) => serialize_pct(v, s),
        None => s.serialize_none(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DivergenceReport {
    #[serde(serialize_with = "serialize_pct")]
    pub participants_pct: f64,
    #[serde(serialize_with = "serialize_pct")]
    pub revenues_pct: f64,
    #[serde(serialize_with = "serialize_pct")]
    pub liquidity_pct: f64,
}

impl DivergenceReport {
    pub fn between(a: &IndicatorReading, b: &IndicatorReading) -> Self {
        let d = |i: Indicator| divergence(a.value(i), b.value(i));
        Self {
            participants_pct: d(Indicator::Participants),
            revenues_pct: d(Indicator::Revenues),
            liquidity_pct: d(Indicator::Liquidity),
        }
    }

    pub fn get(&self, indicator: Indicator) -> f64 {
        match indicator {
            Indicator::Participants => self.participants_pct,
            Indicator::Revenues => self.revenues_pct,
            Indicator::Liquidity => self.liquidity_pct,
        }
    }

    pub fn max(&self) -> f64 {
        Indicator::ALL
            .iter()
            .map(|i| self.get(*i))
            .fold(0.0, f64::max)
    }
}

/// A source's raw reading as it was before reconciliation, with timings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceAudit {
    #[serde(flatten)]
    pub reading: IndicatorReading,
    pub extraction_time_ms: u64,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: SourceKind,
    pub error: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub sources_used: Vec<SourceKind>,
    pub status: ValidationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub divergence: Option<DivergenceReport>,
    #[serde(
        default,
        serialize_with = "serialize_opt_pct",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_divergence_pct: Option<f64>,
    pub webhook_data: Option<SourceAudit>,
    pub telegram_data: Option<SourceAudit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<SourceFailure>,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub validation_time_ms: u64,
    pub extraction_time_ms: u64,
    pub total_extraction_time_ms: u64,
    pub single_source: bool,
    #[serde(default)]
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_age_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_request_time_ms: Option<u64>,
}

/// What the dual endpoint publishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedResult {
    pub success: bool,
    pub data: Option<IndicatorReading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub validation: Validation,
    pub metadata: ResultMetadata,
}

impl PublishedResult {
    pub fn status(&self) -> ValidationStatus {
        self.validation.status
    }

    /// Copy served from cache, stamped with its age.
    pub fn served_from_cache(&self, age_ms: u64) -> Self {
        let mut out = self.clone();
        out.metadata.cached = true;
        out.metadata.cache_age_ms = Some(age_ms);
        out
    }
}

fn audit_of(outcome: &ExtractionOutcome) -> Option<SourceAudit> {
    match outcome {
        ExtractionOutcome::Success {
            extraction,
            attempts,
            ..
        } => Some(SourceAudit {
            reading: extraction.reading.clone(),
            extraction_time_ms: extraction.extraction_time_ms,
            attempts: *attempts,
        }),
        ExtractionOutcome::Failure { .. } => None,
    }
}

fn failure_of(outcome: &ExtractionOutcome) -> Option<SourceFailure> {
    match outcome {
        ExtractionOutcome::Failure {
            source,
            error,
            attempts,
            ..
        } => Some(SourceFailure {
            source: *source,
            error: error.clone(),
            attempts: *attempts,
        }),
        ExtractionOutcome::Success { .. } => None,
    }
}

/// Per-indicator mean rounded to an integer, stamped now.
fn averaged(a: &IndicatorReading, b: &IndicatorReading) -> IndicatorReading {
    let mean = |i: Indicator| match (a.value(i), b.value(i)) {
        (Some(x), Some(y)) => Some(((x + y) / 2.0).round()),
        (x, y) => x.or(y),
    };
    IndicatorReading::new(
        ReadingSource::DualSourceAverage,
        mean(Indicator::Participants),
        mean(Indicator::Revenues),
        mean(Indicator::Liquidity),
    )
}

/// Reconcile the page outcome (`primary`) with the feed outcome (`secondary`).
pub fn reconcile(primary: &ExtractionOutcome, secondary: &ExtractionOutcome) -> PublishedResult {
    let t0 = Instant::now();
    let outcomes = [primary, secondary];

    // 1) Audit trail: who answered, who failed, how long it took
    let audit_for = |kind: SourceKind| {
        outcomes
            .iter()
            .find(|o| o.source() == kind)
            .and_then(|o| audit_of(o))
    };
    let webhook_data = audit_for(SourceKind::Webhook);
    let telegram_data = audit_for(SourceKind::Telegram);
    let failures: Vec<SourceFailure> = outcomes.iter().filter_map(|o| failure_of(o)).collect();
    let sources_used: Vec<SourceKind> = outcomes
        .iter()
        .filter(|o| o.is_success())
        .map(|o| o.source())
        .collect();
    let times: Vec<u64> = outcomes
        .iter()
        .filter_map(|o| o.extraction_time_ms())
        .collect();

    // 2) Status, published data and recommendation
    let mut divergence_report = None;
    let mut max_divergence_pct = None;
    let (status, data, recommendation) = match (primary.reading(), secondary.reading()) {
        (None, None) => (
            ValidationStatus::Failed,
            None,
            "All extraction sources failed - check system status".to_string(),
        ),
        (Some(p), None) => (
            ValidationStatus::SingleSource,
            Some(p.clone()),
            format!(
                "Only {} data available - {} extraction failed",
                primary.source().label(),
                secondary.source().label()
            ),
        ),
        (None, Some(s)) => (
            ValidationStatus::SingleSource,
            Some(s.clone()),
            format!(
                "Only {} data available - {} extraction failed",
                secondary.source().label(),
                primary.source().label()
            ),
        ),
        (Some(p), Some(s)) => {
            let report = DivergenceReport::between(p, s);
            let max = report.max();
            divergence_report = Some(report);
            max_divergence_pct = Some(max);
            histogram!("validation_max_divergence_pct").record(max);

            match ValidationStatus::from_max_divergence(max) {
                ValidationStatus::Verified => (
                    ValidationStatus::Verified,
                    Some(averaged(p, s)),
                    "Data validated across both sources - high confidence".to_string(),
                ),
                ValidationStatus::Warning => (
                    ValidationStatus::Warning,
                    Some(p.retagged(ReadingSource::WebhookPrimary)),
                    format!("Moderate divergence detected (max {max:.2}%) - review recommended"),
                ),
                _ => (
                    ValidationStatus::Critical,
                    Some(p.retagged(ReadingSource::WebhookPrimaryCritical)),
                    format!(
                        "CRITICAL: Significant divergence detected (max {max:.2}%) - investigation required. \
                         Possible data manipulation or source error."
                    ),
                ),
            }
        }
    };

    // 3) Observability
    counter!("validation_status_total", "status" => status.as_str()).increment(1);
    match status {
        ValidationStatus::Verified => {
            info!(status = %status, max_divergence_pct = ?max_divergence_pct, "dual-source validation passed")
        }
        ValidationStatus::Warning => {
            warn!(status = %status, max_divergence_pct = ?max_divergence_pct, "moderate divergence between sources")
        }
        ValidationStatus::SingleSource => {
            warn!(status = %status, sources_used = ?sources_used, "only one source available")
        }
        ValidationStatus::Critical => error!(
            status = %status,
            max_divergence_pct = ?max_divergence_pct,
            divergence = ?divergence_report,
            "critical divergence between sources"
        ),
        ValidationStatus::Failed => error!(status = %status, "both sources failed"),
    }

    let success = status != ValidationStatus::Failed;
    PublishedResult {
        success,
        data,
        error: (!success).then(|| "Both sources failed".to_string()),
        validation: Validation {
            sources_used,
            status,
            divergence: divergence_report,
            max_divergence_pct,
            webhook_data,
            telegram_data,
            failures,
            recommendation,
        },
        metadata: ResultMetadata {
            validation_time_ms: t0.elapsed().as_millis() as u64,
            extraction_time_ms: times.iter().copied().max().unwrap_or(0),
            total_extraction_time_ms: times.iter().sum(),
            single_source: status == ValidationStatus::SingleSource,
            cached: false,
            cache_age_ms: None,
            total_request_time_ms: None,
        },
    }
}
