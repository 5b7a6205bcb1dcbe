//! # Indicators
//! Value objects shared by the sources, the retry orchestrator and the
//! cross-validation engine.
//!
//! A reading carries up to three indicators. `None` means the source's format
//! does not expose that figure; it is never the same thing as zero.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// The two independent channels a reading can come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Public page of the platform (primary).
    Webhook,
    /// Monitor messages relayed through the Telegram Bot API.
    Telegram,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Webhook => "webhook",
            SourceKind::Telegram => "telegram",
        }
    }

    /// Human label used in recommendations and logs.
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Webhook => "Webhook",
            SourceKind::Telegram => "Telegram",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance tag carried by every reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingSource {
    Webhook,
    TelegramBot,
    DualSourceAverage,
    WebhookPrimary,
    WebhookPrimaryCritical,
    Fallback,
}

/// The closed set of published indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Indicator {
    Participants,
    Revenues,
    Liquidity,
}

impl Indicator {
    pub const ALL: [Indicator; 3] = [
        Indicator::Participants,
        Indicator::Revenues,
        Indicator::Liquidity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Indicator::Participants => "participants",
            Indicator::Revenues => "revenues",
            Indicator::Liquidity => "liquidity",
        }
    }
}

/// One snapshot of the indicators from a single source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorReading {
    #[serde(default, with = "amount")]
    pub participants: Option<f64>,
    #[serde(default, with = "amount")]
    pub revenues: Option<f64>,
    #[serde(default, with = "amount")]
    pub liquidity: Option<f64>,
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
    pub source: ReadingSource,

    /// Liquidity split reported by the monitor feed.
    #[serde(default, with = "amount", skip_serializing_if = "Option::is_none")]
    pub liquidity_usdt: Option<f64>,
    #[serde(default, with = "amount", skip_serializing_if = "Option::is_none")]
    pub liquidity_usdc: Option<f64>,
    /// When the feed message carrying this reading was posted.
    #[serde(default, with = "iso_millis::option", skip_serializing_if = "Option::is_none")]
    pub message_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl IndicatorReading {
    /// New reading stamped with the current time.
    pub fn new(
        source: ReadingSource,
        participants: Option<f64>,
        revenues: Option<f64>,
        liquidity: Option<f64>,
    ) -> Self {
        Self {
            participants,
            revenues,
            liquidity,
            timestamp: Utc::now(),
            source,
            liquidity_usdt: None,
            liquidity_usdc: None,
            message_date: None,
            note: None,
        }
    }

    pub fn value(&self, indicator: Indicator) -> Option<f64> {
        match indicator {
            Indicator::Participants => self.participants,
            Indicator::Revenues => self.revenues,
            Indicator::Liquidity => self.liquidity,
        }
    }

    /// Names of the indicators this reading does not carry.
    pub fn missing(&self) -> Vec<&'static str> {
        Indicator::ALL
            .iter()
            .filter(|i| self.value(**i).is_none())
            .map(|i| i.as_str())
            .collect()
    }

    /// Same values, different provenance tag.
    pub fn retagged(&self, source: ReadingSource) -> Self {
        Self {
            source,
            ..self.clone()
        }
    }
}

/// Last-known-good values bundled with the service, handed out only when
/// every retry against a source has failed.
pub fn fallback_reading() -> IndicatorReading {
    IndicatorReading {
        participants: Some(2_110_192.0),
        revenues: Some(752_040_501.0),
        liquidity: Some(30_463_309.0),
        timestamp: Utc.timestamp_opt(1_761_859_200, 0).single().unwrap_or_default(),
        source: ReadingSource::Fallback,
        liquidity_usdt: None,
        liquidity_usdc: None,
        message_date: None,
        note: Some("Cached data from last successful extraction".to_string()),
    }
}

/// What a source hands back on a successful extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceExtraction {
    pub reading: IndicatorReading,
    pub extraction_time_ms: u64,
    /// Source-specific diagnostics merged into the response metadata.
    pub details: BTreeMap<String, serde_json::Value>,
}

impl SourceExtraction {
    pub fn new(reading: IndicatorReading, extraction_time_ms: u64) -> Self {
        Self {
            reading,
            extraction_time_ms,
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Integral amounts go out as JSON integers, everything else as floats.
pub(crate) mod amount {
    use serde::{Deserialize, Deserializer, Serializer};

    // Largest integer an f64 represents exactly.
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;

    pub fn serialize<S: Serializer>(v: &Option<f64>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            None => s.serialize_none(),
            Some(x) if x.fract() == 0.0 && x.abs() <= MAX_EXACT => s.serialize_i64(*x as i64),
            Some(x) => s.serialize_f64(*x),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Option::<f64>::deserialize(d)
    }
}

/// RFC 3339, UTC, millisecond precision.
pub(crate) mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(dt: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
            match dt {
                Some(dt) => super::serialize(dt, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let raw = Option::<String>::deserialize(d)?;
            raw.map(|r| {
                DateTime::parse_from_rfc3339(&r)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
        }
    }
}
