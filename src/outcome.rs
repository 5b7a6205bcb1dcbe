//! Terminal result of one orchestrated extraction against one source.

use serde::ser::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::indicators::{IndicatorReading, SourceExtraction, SourceKind};

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    Success {
        source: SourceKind,
        extraction: SourceExtraction,
        attempts: u32,
    },
    Failure {
        source: SourceKind,
        error: String,
        fallback_data: Option<IndicatorReading>,
        attempts: u32,
    },
}

impl ExtractionOutcome {
    pub fn failure(source: SourceKind, error: impl Into<String>, attempts: u32) -> Self {
        ExtractionOutcome::Failure {
            source,
            error: error.into(),
            fallback_data: None,
            attempts,
        }
    }

    pub fn source(&self) -> SourceKind {
        match self {
            ExtractionOutcome::Success { source, .. } | ExtractionOutcome::Failure { source, .. } => {
                *source
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionOutcome::Success { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            ExtractionOutcome::Success { attempts, .. }
            | ExtractionOutcome::Failure { attempts, .. } => *attempts,
        }
    }

    pub fn reading(&self) -> Option<&IndicatorReading> {
        match self {
            ExtractionOutcome::Success { extraction, .. } => Some(&extraction.reading),
            ExtractionOutcome::Failure { .. } => None,
        }
    }

    pub fn extraction_time_ms(&self) -> Option<u64> {
        match self {
            ExtractionOutcome::Success { extraction, .. } => Some(extraction.extraction_time_ms),
            ExtractionOutcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ExtractionOutcome::Failure { error, .. } => Some(error),
            ExtractionOutcome::Success { .. } => None,
        }
    }

    pub fn fallback_data(&self) -> Option<&IndicatorReading> {
        match self {
            ExtractionOutcome::Failure { fallback_data, .. } => fallback_data.as_ref(),
            ExtractionOutcome::Success { .. } => None,
        }
    }
}

// Wire shape of the single-source endpoints:
//   {"success":true,  "data":{..}, "metadata":{"extraction_time_ms":..,"attempts":..,..details}}
//   {"success":false, "error":"..", "fallback_data":{..}, "metadata":{"attempts":..}}
#[derive(serde::Serialize)]
struct SuccessBody<'a> {
    success: bool,
    data: &'a IndicatorReading,
    metadata: Map<String, Value>,
}

#[derive(serde::Serialize)]
struct FailureBody<'a> {
    success: bool,
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    fallback_data: Option<&'a IndicatorReading>,
    metadata: Map<String, Value>,
}

impl Serialize for ExtractionOutcome {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            ExtractionOutcome::Success {
                source,
                extraction,
                attempts,
            } => {
                let mut metadata: Map<String, Value> = extraction
                    .details
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                metadata.insert(
                    "extraction_time_ms".into(),
                    Value::from(extraction.extraction_time_ms),
                );
                metadata.insert("attempts".into(), Value::from(*attempts));
                metadata
                    .entry("source")
                    .or_insert_with(|| Value::from(source.as_str()));
                SuccessBody {
                    success: true,
                    data: &extraction.reading,
                    metadata,
                }
                .serialize(s)
            }
            ExtractionOutcome::Failure {
                source,
                error,
                fallback_data,
                attempts,
            } => {
                let mut metadata = Map::new();
                metadata.insert("attempts".into(), Value::from(*attempts));
                metadata.insert("source".into(), Value::from(source.as_str()));
                FailureBody {
                    success: false,
                    error,
                    fallback_data: fallback_data.as_ref(),
                    metadata,
                }
                .serialize(s)
            }
        }
    }
}
