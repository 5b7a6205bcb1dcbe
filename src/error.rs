//! Errors raised by indicator sources.
//!
//! The retry orchestrator and the coordinator treat every variant the same
//! way: the message becomes `Failure.error`. The variants exist so fetchers
//! can say *why* they failed and logs stay greppable.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Network, navigation or authentication failure inside a fetcher.
    #[error("{0}")]
    SourceUnavailable(String),

    /// The source answered but the required figures could not be parsed.
    #[error("Incomplete data extraction: {0}")]
    IncompleteExtraction(String),

    /// Parsed figures failed the plausibility check.
    #[error("Suspicious values detected: {0}")]
    Implausible(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Missing credentials or identifiers for the source.
    #[error("Source misconfigured: {0}")]
    Config(String),

    /// The extraction task panicked.
    #[error("{0}")]
    Panicked(String),
}
