// src/ingest/types.rs
use async_trait::async_trait;

use crate::error::ExtractionError;
use crate::indicators::{SourceExtraction, SourceKind};

/// A capability that produces one reading from one remote channel.
///
/// Constructed once at startup and injected into the coordinator. The owner
/// drives `connect` / `disconnect`; `extract` may connect lazily.
#[async_trait]
pub trait IndicatorSource: Send + Sync {
    async fn extract(&self) -> Result<SourceExtraction, ExtractionError>;

    fn kind(&self) -> SourceKind;

    fn name(&self) -> &'static str;

    async fn connect(&self) -> Result<(), ExtractionError> {
        Ok(())
    }

    async fn disconnect(&self) {}
}
