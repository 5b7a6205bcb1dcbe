// src/ingest/providers/page.rs
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::histogram;

use crate::error::ExtractionError;
use crate::indicators::{SourceExtraction, SourceKind};
use crate::ingest::parse::{IndicatorParser, PageTextParser};
use crate::ingest::{page_text, types::IndicatorSource};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Values below these floors mean the page served something other than the
/// live counters (placeholder, partial render, different page).
pub const MIN_PLAUSIBLE_PARTICIPANTS: f64 = 1_000_000.0;
pub const MIN_PLAUSIBLE_REVENUES: f64 = 100_000_000.0;

/// Primary source: the platform's public page.
pub struct PageSource {
    mode: Mode,
    parser: PageTextParser,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl PageSource {
    pub fn from_fixture(html: &str) -> Self {
        Self {
            mode: Mode::Fixture(html.to_string()),
            parser: PageTextParser,
        }
    }

    pub fn from_url(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            mode: Mode::Http {
                url: url.into(),
                client,
            },
            parser: PageTextParser,
        })
    }

    async fn fetch_body(&self) -> Result<String, ExtractionError> {
        match &self.mode {
            Mode::Fixture(s) => Ok(s.clone()),
            Mode::Http { url, client } => {
                if url.trim().is_empty() {
                    return Err(ExtractionError::Config("page url is not set".into()));
                }
                let resp = client.get(url).send().await?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(ExtractionError::SourceUnavailable(format!(
                        "page responded with HTTP {status}"
                    )));
                }
                Ok(resp.text().await?)
            }
        }
    }

    fn fetcher(&self) -> &'static str {
        match self.mode {
            Mode::Fixture(_) => "fixture",
            Mode::Http { .. } => "http",
        }
    }
}

#[async_trait]
impl IndicatorSource for PageSource {
    async fn extract(&self) -> Result<SourceExtraction, ExtractionError> {
        let t0 = Instant::now();
        let body = self.fetch_body().await?;
        let text = page_text(&body);
        tracing::debug!(text_len = text.len(), "page content extracted");

        let reading = self.parser.parse(&text);
        let (participants, revenues, liquidity) = match &reading {
            Some(r) => (r.participants, r.revenues, r.liquidity),
            None => (None, None, None),
        };

        // All three figures must be on the page.
        let (reading, p, r) = match (reading, participants, revenues, liquidity) {
            (Some(reading), Some(p), Some(r), Some(_)) => (reading, p, r),
            _ => {
                return Err(ExtractionError::IncompleteExtraction(format!(
                    "participants={participants:?}, revenues={revenues:?}, liquidity={liquidity:?}"
                )))
            }
        };

        if p < MIN_PLAUSIBLE_PARTICIPANTS || r < MIN_PLAUSIBLE_REVENUES {
            return Err(ExtractionError::Implausible(format!(
                "participants={p}, revenues={r}"
            )));
        }

        let elapsed_ms = t0.elapsed().as_millis() as u64;
        histogram!("page_extraction_ms").record(elapsed_ms as f64);

        let mut extraction =
            SourceExtraction::new(reading, elapsed_ms).with_detail("fetcher", self.fetcher());
        if let Mode::Http { url, .. } = &self.mode {
            extraction = extraction.with_detail("url", url.as_str());
        }
        Ok(extraction)
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Webhook
    }

    fn name(&self) -> &'static str {
        "page"
    }
}
