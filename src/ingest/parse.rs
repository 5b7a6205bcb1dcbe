// src/ingest/parse.rs
//! Text-to-indicator parsers, one per source format.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::indicators::{IndicatorReading, ReadingSource};

/// `raw text -> reading`, or `None` when the text carries nothing usable.
pub trait IndicatorParser: Send + Sync {
    fn parse(&self, raw: &str) -> Option<IndicatorReading>;
}

/// "2,110,192" -> 2110192.0, "22,137,315.46" -> 22137315.46
pub fn parse_number(s: &str) -> Option<f64> {
    let cleaned: String = s.chars().filter(|c| *c != ',').collect();
    cleaned
        .trim_end_matches('.')
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

static RE_PARTICIPANTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Participants\s+(\d{1,3}(?:,\d{3})*)").expect("participants regex"));
static RE_PARTICIPANT_INCOME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Participant income\s+(\d{1,3}(?:,\d{3})*)\s+USDT").expect("income regex")
});
static RE_LIQUIDITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Liquidity\s+(\d{1,3}(?:,\d{3})*)\s+USDT").expect("liquidity regex")
});

/// Figures as laid out on the platform's intro page.
#[derive(Debug, Default, Clone, Copy)]
pub struct PageTextParser;

impl IndicatorParser for PageTextParser {
    fn parse(&self, raw: &str) -> Option<IndicatorReading> {
        let capture = |re: &Regex| {
            re.captures(raw)
                .and_then(|c| c.get(1))
                .and_then(|m| parse_number(m.as_str()))
        };
        let participants = capture(&RE_PARTICIPANTS);
        let revenues = capture(&RE_PARTICIPANT_INCOME);
        let liquidity = capture(&RE_LIQUIDITY);

        if participants.is_none() && revenues.is_none() && liquidity.is_none() {
            return None;
        }
        Some(IndicatorReading::new(
            ReadingSource::Webhook,
            participants,
            revenues,
            liquidity,
        ))
    }
}

// Monitor message layout:
//   💧 Liquidez: 22,137,315.46 USDT
//   💧 Liquidez: 6,185,201.04 USDC
//   🔢 Total: 28,322,516.50
static RE_LIQ_USDT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)💧\s*Liquidez:\s*([\d,.]+)\s*USDT").expect("usdt regex"));
static RE_LIQ_USDC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)💧\s*Liquidez:\s*([\d,.]+)\s*USDC").expect("usdc regex"));
static RE_TOTAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)🔢\s*Total:\s*([\d,.]+)").expect("total regex"));

/// Liquidity monitor messages. They never carry participants or revenues.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonitorMessageParser;

impl IndicatorParser for MonitorMessageParser {
    fn parse(&self, raw: &str) -> Option<IndicatorReading> {
        let capture = |re: &Regex| {
            re.captures(raw)
                .and_then(|c| c.get(1))
                .and_then(|m| parse_number(m.as_str()))
        };

        let total = capture(&RE_TOTAL).filter(|t| *t > 0.0)?;

        let mut reading = IndicatorReading::new(ReadingSource::TelegramBot, None, None, Some(total));
        reading.liquidity_usdt = capture(&RE_LIQ_USDT);
        reading.liquidity_usdc = capture(&RE_LIQ_USDC);
        Some(reading)
    }
}
