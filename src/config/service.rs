// src/config/service.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

const ENV_PATH: &str = "SERVICE_CONFIG_PATH";
const DEFAULT_PATH: &str = "config/service.toml";

/// Runtime settings: defaults <- optional TOML file <- environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub cache_ttl_ms: u64,
    /// Attempts against the page source.
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Attempts against the feed source.
    pub telegram_max_attempts: u32,
    pub api_key: Option<String>,
    pub rate_limit_window_ms: u64,
    pub rate_limit_max_requests: u32,
    /// Key rate limits on `X-Forwarded-For`; only behind a proxy that sets it.
    pub trust_forwarded_for: bool,
    pub page_url: String,
    pub fetch_timeout_ms: u64,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub telegram_message_limit: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 300_000,
            max_retries: 3,
            retry_delay_ms: 2_000,
            telegram_max_attempts: 1,
            api_key: None,
            rate_limit_window_ms: 3_600_000,
            rate_limit_max_requests: 60,
            trust_forwarded_for: false,
            page_url: "https://bitnest.me/intro".to_string(),
            fetch_timeout_ms: 30_000,
            telegram_bot_token: None,
            telegram_chat_id: None,
            telegram_message_limit: 20,
        }
    }
}

impl ServiceConfig {
    /// Load using env var + fallbacks, then apply environment overrides:
    /// 1) $SERVICE_CONFIG_PATH
    /// 2) config/service.toml
    /// 3) built-in defaults
    pub fn load() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("SERVICE_CONFIG_PATH points to non-existent path"));
            }
            Self::load_from_file(&pb)?
        } else if Path::new(DEFAULT_PATH).exists() {
            Self::load_from_file(Path::new(DEFAULT_PATH))?
        } else {
            Self::default()
        };
        cfg.apply_overrides(|k| std::env::var(k).ok());
        Ok(cfg)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading service config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Environment overrides. `lookup` is `std::env::var` in production.
    /// Unparsable numbers are skipped with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        fn num<T: std::str::FromStr>(key: &str, raw: Option<String>, slot: &mut T) {
            if let Some(raw) = raw {
                match raw.parse::<T>() {
                    Ok(v) => *slot = v,
                    Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable config value"),
                }
            }
        }

        num("CACHE_TTL_MS", get("CACHE_TTL_MS"), &mut self.cache_ttl_ms);
        num("MAX_RETRIES", get("MAX_RETRIES"), &mut self.max_retries);
        num("RETRY_DELAY_MS", get("RETRY_DELAY_MS"), &mut self.retry_delay_ms);
        num(
            "TELEGRAM_MAX_ATTEMPTS",
            get("TELEGRAM_MAX_ATTEMPTS"),
            &mut self.telegram_max_attempts,
        );
        num(
            "RATE_LIMIT_WINDOW_MS",
            get("RATE_LIMIT_WINDOW_MS"),
            &mut self.rate_limit_window_ms,
        );
        num(
            "RATE_LIMIT_MAX_REQUESTS",
            get("RATE_LIMIT_MAX_REQUESTS"),
            &mut self.rate_limit_max_requests,
        );
        num(
            "TRUST_FORWARDED_FOR",
            get("TRUST_FORWARDED_FOR"),
            &mut self.trust_forwarded_for,
        );
        num("FETCH_TIMEOUT_MS", get("FETCH_TIMEOUT_MS"), &mut self.fetch_timeout_ms);
        num(
            "TELEGRAM_MESSAGE_LIMIT",
            get("TELEGRAM_MESSAGE_LIMIT"),
            &mut self.telegram_message_limit,
        );

        if let Some(v) = get("SERVICE_API_KEY").or_else(|| get("BITNEST_API_KEY")) {
            self.api_key = Some(v);
        }
        if let Some(v) = get("PAGE_URL") {
            self.page_url = v;
        }
        if let Some(v) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram_bot_token = Some(v);
        }
        if let Some(v) = get("TELEGRAM_CHAT_ID").or_else(|| get("TELEGRAM_BITNEST_CHANNEL")) {
            self.telegram_chat_id = Some(v);
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn telegram_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.telegram_max_attempts,
            Duration::from_millis(self.retry_delay_ms),
        )
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}
