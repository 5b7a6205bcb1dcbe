use std::path::Path;
use std::time::Duration;

use indicator_crosscheck::{RetryPolicy, ServiceConfig};

#[test]
fn shipped_config_matches_builtin_defaults() {
    let cfg = ServiceConfig::load_from_file(Path::new("config/service.toml"))
        .expect("config/service.toml should parse");
    assert_eq!(cfg, ServiceConfig::default());
}

#[test]
fn defaults_describe_the_documented_policies() {
    let cfg = ServiceConfig::default();
    assert_eq!(cfg.cache_ttl(), Duration::from_millis(300_000));
    assert_eq!(cfg.retry_policy(), RetryPolicy::default());
    assert_eq!(cfg.telegram_retry_policy().attempts(), 1);
    assert_eq!(cfg.rate_limit_window(), Duration::from_secs(3_600));
    assert_eq!(cfg.rate_limit_max_requests, 60);
    assert!(cfg.api_key.is_none());
}

#[test]
fn malformed_toml_is_an_error() {
    assert!(ServiceConfig::from_toml_str("cache_ttl_ms = \"soon\"").is_err());
}
