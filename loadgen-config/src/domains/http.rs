//! HTTP client configuration

use crate::error::ConfigResult;
use crate::validation::{validate_duration, validate_positive, validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Client settings for talking to the target service. One connection pool
/// is shared by every iteration, so pool sizing bounds real concurrency.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request deadline; expiry counts as a transport failure
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    pub max_redirects: u32,

    pub user_agent: String,

    /// Accept invalid certificates when false, for staging targets
    pub verify_ssl: bool,

    /// Headers sent with every request, e.g. an auth token for the target
    pub default_headers: BTreeMap<String, String>,

    pub pool: PoolConfig,
}

/// Keep-alive pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Idle connections kept per host; should cover the peak VU count
    pub max_idle_per_host: usize,

    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_redirects: 10,
            user_agent: default_user_agent(),
            verify_ssl: true,
            default_headers: BTreeMap::new(),
            pool: PoolConfig::default(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 256,
            idle_timeout: Duration::from_secs(90),
        }
    }
}

impl Validatable for HttpConfig {
    fn validate(&self) -> ConfigResult<()> {
        let domain = self.domain_name();
        validate_duration(self.timeout, "timeout", domain)?;
        validate_duration(self.connect_timeout, "connect_timeout", domain)?;
        validate_required_string(&self.user_agent, "user_agent", domain)?;
        for name in self.default_headers.keys() {
            if name.trim().is_empty() || name.chars().any(|c| c.is_whitespace() || c == ':') {
                return Err(self.validation_error(&format!("invalid header name '{}'", name)));
            }
        }
        validate_positive(self.pool.max_idle_per_host, "pool.max_idle_per_host", domain)?;
        validate_duration(self.pool.idle_timeout, "pool.idle_timeout", domain)
    }

    fn domain_name(&self) -> &'static str {
        "http"
    }
}

fn default_user_agent() -> String {
    format!("loadgen/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_suit_a_shared_pool() {
        let config = HttpConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.user_agent.starts_with("loadgen/"));
        assert!(config.default_headers.is_empty());
        assert!(config.pool.max_idle_per_host >= 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn header_names_are_checked() {
        let mut config = HttpConfig::default();
        config
            .default_headers
            .insert("Authorization".to_string(), "Bearer abc".to_string());
        assert!(config.validate().is_ok());

        config.default_headers.insert("X Bad".to_string(), "1".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeouts_and_pool_are_rejected() {
        let mut config = HttpConfig::default();
        config.connect_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = HttpConfig::default();
        config.pool.max_idle_per_host = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: HttpConfig = serde_yaml::from_str("timeout: 5s\ndefault_headers:\n  X-Run: smoke\n").unwrap();
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.default_headers["X-Run"], "smoke");
        assert_eq!(config.pool.idle_timeout, Duration::from_secs(90));
    }
}
