//! Client-side view of the HTTP configuration

use loadgen_config::HttpConfig as ConfigHttpConfig;
use std::collections::BTreeMap;
use std::time::Duration;

/// Settings a [`HttpManager`](crate::HttpManager) is built from
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub max_redirects: u32,
    pub user_agent: String,
    pub verify_ssl: bool,
    /// Sent with every request; per-request headers of the same name win
    pub default_headers: BTreeMap<String, String>,
    pub max_idle_per_host: usize,
    pub idle_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        ConfigHttpConfig::default().into()
    }
}

impl From<ConfigHttpConfig> for HttpConfig {
    fn from(config: ConfigHttpConfig) -> Self {
        Self {
            timeout: config.timeout,
            connect_timeout: config.connect_timeout,
            max_redirects: config.max_redirects,
            user_agent: config.user_agent,
            verify_ssl: config.verify_ssl,
            default_headers: config.default_headers,
            max_idle_per_host: config.pool.max_idle_per_host,
            idle_timeout: config.pool.idle_timeout,
        }
    }
}
