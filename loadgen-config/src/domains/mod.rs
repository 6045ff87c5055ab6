//! Domain-specific configuration modules

pub mod fixtures;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod reservation;
pub mod scenario;
pub mod target;

use crate::error::{ConfigError, ConfigResult};
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Complete run configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoadConfig {
    pub scenario: scenario::ScenarioConfig,

    pub target: target::TargetConfig,

    pub http: http::HttpConfig,

    pub logging: logging::LoggingConfig,

    pub metrics: metrics::MetricsConfig,

    /// Threshold expressions keyed by metric name, e.g. `http_req_duration: ["p(95)<2000"]`
    pub thresholds: BTreeMap<String, Vec<String>>,

    pub fixtures: fixtures::FixturesConfig,

    pub reservation: reservation::ReservationConfig,
}

impl LoadConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.scenario.validate()?;
        self.target.validate()?;
        self.http.validate()?;
        self.logging.validate()?;
        self.metrics.validate()?;
        self.fixtures.validate()?;
        self.reservation.validate()?;

        for pool in [&self.reservation.user_pool, &self.reservation.concert_pool] {
            if self.fixtures.get(pool).is_none() {
                return Err(ConfigError::DomainError {
                    domain: "reservation".to_string(),
                    message: format!("references undefined fixture pool '{}'", pool),
                });
            }
        }

        for (metric, expressions) in &self.thresholds {
            if expressions.iter().any(|e| e.trim().is_empty()) {
                return Err(ConfigError::DomainError {
                    domain: "thresholds".to_string(),
                    message: format!("empty threshold expression for '{}'", metric),
                });
            }
        }

        Ok(())
    }

    /// Sample configuration reproducing the reference reservation run
    pub fn sample() -> Self {
        let mut config = LoadConfig::default();
        config.thresholds.insert(
            "http_req_duration".to_string(),
            vec!["p(95)<2000".to_string()],
        );
        config
            .thresholds
            .insert("http_req_failed".to_string(), vec!["rate<0.01".to_string()]);
        config
    }

    /// Render the sample configuration as YAML
    pub fn generate_sample() -> String {
        serde_yaml::to_string(&Self::sample())
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
