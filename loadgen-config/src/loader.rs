//! Configuration loading and environment variable handling

use crate::domains::logging::{LogFormat, LogLevel};
use crate::domains::scenario::ArrivalPlan;
use crate::domains::LoadConfig;
use crate::error::{ConfigError, ConfigResult};
use humantime_serde::re::humantime;
use log::debug;
use std::path::Path;
use std::time::Duration;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "LOADGEN".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<LoadConfig> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        self.from_yaml(&content)
    }

    /// Load configuration from YAML text with environment overrides
    pub fn from_yaml(&self, content: &str) -> ConfigResult<LoadConfig> {
        let mut config: LoadConfig = serde_yaml::from_str(content)?;
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<LoadConfig> {
        let mut config = LoadConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<LoadConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    fn apply_env_overrides(&self, config: &mut LoadConfig) -> ConfigResult<()> {
        if let Ok(base_url) = self.get_env_var("BASE_URL") {
            config.target.base_url = base_url;
        }

        if let Some(timeout) = self.parse_duration_var("HTTP_TIMEOUT")? {
            config.http.timeout = timeout;
        }

        if let Ok(user_agent) = self.get_env_var("HTTP_USER_AGENT") {
            config.http.user_agent = user_agent;
        }

        if let Ok(level) = self.get_env_var("LOG_LEVEL") {
            config.logging.level = level
                .parse::<LogLevel>()
                .map_err(|message| self.env_error("LOG_LEVEL", message))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.logging.format = format
                .parse::<LogFormat>()
                .map_err(|message| self.env_error("LOG_FORMAT", message))?;
        }

        if let Some(grace) = self.parse_duration_var("GRACEFUL_STOP")? {
            config.scenario.graceful_stop = grace;
        }

        self.apply_arrival_overrides(&mut config.scenario.arrival)
    }

    fn apply_arrival_overrides(&self, plan: &mut ArrivalPlan) -> ConfigResult<()> {
        let ArrivalPlan::ConstantArrivalRate(plan) = plan else {
            return Ok(());
        };

        if let Ok(rate) = self.get_env_var("RATE") {
            plan.rate = rate
                .parse()
                .map_err(|e: std::num::ParseIntError| self.env_error("RATE", e.to_string()))?;
        }

        if let Some(duration) = self.parse_duration_var("DURATION")? {
            plan.duration = duration;
        }

        if let Ok(vus) = self.get_env_var("PRE_ALLOCATED_VUS") {
            plan.pre_allocated_vus = vus
                .parse()
                .map_err(|e: std::num::ParseIntError| self.env_error("PRE_ALLOCATED_VUS", e.to_string()))?;
        }

        Ok(())
    }

    fn parse_duration_var(&self, name: &str) -> ConfigResult<Option<Duration>> {
        match self.get_env_var(name) {
            Ok(value) => humantime::parse_duration(&value)
                .map(Some)
                .map_err(|e| self.env_error(name, e.to_string())),
            Err(_) => Ok(None),
        }
    }

    fn env_error(&self, name: &str, message: impl Into<String>) -> ConfigError {
        ConfigError::Env {
            var: format!("{}_{}", self.prefix, name),
            message: message.into(),
        }
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
