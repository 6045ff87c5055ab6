//! Tracing subscriber setup

use anyhow::Result;
use loadgen_config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber described by `config`.
///
/// The level (or `level_override`) plus any configured directives form the
/// filter; `RUST_LOG` is only consulted when that cannot be parsed. An
/// already installed subscriber is left in place.
pub fn init_tracing(config: &LoggingConfig, level_override: Option<&str>) -> Result<()> {
    let level = level_override.unwrap_or(config.level.as_str());
    let env_filter = EnvFilter::try_new(config.filter(level))
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    let installed = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };

    if installed.is_err() {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadgen_config::LogLevel;

    #[test]
    fn second_init_does_not_fail() {
        let config = LoggingConfig {
            level: LogLevel::Debug,
            format: LogFormat::Compact,
            include_location: true,
            directives: vec!["loadgen_engine=trace".to_string()],
        };
        init_tracing(&config, None).unwrap();
        init_tracing(&config, Some("warn")).unwrap();
    }
}
