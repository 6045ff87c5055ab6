//! Fixture pool definitions

use crate::error::{ConfigError, ConfigResult};
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Named fixture pools, materialized once per run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FixturesConfig {
    pub pools: BTreeMap<String, FixtureSource>,
}

/// Where the values of a fixture pool come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FixtureSource {
    /// Inclusive integer range
    Range { start: u64, end: u64 },

    /// Explicit list of values
    Values { values: Vec<u64> },

    /// JSON file holding an array of integers
    File { path: PathBuf },
}

impl FixtureSource {
    /// Materialize the pool values
    pub fn load(&self) -> ConfigResult<Vec<u64>> {
        match self {
            FixtureSource::Range { start, end } => Ok((*start..=*end).collect()),
            FixtureSource::Values { values } => Ok(values.clone()),
            FixtureSource::File { path } => {
                let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
                    path: path.clone(),
                    source,
                })?;
                serde_json::from_str(&content).map_err(|source| ConfigError::FixtureFile {
                    path: path.clone(),
                    source,
                })
            }
        }
    }
}

impl FixturesConfig {
    pub fn get(&self, name: &str) -> Option<&FixtureSource> {
        self.pools.get(name)
    }
}

impl Default for FixturesConfig {
    fn default() -> Self {
        let mut pools = BTreeMap::new();
        pools.insert("users".to_string(), FixtureSource::Range { start: 1, end: 1000 });
        pools.insert(
            "concerts".to_string(),
            FixtureSource::Values {
                values: vec![101, 202, 303, 404, 505],
            },
        );
        Self { pools }
    }
}

impl Validatable for FixturesConfig {
    fn validate(&self) -> ConfigResult<()> {
        for (name, source) in &self.pools {
            let empty = match source {
                FixtureSource::Range { start, end } => start > end,
                FixtureSource::Values { values } => values.is_empty(),
                FixtureSource::File { path } => path.as_os_str().is_empty(),
            };
            if empty {
                return Err(ConfigError::DomainError {
                    domain: self.domain_name().to_string(),
                    message: format!("fixture pool '{}' is empty", name),
                });
            }
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "fixtures"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_range_and_values() {
        let range = FixtureSource::Range { start: 1, end: 5 };
        assert_eq!(range.load().unwrap(), vec![1, 2, 3, 4, 5]);

        let values = FixtureSource::Values { values: vec![101, 202] };
        assert_eq!(values.load().unwrap(), vec![101, 202]);
    }

    #[test]
    fn test_file_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[7, 8, 9]").unwrap();

        let source = FixtureSource::File {
            path: file.path().to_path_buf(),
        };
        assert_eq!(source.load().unwrap(), vec![7, 8, 9]);
    }

    #[test]
    fn test_empty_pool_rejected() {
        let mut config = FixturesConfig::default();
        assert!(config.validate().is_ok());

        config
            .pools
            .insert("empty".to_string(), FixtureSource::Range { start: 5, end: 1 });
        assert!(config.validate().is_err());
    }
}
