//! Graph configuration
//!
//! Loaded from YAML; every field has a default so partial files are fine.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable naming a YAML configuration file
pub const CONFIG_ENV: &str = "MATRIXGRAPH_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Initial dimension of every matrix
    pub initial_capacity: u64,
    /// Optional cap on the entity id range
    pub max_entities: Option<u64>,
    /// Dirty matrix count at which a flush runs on the rayon pool
    pub parallel_flush_threshold: usize,
    /// Row count at which matrix multiply runs row-parallel
    pub parallel_multiply_rows: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 16_384,
            max_entities: None,
            parallel_flush_threshold: 8,
            parallel_multiply_rows: 1_024,
        }
    }
}

impl GraphConfig {
    /// Small matrices, handy for tests and embedded use
    pub fn with_capacity(initial_capacity: u64) -> Self {
        Self {
            initial_capacity,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.initial_capacity == 0 {
            return Err(ConfigError::Invalid(
                "initial_capacity must be greater than zero".to_string(),
            ));
        }
        if self.max_entities == Some(0) {
            return Err(ConfigError::Invalid(
                "max_entities must be greater than zero when set".to_string(),
            ));
        }
        if self.parallel_flush_threshold == 0 || self.parallel_multiply_rows == 0 {
            return Err(ConfigError::Invalid(
                "parallel thresholds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        let config: GraphConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&contents)?;
        info!("Loaded graph configuration from {:?}", path);
        Ok(config)
    }

    /// Load from the file named by `MATRIXGRAPH_CONFIG`, or use defaults
    pub fn from_env() -> ConfigResult<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(path),
            None => {
                debug!("{} not set, using default configuration", CONFIG_ENV);
                Ok(Self::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = GraphConfig::default();
        assert_eq!(config.initial_capacity, 16_384);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml() {
        let config = GraphConfig::from_yaml_str("initial_capacity: 64\nmax_entities: 1000\n").unwrap();
        assert_eq!(config.initial_capacity, 64);
        assert_eq!(config.max_entities, Some(1000));
        assert_eq!(config.parallel_flush_threshold, 8);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            GraphConfig::from_yaml_str("initial_capacity: 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            GraphConfig::from_yaml_str("max_entities: 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            GraphConfig::from_yaml_str("initial_capacity: [1, 2]"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "parallel_multiply_rows: 32").unwrap();
        let config = GraphConfig::from_file(file.path()).unwrap();
        assert_eq!(config.parallel_multiply_rows, 32);

        assert!(matches!(
            GraphConfig::from_file("/definitely/not/here.yaml"),
            Err(ConfigError::Io(_))
        ));
    }
}
