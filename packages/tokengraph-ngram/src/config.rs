//! Indexer configuration
//!
//! Built in code with setters, or loaded from a versioned YAML document:
//!
//! ```yaml
//! version: 1
//! max_order: 3
//! max_concurrent_contents: 8
//! parallel_orders: true
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Supported YAML schema versions
pub const SUPPORTED_VERSIONS: &[u32] = &[1];

/// Upper bound on the n-gram order; windows are `order + 1` tokens wide
pub const MAX_SUPPORTED_ORDER: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid range for field '{field}': {value} not in {min}..={max}")]
    Range {
        field: String,
        value: String,
        min: String,
        max: String,
    },

    #[error("Missing 'version' field in configuration file. Add 'version: 1' to the top of your YAML file.")]
    MissingVersion,

    #[error("Unsupported configuration version {found}. Supported versions: {}", supported.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", "))]
    UnsupportedVersion { found: u32, supported: Vec<u32> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Tuning of the n-gram indexer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexerConfig {
    /// Highest n-gram order `N`; orders `1..=N` are maintained
    #[serde(default = "default_max_order")]
    pub max_order: usize,

    /// Contents indexed concurrently by `index_contents`
    #[serde(default = "default_max_concurrent_contents")]
    pub max_concurrent_contents: usize,

    /// Reconcile the orders of one revision in parallel
    #[serde(default = "default_parallel_orders")]
    pub parallel_orders: bool,
}

fn default_max_order() -> usize {
    3
}

fn default_max_concurrent_contents() -> usize {
    num_cpus::get().max(1)
}

fn default_parallel_orders() -> bool {
    true
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            max_order: default_max_order(),
            max_concurrent_contents: default_max_concurrent_contents(),
            parallel_orders: default_parallel_orders(),
        }
    }
}

/// YAML schema v1
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFileV1 {
    version: Option<u32>,
    #[serde(default = "default_max_order")]
    max_order: usize,
    #[serde(default = "default_max_concurrent_contents")]
    max_concurrent_contents: usize,
    #[serde(default = "default_parallel_orders")]
    parallel_orders: bool,
}

impl From<ConfigFileV1> for IndexerConfig {
    fn from(file: ConfigFileV1) -> Self {
        Self {
            max_order: file.max_order,
            max_concurrent_contents: file.max_concurrent_contents,
            parallel_orders: file.parallel_orders,
        }
    }
}

impl IndexerConfig {
    pub fn max_order(mut self, max_order: usize) -> Self {
        self.max_order = max_order;
        self
    }

    pub fn max_concurrent_contents(mut self, n: usize) -> Self {
        self.max_concurrent_contents = n;
        self
    }

    pub fn parallel_orders(mut self, enabled: bool) -> Self {
        self.parallel_orders = enabled;
        self
    }

    /// Range checks
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_order == 0 || self.max_order > MAX_SUPPORTED_ORDER {
            return Err(ConfigError::Range {
                field: "max_order".to_string(),
                value: self.max_order.to_string(),
                min: "1".to_string(),
                max: MAX_SUPPORTED_ORDER.to_string(),
            });
        }
        if self.max_concurrent_contents == 0 {
            return Err(ConfigError::Range {
                field: "max_concurrent_contents".to_string(),
                value: "0".to_string(),
                min: "1".to_string(),
                max: usize::MAX.to_string(),
            });
        }
        Ok(())
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        let file: ConfigFileV1 = serde_yaml::from_str(yaml)?;
        let version = file.version.ok_or(ConfigError::MissingVersion)?;
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(ConfigError::UnsupportedVersion {
                found: version,
                supported: SUPPORTED_VERSIONS.to_vec(),
            });
        }
        let config = IndexerConfig::from(file);
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn from_yaml(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Serialize as a v1 YAML document
    pub fn to_yaml(&self) -> ConfigResult<String> {
        let file = ConfigFileV1 {
            version: Some(1),
            max_order: self.max_order,
            max_concurrent_contents: self.max_concurrent_contents,
            parallel_orders: self.parallel_orders,
        };
        Ok(serde_yaml::to_string(&file)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_validate() {
        let config = IndexerConfig::default();
        assert_eq!(config.max_order, 3);
        assert!(config.max_concurrent_contents >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_order_rejected() {
        let err = IndexerConfig::default().max_order(0).validate().unwrap_err();
        assert!(matches!(err, ConfigError::Range { ref field, .. } if field == "max_order"));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = IndexerConfig::default()
            .max_order(5)
            .max_concurrent_contents(2)
            .parallel_orders(false);

        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("version: 1"));
        assert!(yaml.contains("max_order: 5"));

        assert_eq!(IndexerConfig::from_yaml_str(&yaml).unwrap(), config);
    }

    #[test]
    fn test_yaml_loading() {
        let yaml_content = r#"
version: 1
max_order: 2
parallel_orders: false
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = IndexerConfig::from_yaml(temp_file.path()).unwrap();
        assert_eq!(config.max_order, 2);
        assert!(!config.parallel_orders);
        assert_eq!(
            config.max_concurrent_contents,
            default_max_concurrent_contents()
        );
    }

    #[test]
    fn test_yaml_missing_version() {
        let result = IndexerConfig::from_yaml_str("max_order: 2\n");
        assert!(matches!(result, Err(ConfigError::MissingVersion)));
    }

    #[test]
    fn test_yaml_unsupported_version() {
        let result = IndexerConfig::from_yaml_str("version: 2\nmax_order: 2\n");
        assert!(matches!(
            result,
            Err(ConfigError::UnsupportedVersion { found: 2, .. })
        ));
    }

    #[test]
    fn test_yaml_unknown_field() {
        let result = IndexerConfig::from_yaml_str("version: 1\nmax_orders: 2\n");
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }
}
